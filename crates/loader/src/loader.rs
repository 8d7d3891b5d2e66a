//! Dependency-ordered application loading.

use crate::engine::EngineSink;
use crate::error::{LoaderError, LoaderResult};
use crate::events::EventListener;
use crate::http::HttpClient;
use crate::linker::Linker;
use crate::pipeline::FetchPipeline;
use crate::throttle::DownloadThrottle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use zipline_cache::ContentCache;
use zipline_core::{LoaderConfig, Manifest, ModuleId, ZiplineFile};

/// Loads every module of a manifest into a host engine.
///
/// One task per module starts fetching immediately; only the final install
/// step waits for the module's declared dependencies, so the end-to-end
/// latency of a load is bounded by its longest dependency chain rather
/// than the sum of all modules.
pub struct ZiplineLoader {
    config: LoaderConfig,
    throttle: Arc<DownloadThrottle>,
    listener: Arc<dyn EventListener>,
    pipeline: Arc<FetchPipeline>,
}

impl ZiplineLoader {
    /// Create a loader over the given transport and cache.
    pub fn new(
        config: LoaderConfig,
        http: Arc<dyn HttpClient>,
        cache: Arc<ContentCache>,
        listener: Arc<dyn EventListener>,
    ) -> LoaderResult<Self> {
        config.validate()?;
        let throttle = Arc::new(DownloadThrottle::new(config.concurrent_downloads)?);
        let pipeline = Arc::new(FetchPipeline::new(
            http,
            cache,
            Arc::clone(&throttle),
            Arc::clone(&listener),
            config.embedded_dir.clone(),
            config.application_name.clone(),
        ));
        Ok(Self {
            config,
            throttle,
            listener,
            pipeline,
        })
    }

    /// Change the concurrent-download bound; in-flight downloads finish
    /// under the old bound.
    pub fn set_concurrent_downloads(&self, permits: usize) -> LoaderResult<()> {
        self.throttle.set_permits(permits)?;
        Ok(())
    }

    /// Fetch the manifest at `manifest_url` and load all of its modules
    /// into the engine in dependency order.
    ///
    /// Fails fast: the first module failure cancels every sibling task and
    /// is the error returned. The engine may have received a dependency-
    /// closed prefix of the manifest at that point.
    pub async fn load(
        &self,
        engine: Arc<dyn EngineSink>,
        manifest_url: &str,
    ) -> LoaderResult<Manifest> {
        let app = &self.config.application_name;
        self.listener.application_load_start(app, manifest_url);
        match self.load_inner(engine, manifest_url).await {
            Ok(manifest) => {
                self.listener.application_load_success(app, manifest_url);
                Ok(manifest)
            }
            Err(err) => {
                self.listener.application_load_failed(app, manifest_url, &err);
                Err(err)
            }
        }
    }

    async fn load_inner(
        &self,
        engine: Arc<dyn EngineSink>,
        manifest_url: &str,
    ) -> LoaderResult<Manifest> {
        let (manifest, base_url) = self.pipeline.manifest(manifest_url).await?;
        let linker = Linker::spawn(engine);

        // One readiness channel per module; a task flips its channel to
        // true only after its module is installed, and waits on every
        // upstream channel before installing its own.
        let mut ready_txs: HashMap<ModuleId, watch::Sender<bool>> = HashMap::new();
        let mut ready_rxs: HashMap<ModuleId, watch::Receiver<bool>> = HashMap::new();
        for module_id in manifest.modules().keys() {
            let (tx, rx) = watch::channel(false);
            ready_txs.insert(module_id.clone(), tx);
            ready_rxs.insert(module_id.clone(), rx);
        }

        let mut tasks: JoinSet<LoaderResult<()>> = JoinSet::new();
        for (module_id, module) in manifest.modules() {
            let Some(ready_tx) = ready_txs.remove(module_id) else {
                continue;
            };
            let upstream: Vec<watch::Receiver<bool>> = module
                .depends_on_ids
                .iter()
                .map(|dep| ready_rxs[dep].clone())
                .collect();

            let pipeline = Arc::clone(&self.pipeline);
            let module_id = module_id.clone();
            let module = module.clone();
            let base_url = base_url.clone();
            let linker = linker.clone();

            tasks.spawn(async move {
                let bytes = pipeline.module_bytes(base_url.as_ref(), &module).await?;
                let file = ZiplineFile::decode(&bytes).map_err(LoaderError::from)?;

                for mut dep in upstream {
                    dep.wait_for(|installed| *installed)
                        .await
                        .map_err(|_| LoaderError::Cancelled)?;
                }

                linker.install(module_id, file.bytecode).await?;
                let _ = ready_tx.send(true);
                Ok(())
            });
        }
        drop(ready_rxs);

        join_all_fail_fast(&mut tasks).await?;
        Ok(manifest)
    }
}

/// Await every task; on the first failure abort the rest, drain them, and
/// return that failure.
pub(crate) async fn join_all_fail_fast(tasks: &mut JoinSet<LoaderResult<()>>) -> LoaderResult<()> {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(err);
            }
            Err(join_err) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
                return Err(LoaderError::Cancelled);
            }
        }
    }
    Ok(())
}
