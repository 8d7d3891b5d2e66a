//! Materializing a manifest to a directory.

use crate::error::{LoaderError, LoaderResult};
use crate::events::EventListener;
use crate::http::HttpClient;
use crate::loader::join_all_fail_fast;
use crate::pipeline::FetchPipeline;
use crate::throttle::DownloadThrottle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use uuid::Uuid;
use zipline_cache::ContentCache;
use zipline_core::{LoaderConfig, MANIFEST_FILE_NAME, Manifest, ZiplineFile};

/// Sibling of the loader that writes resolved modules to a directory
/// instead of linking them into an engine.
///
/// The output directory ends up with one `<hex-digest>` container file per
/// module plus a `manifest.zipline.json`, i.e. exactly the layout the
/// embedded directory and an HTTP origin serve from.
pub struct Downloader {
    pipeline: Arc<FetchPipeline>,
}

impl Downloader {
    /// Create a downloader over the given transport and cache.
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
            throttle,
            listener,
            config.embedded_dir.clone(),
            config.application_name,
        ));
        Ok(Self { pipeline })
    }

    /// Fetch the manifest at `manifest_url` and write it and every module
    /// it names into `download_dir`.
    ///
    /// Module files are independent, so no dependency ordering is imposed;
    /// all writes are atomic temp+rename. Fails fast on the first module
    /// failure.
    pub async fn download(&self, download_dir: &Path, manifest_url: &str) -> LoaderResult<Manifest> {
        let (manifest, base_url) = self.pipeline.manifest(manifest_url).await?;

        fs::create_dir_all(download_dir).await?;
        write_atomic(
            download_dir.join(MANIFEST_FILE_NAME),
            manifest.to_json().map_err(LoaderError::from)?.into_bytes(),
        )
        .await?;

        let mut tasks: JoinSet<LoaderResult<()>> = JoinSet::new();
        for module in manifest.modules().values() {
            let pipeline = Arc::clone(&self.pipeline);
            let module = module.clone();
            let base_url = base_url.clone();
            let target = download_dir.join(module.sha256.to_hex());

            tasks.spawn(async move {
                let bytes = pipeline.module_bytes(base_url.as_ref(), &module).await?;
                // Validate the container before persisting it.
                ZiplineFile::decode(&bytes).map_err(LoaderError::from)?;
                write_atomic(target, bytes).await
            });
        }

        join_all_fail_fast(&mut tasks).await?;
        tracing::info!(
            dir = %download_dir.display(),
            modules = manifest.modules().len(),
            "manifest materialized"
        );
        Ok(manifest)
    }
}

/// Write to a temp file, fsync, then rename into place.
async fn write_atomic(path: PathBuf, data: impl AsRef<[u8]>) -> LoaderResult<()> {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    );
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data.as_ref()).await?;
        file.sync_all().await?;
    }
    fs::rename(&temp_path, &path).await?;
    Ok(())
}
