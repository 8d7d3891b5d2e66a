//! Tiered source resolution for manifests and module bytes.

use crate::error::{LoaderError, LoaderResult};
use crate::events::EventListener;
use crate::http::HttpClient;
use crate::throttle::DownloadThrottle;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use url::Url;
use zipline_cache::ContentCache;
use zipline_core::{MANIFEST_FILE_NAME, Manifest, Module};

/// Resolves bytes for manifests and modules.
///
/// Modules are looked up tier by tier: the embedded directory (trusted
/// build outputs, no re-hash), then the content cache, then the network.
/// Only network downloads pass through the throttle.
pub(crate) struct FetchPipeline {
    http: Arc<dyn HttpClient>,
    cache: Arc<ContentCache>,
    throttle: Arc<DownloadThrottle>,
    listener: Arc<dyn EventListener>,
    embedded_dir: Option<PathBuf>,
    application_name: String,
}

impl FetchPipeline {
    pub fn new(
        http: Arc<dyn HttpClient>,
        cache: Arc<ContentCache>,
        throttle: Arc<DownloadThrottle>,
        listener: Arc<dyn EventListener>,
        embedded_dir: Option<PathBuf>,
        application_name: String,
    ) -> Self {
        Self {
            http,
            cache,
            throttle,
            listener,
            embedded_dir,
            application_name,
        }
    }

    /// Resolve the container bytes for one module.
    pub async fn module_bytes(&self, base_url: Option<&Url>, module: &Module) -> LoaderResult<Bytes> {
        if let Some(dir) = &self.embedded_dir {
            let path = dir.join(module.sha256.to_hex());
            match fs::read(&path).await {
                Ok(data) => {
                    tracing::debug!(digest = %module.sha256, "resolved module from embedded dir");
                    return Ok(Bytes::from(data));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let url = self.resolve_url(base_url, &module.url)?;
        self.cache
            .get_or_put(module.sha256, || {
                let url = url.clone();
                async move { self.download_throttled(&url).await }
            })
            .await
    }

    /// Fetch and parse the manifest at `manifest_url`, falling back to the
    /// embedded copy when the network is unavailable.
    ///
    /// Returns the manifest together with the base URL module links resolve
    /// against (none when the embedded fallback was used).
    pub async fn manifest(&self, manifest_url: &str) -> LoaderResult<(Manifest, Option<Url>)> {
        let url = Url::parse(manifest_url).map_err(|source| LoaderError::InvalidUrl {
            url: manifest_url.to_string(),
            source,
        })?;

        let (bytes, base_url) = match self.download_throttled(&url).await {
            Ok(bytes) => (bytes, Some(url)),
            Err(err @ LoaderError::Network(_)) => {
                let Some(dir) = &self.embedded_dir else {
                    return Err(err);
                };
                match fs::read(dir.join(MANIFEST_FILE_NAME)).await {
                    Ok(data) => {
                        tracing::warn!(
                            url = manifest_url,
                            "manifest fetch failed, using embedded manifest"
                        );
                        (Bytes::from(data), None)
                    }
                    // No embedded copy either; the network failure is the
                    // root cause worth reporting.
                    Err(_) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        let manifest = std::str::from_utf8(&bytes)
            .map_err(|e| {
                zipline_core::Error::MalformedManifest(format!("manifest is not utf-8: {e}"))
            })
            .and_then(|json| Manifest::from_json(json));

        match manifest {
            Ok(manifest) => Ok((manifest, base_url)),
            Err(err) => {
                self.listener
                    .manifest_parse_failed(&self.application_name, manifest_url, &err);
                Err(err.into())
            }
        }
    }

    async fn download_throttled(&self, url: &Url) -> LoaderResult<Bytes> {
        let _permit = self.throttle.acquire().await?;
        self.listener
            .download_start(&self.application_name, url.as_str());
        match self.http.download(url).await {
            Ok(bytes) => {
                self.listener
                    .download_success(&self.application_name, url.as_str());
                Ok(bytes)
            }
            Err(err) => {
                let err = LoaderError::from(err);
                self.listener
                    .download_failed(&self.application_name, url.as_str(), &err);
                Err(err)
            }
        }
    }

    fn resolve_url(&self, base_url: Option<&Url>, link: &str) -> LoaderResult<Url> {
        let resolved = match base_url {
            Some(base) => base.join(link),
            None => Url::parse(link),
        };
        resolved.map_err(|source| LoaderError::InvalidUrl {
            url: link.to_string(),
            source,
        })
    }
}
