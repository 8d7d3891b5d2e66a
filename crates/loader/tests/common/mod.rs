//! Shared fakes and fixtures for loader tests.

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use zipline_cache::{ContentCache, SystemClock};
use zipline_core::{CacheConfig, Digest, Manifest, Module, ModuleId, ZiplineFile};
use zipline_loader::{EngineError, EngineSink, EventListener, HttpClient, HttpError, LoaderError};

/// In-memory HTTP origin with per-URL failures and delays, instrumented
/// with attempt and concurrency counters.
#[derive(Default)]
pub struct FakeHttpClient {
    responses: Mutex<HashMap<String, Bytes>>,
    failures: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: Bytes) {
        self.responses.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn fail(&self, url: &str) {
        self.failures.lock().unwrap().insert(url.to_string());
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Total download attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously in-flight downloads observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn download(&self, url: &Url) -> Result<Bytes, HttpError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(url.as_str()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failures.lock().unwrap().contains(url.as_str()) {
            Err(HttpError::Transport {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        } else {
            self.responses
                .lock()
                .unwrap()
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| HttpError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Engine sink that records installs in call order.
#[derive(Default)]
pub struct RecordingEngine {
    installed: Mutex<Vec<(ModuleId, Bytes)>>,
    rejects: Mutex<HashSet<String>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, module_id: &str) {
        self.rejects.lock().unwrap().insert(module_id.to_string());
    }

    pub fn installed(&self) -> Vec<(ModuleId, Bytes)> {
        self.installed.lock().unwrap().clone()
    }

    pub fn installed_ids(&self) -> Vec<String> {
        self.installed()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl EngineSink for RecordingEngine {
    async fn install(&self, module_id: &ModuleId, bytecode: Bytes) -> Result<(), EngineError> {
        if self.rejects.lock().unwrap().contains(module_id.as_str()) {
            return Err(EngineError(format!("rejected {module_id}")));
        }
        self.installed
            .lock()
            .unwrap()
            .push((module_id.clone(), bytecode));
        Ok(())
    }
}

/// Listener that records event names for assertions.
#[derive(Default)]
pub struct CollectingListener {
    events: Mutex<Vec<String>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

impl EventListener for CollectingListener {
    fn application_load_start(&self, _app: &str, _url: &str) {
        self.record("application_load_start");
    }

    fn application_load_success(&self, _app: &str, _url: &str) {
        self.record("application_load_success");
    }

    fn application_load_failed(&self, _app: &str, _url: &str, _error: &LoaderError) {
        self.record("application_load_failed");
    }

    fn download_start(&self, _app: &str, _url: &str) {
        self.record("download_start");
    }

    fn download_success(&self, _app: &str, _url: &str) {
        self.record("download_success");
    }

    fn download_failed(&self, _app: &str, _url: &str, _error: &LoaderError) {
        self.record("download_failed");
    }

    fn manifest_parse_failed(&self, _app: &str, _url: &str, _error: &zipline_core::Error) {
        self.record("manifest_parse_failed");
    }
}

/// Wrap bytecode in a current-version container.
pub fn container(bytecode: &[u8]) -> Bytes {
    ZiplineFile::new(Bytes::copy_from_slice(bytecode)).encode()
}

/// Build a manifest from `(id, url, container_bytes, deps)` entries.
pub fn manifest_of(entries: &[(&str, &str, &Bytes, &[&str])]) -> Manifest {
    let mut modules = IndexMap::new();
    for (id, url, body, deps) in entries {
        modules.insert(
            ModuleId::from(*id),
            Module {
                url: url.to_string(),
                sha256: Digest::compute(body),
                depends_on_ids: deps.iter().map(|d| ModuleId::from(*d)).collect(),
            },
        );
    }
    Manifest::new(modules, None, None, IndexMap::new()).unwrap()
}

/// Open a content cache in a fresh temp directory.
pub async fn open_cache() -> (tempfile::TempDir, Arc<ContentCache>) {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path());
    let cache = ContentCache::open(&config, Arc::new(SystemClock))
        .await
        .unwrap();
    (dir, Arc::new(cache))
}
