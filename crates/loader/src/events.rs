//! Operational event hooks.

use crate::error::LoaderError;

/// Callbacks reporting loader activity, with application name and URL
/// context. Every failure is reported here before it is returned.
///
/// All methods default to no-ops; implement the ones you care about.
pub trait EventListener: Send + Sync {
    fn application_load_start(&self, _application_name: &str, _manifest_url: &str) {}

    fn application_load_success(&self, _application_name: &str, _manifest_url: &str) {}

    fn application_load_failed(
        &self,
        _application_name: &str,
        _manifest_url: &str,
        _error: &LoaderError,
    ) {
    }

    fn download_start(&self, _application_name: &str, _url: &str) {}

    fn download_success(&self, _application_name: &str, _url: &str) {}

    fn download_failed(&self, _application_name: &str, _url: &str, _error: &LoaderError) {}

    fn manifest_parse_failed(
        &self,
        _application_name: &str,
        _url: &str,
        _error: &zipline_core::Error,
    ) {
    }
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventListener;

impl EventListener for NoopEventListener {}

/// Listener that forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn application_load_start(&self, application_name: &str, manifest_url: &str) {
        tracing::info!(app = application_name, url = manifest_url, "application load started");
    }

    fn application_load_success(&self, application_name: &str, manifest_url: &str) {
        tracing::info!(app = application_name, url = manifest_url, "application load succeeded");
    }

    fn application_load_failed(
        &self,
        application_name: &str,
        manifest_url: &str,
        error: &LoaderError,
    ) {
        tracing::warn!(
            app = application_name,
            url = manifest_url,
            error = %error,
            "application load failed"
        );
    }

    fn download_start(&self, application_name: &str, url: &str) {
        tracing::debug!(app = application_name, url, "download started");
    }

    fn download_success(&self, application_name: &str, url: &str) {
        tracing::debug!(app = application_name, url, "download succeeded");
    }

    fn download_failed(&self, application_name: &str, url: &str, error: &LoaderError) {
        tracing::warn!(app = application_name, url, error = %error, "download failed");
    }

    fn manifest_parse_failed(&self, application_name: &str, url: &str, error: &zipline_core::Error) {
        tracing::warn!(app = application_name, url, error = %error, "manifest parse failed");
    }
}
