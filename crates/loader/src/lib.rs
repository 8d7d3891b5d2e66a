//! Concurrent fetch/verify/load pipeline for Zipline manifests.
//!
//! This crate provides:
//! - An `HttpClient` trait with a reqwest-backed default
//! - A tiered fetch pipeline: embedded dir → content cache → network
//! - A throttle bounding concurrent downloads
//! - The loader: per-module tasks gated on dependency installation, all
//!   engine calls serialized on a single linker task
//! - The downloader: the same pipeline materializing files to a directory
//! - An event listener surface for operational observability

pub mod downloader;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
mod linker;
pub mod loader;
mod pipeline;
pub mod throttle;

pub use downloader::Downloader;
pub use engine::{EngineError, EngineSink};
pub use error::{LoaderError, LoaderResult};
pub use events::{EventListener, NoopEventListener, TracingEventListener};
pub use http::{HttpClient, HttpError, ReqwestClient};
pub use loader::ZiplineLoader;
pub use throttle::DownloadThrottle;
