//! Core domain types for the Zipline module delivery system.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content digests (SHA-256, hex-rendered)
//! - Module graph manifests and their JSON wire format
//! - Topological ordering helpers
//! - The framed bytecode container format
//! - Shared configuration types

pub mod config;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod topo;
pub mod zipline_file;

pub use config::{CacheConfig, LoaderConfig};
pub use digest::Digest;
pub use error::{Error, Result};
pub use manifest::{Manifest, Module, ModuleId};
pub use topo::{is_topologically_sorted, topological_sort};
pub use zipline_file::{ZIPLINE_FILE_MAGIC, ZIPLINE_FILE_VERSION, ZiplineFile};

/// File name of the offline-fallback manifest inside the embedded directory
/// and of the manifest copy written by the downloader.
pub const MANIFEST_FILE_NAME: &str = "manifest.zipline.json";
