//! # Durable PDF storage
//!
//! Validated PDFs are uploaded under content-derived keys, so storing
//! the same paper twice lands on the same object and uploads are
//! idempotent. Two backends exist:
//!
//! - [`FsStorage`]: writes objects under a local directory
//! - [`MemoryStorage`]: keeps objects in memory, for tests

pub mod fs;
pub mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable object storage for acquired PDFs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store bytes under the key and return the object's permanent URL.
    ///
    /// A key that already holds an object is left untouched; the call
    /// still succeeds with the same URL.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Permanent URL an object under this key has (or would have)
    fn url_for(&self, key: &str) -> String;
}

/// Build the configured storage backend
pub fn from_config(config: &StorageConfig) -> Arc<dyn ObjectStore> {
    match config.backend {
        StorageBackend::Filesystem => Arc::new(FsStorage::new(config)),
        StorageBackend::Memory => Arc::new(MemoryStorage::new(config)),
    }
}

pub(crate) fn apply_prefix(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix.trim_matches('/'), key)
    }
}
