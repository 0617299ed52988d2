use super::{apply_prefix, ObjectStore};
use crate::config::StorageConfig;
use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Filesystem-backed object storage.
///
/// Writes land in a temporary file first and are renamed into place, so
/// a concurrent reader never observes a half-written PDF and concurrent
/// writers of the same content-derived key converge on identical bytes.
pub struct FsStorage {
    directory: PathBuf,
    key_prefix: String,
    public_base_url: Option<String>,
}

impl FsStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            key_prefix: config.key_prefix.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.directory.join(apply_prefix(&self.key_prefix, key))
    }
}

#[async_trait]
impl ObjectStore for FsStorage {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.object_path(key);
        if tokio::fs::try_exists(&path).await? {
            debug!(key, "object already stored, skipping write");
            return Ok(self.url_for(key));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key, size = bytes.len(), "stored object");
        Ok(self.url_for(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.object_path(key)).await?)
    }

    fn url_for(&self, key: &str) -> String {
        let relative = apply_prefix(&self.key_prefix, key);
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), relative),
            None => self.object_path(key).display().to_string(),
        }
    }
}
