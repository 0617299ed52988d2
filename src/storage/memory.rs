use super::{apply_prefix, ObjectStore};
use crate::config::StorageConfig;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory object storage for tests.
///
/// Exposes write counters so tests can assert that repeated acquisition
/// of the same paper does not store twice.
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    key_prefix: String,
    writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            key_prefix: config.key_prefix.clone(),
            writes: AtomicU64::new(0),
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&apply_prefix(&self.key_prefix, key))
            .cloned()
    }

    /// Number of writes that actually stored bytes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let full_key = apply_prefix(&self.key_prefix, key);
        let mut objects = self.objects.write().await;
        if !objects.contains_key(&full_key) {
            objects.insert(full_key, bytes.to_vec());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.url_for(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&apply_prefix(&self.key_prefix, key)))
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{}", apply_prefix(&self.key_prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStorage::default();
        let url = store.put("k.pdf", b"%PDF-bytes").await.unwrap();
        assert_eq!(url, "memory://k.pdf");
        assert_eq!(store.get("k.pdf").await, Some(b"%PDF-bytes".to_vec()));
        assert!(store.exists("k.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeat_put_does_not_store_twice() {
        let store = MemoryStorage::default();
        store.put("k.pdf", b"%PDF-one").await.unwrap();
        store.put("k.pdf", b"%PDF-two").await.unwrap();

        assert_eq!(store.object_count().await, 1);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get("k.pdf").await, Some(b"%PDF-one".to_vec()));
    }
}
