use bytes::Bytes;
use dashmap::DashMap;
use pinvault_core::store::{ByteStream, KeyStream, StoreError, StoreFeatures, StoreResult};
use std::io;
use std::sync::Arc;

/// Volatile store for tests and throwaway nodes. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<DashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_blob_store(self) -> pinvault_core::BlobStore {
        pinvault_core::BlobStore::new(self)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.objects
            .get(key)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::NotFound.into())
    }
}

#[async_trait::async_trait]
impl pinvault_core::Store for MemoryStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            case_sensitive: true,
            recommended_max_dir_size: u64::MAX,
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> StoreResult<()> {
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn read(&self, key: &str) -> StoreResult<Bytes> {
        self.get(key)
    }

    async fn read_stream(&self, key: &str) -> StoreResult<ByteStream> {
        let bytes = self.get(key)?;
        Ok(Box::new(futures::stream::once(futures::future::ready(
            Ok::<_, io::Error>(bytes),
        ))))
    }

    async fn size(&self, key: &str) -> StoreResult<u64> {
        Ok(self.get(key)?.len() as u64)
    }

    async fn list(&self) -> StoreResult<KeyStream> {
        // Snapshot so no shard lock is held while the caller polls.
        let keys: Vec<Result<String, io::Error>> =
            self.objects.iter().map(|e| Ok(e.key().clone())).collect();
        Ok(Box::new(futures::stream::iter(keys)))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.remove(key);
        Ok(())
    }
}
