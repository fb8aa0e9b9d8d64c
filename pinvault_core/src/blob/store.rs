use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;

use crate::{
    ContentId, Hash,
    store::{ByteStream, Store, StoreFeatures, StoreResult},
};

use super::BLOCKING_HASH_THRESHOLD;
use super::paths;

/// Content-addressed blobs on top of a generic `Store`.
///
/// Blobs are written under deterministic paths derived from their `Hash`,
/// so importing the same bytes twice writes once.
#[derive(Debug, Clone)]
pub struct BlobStore {
    store: Arc<dyn Store>,
}

impl BlobStore {
    pub fn new<S>(store: S) -> Self
    where
        S: Store + 'static,
    {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn features(&self) -> StoreFeatures {
        self.store.features()
    }

    fn path(&self, hash: Hash) -> String {
        paths::blob_path_for_hash(hash, &self.store.features())
    }

    /// Hashes `bytes` and stores them unless already present.
    pub async fn import_bytes(&self, bytes: Bytes) -> StoreResult<ContentId> {
        let hash = hash_bytes(&bytes).await?;
        let path = self.path(hash);
        if self.store.exists(&path).await? {
            tracing::trace!("blobstore: {} already present", hash.fmt_short());
        } else {
            self.store.put(&path, bytes).await?;
            tracing::trace!("blobstore: wrote {}", hash.fmt_short());
        }
        Ok(ContentId::new(hash))
    }

    /// Stores bytes that are expected to hash to `hash`.
    ///
    /// Nothing is written when they don't.
    pub async fn import_verified(&self, hash: Hash, bytes: Bytes) -> StoreResult<()> {
        let actual = hash_bytes(&bytes).await?;
        if actual != hash {
            anyhow::bail!("hash mismatch: expected {hash}, got {actual}");
        }
        let path = self.path(hash);
        if !self.store.exists(&path).await? {
            self.store.put(&path, bytes).await?;
        }
        Ok(())
    }

    pub async fn contains(&self, hash: Hash) -> StoreResult<bool> {
        self.store.exists(&self.path(hash)).await
    }

    pub async fn size(&self, hash: Hash) -> StoreResult<u64> {
        self.store.size(&self.path(hash)).await
    }

    pub async fn read_stream(&self, hash: Hash) -> StoreResult<ByteStream> {
        self.store.read_stream(&self.path(hash)).await
    }

    pub async fn read(&self, hash: Hash) -> StoreResult<Bytes> {
        self.store.read(&self.path(hash)).await
    }

    pub async fn delete(&self, hash: Hash) -> StoreResult<()> {
        self.store.delete(&self.path(hash)).await
    }

    /// Hashes of every blob in the store. Keys that aren't blob paths are
    /// skipped.
    pub async fn list_hashes(&self) -> StoreResult<Vec<Hash>> {
        let features = self.store.features();
        let keys: Vec<String> = self.store.list().await?.try_collect().await?;
        Ok(keys
            .iter()
            .filter_map(|key| paths::hash_from_blob_path(key, &features))
            .collect())
    }
}

async fn hash_bytes(bytes: &Bytes) -> StoreResult<Hash> {
    if bytes.len() < BLOCKING_HASH_THRESHOLD {
        return Ok(Hash::new(bytes));
    }
    let bytes = bytes.clone();
    Ok(tokio::task::spawn_blocking(move || Hash::new(&bytes)).await?)
}
