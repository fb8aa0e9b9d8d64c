//! Conformance suite for `Store` backends.
//!
//! ```toml
//! [dev-dependencies]
//! pinvault_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! ```ignore
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     pinvault_core::testutil::StoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use crate::store::{Store, StoreError, StoreResult};
use crate::{BlobStore, ContentId};
use bytes::Bytes;
use futures::TryStreamExt;
use rand::Rng;
use std::collections::HashSet;

pub struct StoreTests<'a, S> {
    store: &'a S,
    /// Every key the suite writes lives under this prefix.
    scope: String,
}

impl<'a, S: Store + Clone> StoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        let scope = format!("_conformance_{:08x}/", rand::rng().random::<u32>());
        Self { store, scope }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.scope)
    }

    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_put_then_read().await?;
        self.test_read_stream_matches_read().await?;
        self.test_missing_key().await?;
        self.test_put_replaces().await?;
        self.test_delete_is_idempotent().await?;
        self.test_list_includes_nested_keys().await?;
        self.test_concurrent_identical_puts().await?;
        self.test_blobs_are_deduplicated().await?;
        self.cleanup().await
    }

    pub async fn test_put_then_read(&self) -> StoreResult<()> {
        let key = self.key("put_read.bin");
        let data = random_bytes(4096);

        assert!(!self.store.exists(&key).await?);
        self.store.put(&key, data.clone()).await?;
        assert!(self.store.exists(&key).await?);
        assert_eq!(self.store.read(&key).await?, data);
        assert_eq!(self.store.size(&key).await?, 4096);
        Ok(())
    }

    pub async fn test_read_stream_matches_read(&self) -> StoreResult<()> {
        let key = self.key("stream.bin");
        // Large enough that file-backed stores yield several chunks.
        let data = random_bytes(200_000);
        self.store.put(&key, data.clone()).await?;

        let chunks: Vec<Bytes> = self.store.read_stream(&key).await?.try_collect().await?;
        assert_eq!(chunks.concat(), data.as_ref());
        Ok(())
    }

    pub async fn test_missing_key(&self) -> StoreResult<()> {
        let key = self.key("never_written.bin");
        assert!(!self.store.exists(&key).await?);

        let read = self.store.read(&key).await.expect_err("read of missing key");
        assert!(StoreError::is_not_found(&read), "read: {read:?}");

        let size = self.store.size(&key).await.expect_err("size of missing key");
        assert!(StoreError::is_not_found(&size), "size: {size:?}");

        match self.store.read_stream(&key).await {
            Ok(_) => panic!("stream of missing key should fail"),
            Err(err) => assert!(StoreError::is_not_found(&err), "stream: {err:?}"),
        }
        Ok(())
    }

    pub async fn test_put_replaces(&self) -> StoreResult<()> {
        let key = self.key("replace.bin");
        self.store
            .put(&key, Bytes::from_static(b"a much longer first version"))
            .await?;
        self.store.put(&key, Bytes::from_static(b"v2")).await?;
        assert_eq!(self.store.read(&key).await?.as_ref(), b"v2");
        assert_eq!(self.store.size(&key).await?, 2);
        Ok(())
    }

    pub async fn test_delete_is_idempotent(&self) -> StoreResult<()> {
        let key = self.key("delete.bin");
        self.store.put(&key, Bytes::from_static(b"bye")).await?;
        self.store.delete(&key).await?;
        assert!(!self.store.exists(&key).await?);
        self.store.delete(&key).await?;
        Ok(())
    }

    pub async fn test_list_includes_nested_keys(&self) -> StoreResult<()> {
        let names = ["list/a.bin", "list/b.bin", "list/deeper/c.bin"];
        for name in names {
            self.store
                .put(&self.key(name), Bytes::from_static(b"listed"))
                .await?;
        }

        let keys: HashSet<String> = self.store.list().await?.try_collect().await?;
        for name in names {
            let key = self.key(name);
            assert!(keys.contains(&key), "list is missing {key}");
        }
        Ok(())
    }

    /// Two writers racing on one key with the same bytes both succeed.
    pub async fn test_concurrent_identical_puts(&self) -> StoreResult<()> {
        let key = self.key("race.bin");
        let data = random_bytes(64 * 1024);
        let (a, b) = tokio::join!(
            self.store.put(&key, data.clone()),
            self.store.put(&key, data.clone())
        );
        a?;
        b?;
        assert_eq!(self.store.read(&key).await?, data);
        Ok(())
    }

    pub async fn test_blobs_are_deduplicated(&self) -> StoreResult<()> {
        let blobs = BlobStore::new(self.store.clone());
        let data = random_bytes(100_000);

        let first = blobs.import_bytes(data.clone()).await?;
        let second = blobs.import_bytes(data.clone()).await?;
        assert_eq!(first, second);
        assert_eq!(first, ContentId::for_bytes(&data));

        let hash = first.hash();
        assert_eq!(blobs.read(hash).await?, data);
        assert_eq!(blobs.size(hash).await?, 100_000);
        let listed = blobs.list_hashes().await?;
        assert_eq!(listed.iter().filter(|h| **h == hash).count(), 1);

        let forged = blobs
            .import_verified(hash, Bytes::from_static(b"not the same bytes"))
            .await;
        assert!(forged.is_err(), "mismatched content must be rejected");
        assert_eq!(blobs.read(hash).await?, data);

        blobs.delete(hash).await?;
        assert!(!blobs.contains(hash).await?);
        Ok(())
    }

    pub async fn cleanup(&self) -> StoreResult<()> {
        let keys: Vec<String> = self.store.list().await?.try_collect().await?;
        for key in keys.iter().filter(|k| k.starts_with(&self.scope)) {
            self.store.delete(key).await?;
        }
        Ok(())
    }
}

pub fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    Bytes::from(data)
}
