//! Key/value byte storage that blobs are laid out on.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub type StoreResult<T, E = anyhow::Error> = std::result::Result<T, E>;

pub type ByteStream = Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static>;

pub type KeyStream = Box<dyn Stream<Item = Result<String, std::io::Error>> + Send + Unpin + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// True when `err` (or anything it wraps) says the object is missing.
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::NotFound))
                || matches!(
                    cause.downcast_ref::<std::io::Error>(),
                    Some(e) if e.kind() == std::io::ErrorKind::NotFound
                )
        })
    }
}

/// Storage backend for blobs.
///
/// Paths are relative, `/`-separated keys. Objects are only ever written
/// whole: a reader sees either nothing or the complete object, never a
/// partial write. Reading or sizing a missing key fails with
/// `StoreError::NotFound`; deleting one succeeds.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync + 'static {
    fn features(&self) -> StoreFeatures;

    async fn put(&self, path: &str, bytes: Bytes) -> StoreResult<()>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    async fn read(&self, path: &str) -> StoreResult<Bytes>;

    async fn read_stream(&self, path: &str) -> StoreResult<ByteStream>;

    async fn size(&self, path: &str) -> StoreResult<u64>;

    /// Every key currently stored, in no particular order.
    async fn list(&self) -> StoreResult<KeyStream>;

    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Layout hints a backend gives the blob path scheme.
#[derive(Debug, Clone, Copy)]
pub struct StoreFeatures {
    pub case_sensitive: bool,
    /// Above this many entries per directory, blobs get nested paths.
    pub recommended_max_dir_size: u64,
}
