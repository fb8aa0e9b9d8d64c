//! Filesystem store for a node's blobs.
//!
//! Every key maps to one file below `base_path`. Writes go to a sibling
//! `*.partial-<n>` file that is renamed into place, so a crash never leaves
//! a truncated blob under its content address.

use anyhow::{Context, bail};
use bytes::Bytes;
use futures::StreamExt;
use pinvault_core::store::{ByteStream, KeyStream, StoreError, StoreFeatures, StoreResult};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

const PARTIAL_MARKER: &str = ".partial-";

static NEXT_PARTIAL: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LocalStoreConfig {
    pub base_path: String,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn create(config: LocalStoreConfig) -> Self {
        Self::new(config.base_path)
    }

    pub fn to_blob_store(self) -> pinvault_core::BlobStore {
        pinvault_core::BlobStore::new(self)
    }

    /// Maps a key to a file below the root. Keys that could escape it
    /// are rejected.
    fn file_for(&self, key: &str) -> StoreResult<PathBuf> {
        let escapes = Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            bail!("invalid store key '{key}': must be a relative path without '..'");
        }
        Ok(self.root.join(key))
    }
}

fn missing_as_not_found(err: io::Error) -> anyhow::Error {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound.into()
    } else {
        err.into()
    }
}

#[async_trait::async_trait]
impl pinvault_core::Store for LocalStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            case_sensitive: false,
            recommended_max_dir_size: 1024,
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> StoreResult<()> {
        let target = self.file_for(key)?;
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let n = NEXT_PARTIAL.fetch_add(1, Ordering::Relaxed);
        let mut partial = target.clone().into_os_string();
        partial.push(format!("{PARTIAL_MARKER}{}-{n}", std::process::id()));
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &bytes)
            .await
            .with_context(|| format!("writing {}", partial.display()))?;
        if let Err(err) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err).with_context(|| format!("moving blob into {}", target.display()));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.file_for(key)?).await?)
    }

    async fn read(&self, key: &str) -> StoreResult<Bytes> {
        let data = tokio::fs::read(self.file_for(key)?)
            .await
            .map_err(missing_as_not_found)?;
        Ok(Bytes::from(data))
    }

    async fn read_stream(&self, key: &str) -> StoreResult<ByteStream> {
        let file = tokio::fs::File::open(self.file_for(key)?)
            .await
            .map_err(missing_as_not_found)?;
        Ok(Box::new(ReaderStream::new(file)))
    }

    async fn size(&self, key: &str) -> StoreResult<u64> {
        let meta = tokio::fs::metadata(self.file_for(key)?)
            .await
            .map_err(missing_as_not_found)?;
        Ok(meta.len())
    }

    async fn list(&self) -> StoreResult<KeyStream> {
        let root = self.root.clone();
        let entries = futures::stream::iter(WalkDir::new(&self.root).into_iter());
        let keys = entries.filter_map(move |entry| {
            let key = match entry {
                Err(err) => Some(Err(io::Error::other(err))),
                Ok(entry) if !entry.file_type().is_file() => None,
                Ok(entry) => entry
                    .path()
                    .strip_prefix(&root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                    .filter(|key| !key.contains(PARTIAL_MARKER))
                    .map(Ok),
            };
            futures::future::ready(key)
        });
        Ok(Box::new(keys))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.file_for(key)?).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
