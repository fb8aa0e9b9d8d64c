use crate::config::{AssetStoreConfig, PinningService, RegistrationPolicy};
use crate::coordinator::{PinCoordinator, PinReport};
use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, LifecycleStatus};
use anyhow::Context;
use base64::Engine;
use bytes::Bytes;
use futures::TryStreamExt;
use pinvault_core::{AssetUri, ContentId};
use pinvault_node::{ContentNode, HttpConnector, NodeError, PinningConnector};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Content-addressed asset store that pins everything it adds.
///
/// Cheap to clone; clones share the node, the pinning services and the
/// initialization state. Nothing happens until the first operation (or an
/// explicit [`AssetStore::initialize`]), which starts the node and registers
/// every configured pinning service.
#[derive(Clone)]
pub struct AssetStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: AssetStoreConfig,
    services: Vec<PinningService>,
    connector: Arc<dyn PinningConnector>,
    lifecycle: Lifecycle<Ready>,
}

struct Ready {
    node: Arc<ContentNode>,
    coordinator: PinCoordinator,
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore")
            .field("uri_scheme", &self.inner.config.uri_scheme)
            .field("services", &self.inner.services)
            .field("status", &self.status())
            .finish()
    }
}

pub struct AssetStoreBuilder {
    config: AssetStoreConfig,
    services: Vec<PinningService>,
    connector: Arc<dyn PinningConnector>,
}

impl AssetStoreBuilder {
    /// Adds a pinning service on top of the ones in the config.
    pub fn service(mut self, service: PinningService) -> Self {
        self.services.push(service);
        self
    }

    /// Replaces the HTTP connector used to reach pinning services.
    pub fn connector(mut self, connector: Arc<dyn PinningConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> AssetStore {
        AssetStore {
            inner: Arc::new(Inner {
                config: self.config,
                services: self.services,
                connector: self.connector,
                lifecycle: Lifecycle::new(),
            }),
        }
    }
}

impl AssetStore {
    pub fn new(config: AssetStoreConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: AssetStoreConfig) -> AssetStoreBuilder {
        let services = config
            .pinning_services
            .iter()
            .cloned()
            .map(PinningService::from)
            .collect();
        AssetStoreBuilder {
            config,
            services,
            connector: Arc::new(HttpConnector),
        }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.inner.lifecycle.status()
    }

    /// Starts the node and registers the pinning services, once.
    ///
    /// Every other operation calls this first. After a failure the store
    /// stays failed and every call returns `Error::Initialization`.
    pub async fn initialize(&self) -> Result<()> {
        self.ready().await.map(|_| ())
    }

    async fn ready(&self) -> Result<Arc<Ready>> {
        let inner = &self.inner;
        inner.lifecycle.ensure_initialized(|| inner.start()).await
    }

    /// Stores an asset and pins it on every registered service.
    ///
    /// Without `content` the bytes are read from the file at `name`.
    /// Returns once all services have confirmed the pin.
    pub async fn add_asset(&self, name: &str, content: Option<Bytes>) -> Result<ContentId> {
        let ready = self.ready().await?;
        let (name, bytes) = match content {
            Some(bytes) => (name.to_string(), bytes),
            None => read_asset(Path::new(name)).await?,
        };
        ready.add_and_pin(&name, bytes).await
    }

    pub async fn add_asset_file(&self, path: impl AsRef<Path>) -> Result<ContentId> {
        let ready = self.ready().await?;
        let (name, bytes) = read_asset(path.as_ref()).await?;
        ready.add_and_pin(&name, bytes).await
    }

    /// Full content for an asset URI or a bare identifier.
    pub async fn get(&self, uri_or_id: &str) -> Result<Bytes> {
        let ready = self.ready().await?;
        let cid = self.resolve(uri_or_id)?;

        let chunks: Vec<Bytes> = ready
            .node
            .cat(cid)
            .await
            .map_err(node_error)?
            .try_collect()
            .await
            .with_context(|| format!("reading {cid}"))?;

        Ok(match chunks.len() {
            1 => chunks.into_iter().next().unwrap_or_default(),
            _ => Bytes::from(chunks.concat()),
        })
    }

    pub async fn get_string(&self, uri_or_id: &str) -> Result<String> {
        let bytes = self.get(uri_or_id).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub async fn get_base64_string(&self, uri_or_id: &str) -> Result<String> {
        let bytes = self.get(uri_or_id).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
    }

    /// Makes sure every registered service holds a pin for `cid`.
    pub async fn pin(&self, cid: ContentId) -> Result<PinReport> {
        self.ready().await?.coordinator.pin(cid).await
    }

    pub async fn is_pinned(&self, cid: ContentId, service: &str) -> Result<bool> {
        self.ready().await?.coordinator.is_pinned(cid, service).await
    }

    /// Names of the services that registered successfully.
    pub async fn services(&self) -> Result<Vec<String>> {
        Ok(self.ready().await?.coordinator.services().to_vec())
    }

    pub fn uri_for(&self, cid: ContentId) -> AssetUri {
        AssetUri::new(self.inner.config.uri_scheme.clone(), cid)
    }

    fn resolve(&self, input: &str) -> Result<ContentId> {
        AssetUri::resolve(input, &self.inner.config.uri_scheme).map_err(|source| {
            Error::InvalidIdentifier {
                input: input.to_string(),
                source,
            }
        })
    }
}

impl Ready {
    async fn add_and_pin(&self, name: &str, bytes: Bytes) -> Result<ContentId> {
        let cid = self.node.add(name, bytes).await.map_err(node_error)?;
        self.coordinator.pin_named(cid, name).await?;
        Ok(cid)
    }
}

impl Inner {
    async fn start(&self) -> anyhow::Result<Ready> {
        let node = ContentNode::spawn_with_connector(self.config.node.clone(), self.connector.clone())
            .await
            .context("starting content node")?;
        let node = Arc::new(node);

        let mut coordinator = PinCoordinator::new(node.clone(), self.config.pin_timeout());
        for service in &self.services {
            if let Err(err) = coordinator.register_service(service).await {
                match self.config.registration_policy {
                    RegistrationPolicy::Abort => {
                        node.shutdown().await;
                        return Err(anyhow::Error::new(err)
                            .context(format!("registering pinning service '{}'", service.name)));
                    }
                    RegistrationPolicy::SkipFailed => {
                        tracing::warn!("store: skipping pinning service '{}': {err}", service.name);
                    }
                }
            }
        }

        if coordinator.services().is_empty() {
            tracing::warn!("store: no pinning services registered, assets will only be stored locally");
        }
        tracing::info!(
            "store: ready with {} pinning service(s): {:?}",
            coordinator.services().len(),
            coordinator.services()
        );

        Ok(Ready { node, coordinator })
    }
}

/// Reads an asset from disk, naming it after the file.
async fn read_asset(path: &Path) -> Result<(String, Bytes)> {
    let bytes = tokio::fs::read(path).await.map_err(|source| Error::Io {
        path: PathBuf::from(path),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((name, Bytes::from(bytes)))
}

fn node_error(err: NodeError) -> Error {
    match err {
        NodeError::NotFound(cid) => Error::NotFound(cid),
        NodeError::Other(err) => Error::Node(err),
        other => Error::Node(other.into()),
    }
}
