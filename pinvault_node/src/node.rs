use crate::config::NodeConfig;
use crate::fetcher::{FetchResult, GatewayFetcher};
use crate::net_protocol;
use crate::network::{self, Network};
use crate::pinning::{HttpConnector, PinOptions, PinningConnector};
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use iroh::EndpointAddr;
use pinvault_core::store::ByteStream;
use pinvault_core::{
    BlobStore, ContentId, Hash, PinRecord, PinStatus, RemotePinning, StoreError,
};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub type NodeResult<T> = Result<T, NodeError>;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("content {0} not found")]
    NotFound(ContentId),
    #[error("pinning service '{0}' is not registered")]
    UnknownService(String),
    #[error("pinning service '{0}' is already registered")]
    DuplicateService(String),
    #[error("pin request {request_id} for {cid} failed on '{service}'")]
    PinFailed {
        service: String,
        cid: ContentId,
        request_id: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Embedded content-addressed node.
///
/// Owns the blob store, the iroh endpoint that serves it to peers, the
/// gateway fetcher and the registry of remote pinning services. Pin
/// requests advertise the endpoint as an origin so services can fetch
/// what was added here.
pub struct ContentNode {
    blobs: BlobStore,
    network: Option<Network>,
    peers: RwLock<Vec<EndpointAddr>>,
    fetcher: GatewayFetcher,
    fetch_timeout: Duration,
    poll_interval: Duration,
    extra_origins: Vec<String>,
    services: DashMap<String, Arc<dyn RemotePinning>>,
    connector: Arc<dyn PinningConnector>,
}

impl fmt::Debug for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentNode")
            .field("blobs", &self.blobs)
            .field("origins", &self.origins())
            .field("gateways", &self.fetcher.len())
            .field("services", &self.services())
            .finish()
    }
}

impl ContentNode {
    /// Starts a node whose pinning services are reached over HTTP.
    pub async fn spawn(config: NodeConfig) -> anyhow::Result<Self> {
        Self::spawn_with_connector(config, Arc::new(HttpConnector)).await
    }

    pub async fn spawn_with_connector(
        config: NodeConfig,
        connector: Arc<dyn PinningConnector>,
    ) -> anyhow::Result<Self> {
        let peers = network::parse_peers(&config.network.peers)?;
        let blobs = crate::create_store(&config.store).await?;
        let fetcher = GatewayFetcher::new(config.gateways.clone(), config.fetch_timeout())?;
        let network = if config.network.enabled {
            Some(Network::spawn(&config.network, blobs.clone()).await?)
        } else {
            tracing::warn!("node: networking disabled, added content is only held locally");
            None
        };

        tracing::info!(
            "node: started with {:?} store, {} peer(s) and {} gateway(s)",
            config.store,
            peers.len(),
            fetcher.len()
        );

        Ok(Self {
            blobs,
            network,
            peers: RwLock::new(peers),
            fetcher,
            fetch_timeout: config.fetch_timeout(),
            poll_interval: config.poll_interval(),
            extra_origins: config.origins,
            services: DashMap::new(),
            connector,
        })
    }

    /// Stores `bytes` and returns their identifier.
    pub async fn add(&self, name: &str, bytes: Bytes) -> NodeResult<ContentId> {
        let size = bytes.len();
        let cid = self.blobs.import_bytes(bytes).await?;
        tracing::debug!("node: added '{name}' ({size} bytes) as {cid}");
        Ok(cid)
    }

    /// True if the content is held locally.
    pub async fn has(&self, cid: ContentId) -> NodeResult<bool> {
        Ok(self.blobs.contains(cid.hash()).await?)
    }

    /// Streams the content for `cid`. Content not held locally is asked of
    /// the known peers, then of the gateways, and kept once verified.
    pub async fn cat(&self, cid: ContentId) -> NodeResult<ByteStream> {
        if self.has(cid).await? {
            return self
                .blobs
                .read_stream(cid.hash())
                .await
                .map_err(|err| not_found_or(cid, err));
        }

        let bytes = match tokio::time::timeout(self.fetch_timeout, self.fetch_remote(cid)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(NodeError::NotFound(cid)),
            Err(_) => {
                tracing::warn!(
                    "node: fetching {cid} timed out after {:?}",
                    self.fetch_timeout
                );
                return Err(NodeError::NotFound(cid));
            }
        };
        self.blobs.import_verified(cid.hash(), bytes.clone()).await?;
        Ok(Box::new(futures::stream::iter([Ok::<_, io::Error>(bytes)])))
    }

    /// Addresses pinning services are told to fetch from: our own endpoint
    /// first, then any configured extras.
    pub fn origins(&self) -> Vec<String> {
        self.network
            .iter()
            .map(Network::origin)
            .chain(self.extra_origins.iter().cloned())
            .collect()
    }

    /// Dialable address of this node, if networking is enabled.
    pub fn endpoint_addr(&self) -> Option<EndpointAddr> {
        self.network.as_ref().map(Network::addr)
    }

    /// Adds a peer that is asked for content this node lacks.
    pub async fn add_peer(&self, addr: EndpointAddr) {
        self.peers.write().await.push(addr);
    }

    /// Connects to a pinning service and makes it available under `name`.
    pub async fn register_pinning_service(
        &self,
        name: &str,
        endpoint: &str,
        key: &str,
    ) -> NodeResult<()> {
        if self.services.contains_key(name) {
            return Err(NodeError::DuplicateService(name.to_string()));
        }

        let backend = self.connector.connect(endpoint, key).await?;

        match self.services.entry(name.to_string()) {
            Entry::Occupied(_) => Err(NodeError::DuplicateService(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(backend);
                tracing::info!("node: registered pinning service '{name}' at {endpoint}");
                Ok(())
            }
        }
    }

    /// Names of the registered pinning services, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Pinned records for `cid` on `service`.
    pub async fn remote_pin_ls(&self, cid: ContentId, service: &str) -> NodeResult<Vec<PinRecord>> {
        let backend = self.service(service)?;
        Ok(backend.list(cid, &[PinStatus::Pinned]).await?)
    }

    /// Asks a pinning service to pin `cid`, advertising this node's origins.
    ///
    /// In foreground mode this polls the request until the service reports
    /// it `pinned` (or `failed`); otherwise it returns the accepted request.
    pub async fn remote_pin_add(&self, cid: ContentId, opts: PinOptions) -> NodeResult<PinRecord> {
        let backend = self.service(&opts.service)?;

        let mut record = backend.add(cid, opts.name, self.origins()).await?;
        if !opts.foreground {
            return Ok(record);
        }

        while !record.status.is_settled() {
            tokio::time::sleep(self.poll_interval).await;
            record = backend.status(&record.request_id).await?;
        }
        if record.status == PinStatus::Failed {
            return Err(NodeError::PinFailed {
                service: opts.service,
                cid,
                request_id: record.request_id,
            });
        }
        Ok(record)
    }

    /// Drops every registered pinning service and stops serving peers.
    pub async fn shutdown(&self) {
        self.services.clear();
        if let Some(network) = &self.network
            && let Err(err) = network.shutdown().await
        {
            tracing::warn!("node: network shutdown failed: {err:#}");
        }
        tracing::info!("node: shut down");
    }

    fn service(&self, name: &str) -> NodeResult<Arc<dyn RemotePinning>> {
        self.services
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| NodeError::UnknownService(name.to_string()))
    }

    async fn fetch_remote(&self, cid: ContentId) -> Option<Bytes> {
        if let Some(bytes) = self.fetch_from_peers(cid).await {
            return Some(bytes);
        }
        if self.fetcher.is_empty() {
            return None;
        }
        match self.fetcher.fetch(cid).await {
            FetchResult::Ok(bytes) => Some(bytes),
            FetchResult::NotFound => None,
            FetchResult::AllFailed(errors) => {
                for e in &errors {
                    tracing::warn!("node: gateway {} failed for {cid}: {}", e.gateway, e.reason);
                }
                None
            }
        }
    }

    async fn fetch_from_peers(&self, cid: ContentId) -> Option<Bytes> {
        let network = self.network.as_ref()?;
        let peers = self.peers.read().await.clone();
        for peer in peers {
            match net_protocol::fetch_from_peer(network.endpoint(), peer.clone(), cid).await {
                Ok(Some(bytes)) if Hash::new(&bytes) == cid.hash() => {
                    tracing::debug!("node: fetched {cid} from peer {peer:?}");
                    return Some(bytes);
                }
                Ok(Some(_)) => tracing::warn!("node: peer {peer:?} sent wrong bytes for {cid}"),
                Ok(None) => tracing::trace!("node: peer {peer:?} does not have {cid}"),
                Err(err) => tracing::warn!("node: peer {peer:?} failed for {cid}: {err:#}"),
            }
        }
        None
    }
}

fn not_found_or(cid: ContentId, err: anyhow::Error) -> NodeError {
    if StoreError::is_not_found(&err) {
        NodeError::NotFound(cid)
    } else {
        NodeError::Other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::pinning::{MemoryConnector, MemoryPinningService};
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn offline() -> NodeConfig {
        NodeConfig {
            network: NetworkConfig::disabled(),
            ..Default::default()
        }
    }

    async fn node_with(connector: MemoryConnector) -> ContentNode {
        ContentNode::spawn_with_connector(offline(), Arc::new(connector))
            .await
            .unwrap()
    }

    async fn cat_all(node: &ContentNode, cid: ContentId) -> NodeResult<Vec<u8>> {
        let chunks: Vec<Bytes> = node
            .cat(cid)
            .await?
            .try_collect()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn test_add_is_content_addressed() {
        let node = node_with(MemoryConnector::new()).await;
        let a = node.add("a.txt", Bytes::from_static(b"same")).await.unwrap();
        let b = node.add("b.txt", Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(a, b);
        assert!(node.has(a).await.unwrap());
        assert_eq!(cat_all(&node, a).await.unwrap(), b"same");
    }

    #[tokio::test]
    async fn test_cat_unknown_is_not_found() {
        let node = node_with(MemoryConnector::new()).await;
        let cid = ContentId::for_bytes(b"never added");
        assert!(matches!(
            cat_all(&node, cid).await,
            Err(NodeError::NotFound(c)) if c == cid
        ));
    }

    #[tokio::test]
    async fn test_duplicate_service_rejected() {
        let svc = Arc::new(MemoryPinningService::new());
        let node = node_with(MemoryConnector::new().with_service("mem://a", svc)).await;

        node.register_pinning_service("a", "mem://a", "k").await.unwrap();
        assert!(matches!(
            node.register_pinning_service("a", "mem://a", "k").await,
            Err(NodeError::DuplicateService(_))
        ));
        assert_eq!(node.services(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let node = node_with(MemoryConnector::new()).await;
        let cid = ContentId::for_bytes(b"x");
        assert!(matches!(
            node.remote_pin_ls(cid, "nope").await,
            Err(NodeError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_add_carries_asset_name() {
        let svc = Arc::new(MemoryPinningService::new());
        let node = node_with(MemoryConnector::new().with_service("mem://a", svc.clone())).await;
        node.register_pinning_service("a", "mem://a", "k").await.unwrap();

        let cid = node.add("cat.png", Bytes::from_static(b"meow")).await.unwrap();
        let record = node
            .remote_pin_add(cid, PinOptions::background("a").named("cat.png"))
            .await
            .unwrap();
        assert_eq!(record.name.as_deref(), Some("cat.png"));

        let unnamed = node
            .remote_pin_add(cid, PinOptions::background("a"))
            .await
            .unwrap();
        assert_eq!(unnamed.name, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_pin_waits_until_pinned() {
        let svc = Arc::new(MemoryPinningService::new().with_pending_polls(3));
        let node = node_with(MemoryConnector::new().with_service("mem://a", svc.clone())).await;
        node.register_pinning_service("a", "mem://a", "k").await.unwrap();
        let cid = ContentId::for_bytes(b"slow");

        let background = node
            .remote_pin_add(cid, PinOptions::background("a"))
            .await
            .unwrap();
        assert_eq!(background.status, PinStatus::Queued);

        let record = node
            .remote_pin_add(cid, PinOptions::foreground("a"))
            .await
            .unwrap();
        assert_eq!(record.status, PinStatus::Pinned);
        assert_eq!(svc.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_drops_services() {
        let svc = Arc::new(MemoryPinningService::new());
        let node = node_with(MemoryConnector::new().with_service("mem://a", svc)).await;
        node.register_pinning_service("a", "mem://a", "k").await.unwrap();
        node.shutdown().await;
        assert!(node.services().is_empty());
    }

    #[tokio::test]
    async fn test_offline_node_advertises_only_configured_origins() {
        let config = NodeConfig {
            origins: vec!["/dns4/cdn.example/tcp/443/https".into()],
            ..offline()
        };
        let node = ContentNode::spawn_with_connector(config, Arc::new(MemoryConnector::new()))
            .await
            .unwrap();
        assert_eq!(node.origins(), vec!["/dns4/cdn.example/tcp/443/https".to_string()]);
        assert!(node.endpoint_addr().is_none());
    }

    async fn local_node(connector: MemoryConnector) -> ContentNode {
        let config = NodeConfig {
            network: NetworkConfig::local(),
            ..Default::default()
        };
        ContentNode::spawn_with_connector(config, Arc::new(connector))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pin_request_advertises_endpoint() {
        let svc = Arc::new(MemoryPinningService::new());
        let node = local_node(MemoryConnector::new().with_service("mem://a", svc.clone())).await;
        node.register_pinning_service("a", "mem://a", "k").await.unwrap();

        let cid = node.add("cat.png", Bytes::from_static(b"meow")).await.unwrap();
        node.remote_pin_add(cid, PinOptions::foreground("a"))
            .await
            .unwrap();

        let origins = svc.origins_for(cid);
        assert_eq!(origins.len(), 1);
        assert!(origins[0].starts_with("/iroh/"), "{origins:?}");
        assert_eq!(origins, node.origins());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_added_content_is_fetchable_by_peers() {
        let provider = local_node(MemoryConnector::new()).await;
        let fetcher = local_node(MemoryConnector::new()).await;
        fetcher
            .add_peer(provider.endpoint_addr().unwrap())
            .await;

        let data = Bytes::from(vec![42u8; 300_000]);
        let cid = provider.add("big.bin", data.clone()).await.unwrap();
        assert!(!fetcher.has(cid).await.unwrap());

        assert_eq!(cat_all(&fetcher, cid).await.unwrap(), data.as_ref());
        assert!(fetcher.has(cid).await.unwrap());

        let missing = ContentId::for_bytes(b"held by nobody");
        assert!(matches!(
            cat_all(&fetcher, missing).await,
            Err(NodeError::NotFound(c)) if c == missing
        ));

        fetcher.shutdown().await;
        provider.shutdown().await;
    }

    async fn node_with_gateway(server: &MockServer) -> ContentNode {
        let config = NodeConfig {
            gateways: vec![format!("{}/ipfs", server.uri())],
            ..offline()
        };
        ContentNode::spawn_with_connector(config, Arc::new(MemoryConnector::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cat_falls_back_to_gateway_and_keeps_content() {
        let server = MockServer::start().await;
        let data = b"fetched from a gateway";
        let cid = ContentId::for_bytes(data);
        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{cid}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let node = node_with_gateway(&server).await;
        assert!(!node.has(cid).await.unwrap());
        assert_eq!(cat_all(&node, cid).await.unwrap(), data);
        assert!(node.has(cid).await.unwrap());

        // Served locally now; the mock allows a single request.
        assert_eq!(cat_all(&node, cid).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_cat_rejects_tampered_gateway_content() {
        let server = MockServer::start().await;
        let cid = ContentId::for_bytes(b"the real bytes");
        Mock::given(method("GET"))
            .and(path(format!("/ipfs/{cid}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"forged bytes".to_vec()))
            .mount(&server)
            .await;

        let node = node_with_gateway(&server).await;
        assert!(matches!(
            cat_all(&node, cid).await,
            Err(NodeError::NotFound(c)) if c == cid
        ));
        assert!(!node.has(cid).await.unwrap());
    }
}
