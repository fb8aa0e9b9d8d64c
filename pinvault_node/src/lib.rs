//! Embedded content node for pinvault.
//!
//! [`ContentNode`] stores blobs in a local `BlobStore` and serves them to
//! peers over an iroh endpoint, whose address it advertises to pinning
//! services as an origin. Content it doesn't hold is asked of known peers
//! and then of HTTP gateways. The node also keeps the registry of remote
//! pinning services that pin requests are routed through.

pub mod config;
pub mod fetcher;
pub mod net_protocol;
pub mod network;
pub mod node;
pub mod pinning;

pub use config::{NetworkConfig, NodeConfig, NodeConfigStore};
pub use iroh::EndpointAddr;
pub use node::{ContentNode, NodeError, NodeResult};
pub use pinning::{
    HttpConnector, HttpPinningService, MemoryConnector, MemoryPinningService, PinOptions,
    PinningConnector,
};

use pinvault_core::{BlobStore, StoreResult};
use pinvault_store_local::LocalStore;
pub use pinvault_store_local::LocalStoreConfig;
use pinvault_store_memory::MemoryStore;

pub async fn create_store(config: &NodeConfigStore) -> StoreResult<BlobStore> {
    let blobs = match config {
        NodeConfigStore::Memory => MemoryStore::new().to_blob_store(),
        NodeConfigStore::Local(config) => {
            tokio::fs::create_dir_all(&config.base_path).await?;
            LocalStore::create(config.clone()).to_blob_store()
        }
    };
    Ok(blobs)
}
