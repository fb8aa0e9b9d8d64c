//! Content-addressed asset store with fan-out pinning.
//!
//! [`AssetStore`] adds assets to an embedded [`ContentNode`], hands back their
//! [`ContentId`], and makes sure every registered remote pinning service
//! holds a pin before returning. Reads accept either an asset URI
//! (`ipfs://<cid>`) or the bare identifier.
//!
//! ```no_run
//! # async fn demo() -> pinvault::Result<()> {
//! use pinvault::{AssetStore, AssetStoreConfig, PinningService, StaticCredential};
//!
//! let store = AssetStore::builder(AssetStoreConfig::default())
//!     .service(PinningService::new(
//!         "pinata",
//!         "https://api.pinata.cloud/psa",
//!         StaticCredential::new("jwt"),
//!     ))
//!     .build();
//!
//! let cid = store.add_asset("cat.png", None).await?;
//! let bytes = store.get(&store.uri_for(cid).to_string()).await?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod lifecycle;
pub mod store;

pub use config::{AssetStoreConfig, PinningService, PinningServiceConfig, RegistrationPolicy};
pub use coordinator::{PinCoordinator, PinOutcome, PinReport};
pub use credential::{
    CredentialConfig, CredentialProvider, EnvCredential, FnCredential, StaticCredential,
};
pub use error::{BackendFailure, Error, Result};
pub use lifecycle::LifecycleStatus;
pub use store::{AssetStore, AssetStoreBuilder};

pub use pinvault_core::{AssetUri, ContentId, ContentIdError};
pub use pinvault_node::{
    ContentNode, LocalStoreConfig, MemoryConnector, MemoryPinningService, NetworkConfig,
    NodeConfig, NodeConfigStore, PinningConnector,
};
