//! Core pinvault types and traits.
//!
//! This crate defines the types shared by the node adapter and the asset
//! store:
//!
//! - Content hashes (`hash::Hash`, BLAKE3)
//! - Content identifiers (`cid::ContentId`) and asset URIs (`uri::AssetUri`)
//! - The storage abstraction (`Store`, `StoreFeatures`) and the `BlobStore`
//!   facade that lays content-addressed blobs out on top of it
//! - The remote pinning protocol (`pins::RemotePinning`, `PinRecord`,
//!   `PinStatus`) spoken to third-party pinning services
//!
//! Store backends live in their own crates (`pinvault_store_memory`,
//! `pinvault_store_local`) and run the shared conformance suite from
//! `testutil` (behind the `testutil` feature).

pub mod blob;
pub mod cid;
pub mod hash;
pub mod pins;
pub mod store;
pub mod uri;

#[cfg(feature = "testutil")]
pub mod testutil;

pub use blob::store::BlobStore;
pub use cid::{ContentId, ContentIdError};
pub use hash::Hash;
pub use pins::{PinRecord, PinStatus, RemotePinning};
pub use store::{Store, StoreError, StoreFeatures, StoreResult};
pub use uri::AssetUri;
