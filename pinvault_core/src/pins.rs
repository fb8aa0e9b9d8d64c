//! Remote pinning protocol.
//!
//! A pinning service keeps a copy of content reachable on the network on
//! our behalf. The trait mirrors the operations of the IPFS Pinning
//! Service API: list existing pins, submit a pin request, and poll the
//! status of a submitted request. The service is the source of truth for
//! pin state; nothing is cached locally.

use crate::ContentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pin request on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinStatus {
    Queued,
    Pinning,
    Pinned,
    Failed,
}

impl PinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinStatus::Queued => "queued",
            PinStatus::Pinning => "pinning",
            PinStatus::Pinned => "pinned",
            PinStatus::Failed => "failed",
        }
    }

    /// `queued` and `pinning` may still change.
    pub fn is_settled(&self) -> bool {
        matches!(self, PinStatus::Pinned | PinStatus::Failed)
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pin as reported by a pinning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRecord {
    pub request_id: String,
    pub status: PinStatus,
    pub cid: ContentId,
    pub name: Option<String>,
}

/// A single remote pinning backend.
#[async_trait::async_trait]
pub trait RemotePinning: fmt::Debug + Send + Sync + 'static {
    /// Pins for `cid` whose status is one of `statuses`.
    async fn list(&self, cid: ContentId, statuses: &[PinStatus]) -> anyhow::Result<Vec<PinRecord>>;

    /// Submits a pin request. Returns as soon as the service accepted it.
    async fn add(
        &self,
        cid: ContentId,
        name: Option<String>,
        origins: Vec<String>,
    ) -> anyhow::Result<PinRecord>;

    /// Current state of a previously submitted request.
    async fn status(&self, request_id: &str) -> anyhow::Result<PinRecord>;
}
