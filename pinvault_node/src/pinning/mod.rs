//! Remote pinning backends the node can register.

pub mod http;
pub mod memory;

use pinvault_core::RemotePinning;
use std::sync::Arc;

pub use http::{HttpConnector, HttpPinningService};
pub use memory::{MemoryConnector, MemoryPinningService};

/// Builds a backend client from an endpoint and a resolved secret.
#[async_trait::async_trait]
pub trait PinningConnector: std::fmt::Debug + Send + Sync + 'static {
    async fn connect(&self, endpoint: &str, key: &str) -> anyhow::Result<Arc<dyn RemotePinning>>;
}

/// Options for `ContentNode::remote_pin_add`.
#[derive(Debug, Clone)]
pub struct PinOptions {
    pub service: String,
    /// Wait until the service reports the content as pinned.
    pub foreground: bool,
    /// Human-readable name sent along with the pin request.
    pub name: Option<String>,
}

impl PinOptions {
    pub fn foreground(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            foreground: true,
            name: None,
        }
    }

    pub fn background(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            foreground: false,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
