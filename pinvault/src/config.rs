use crate::credential::{CredentialConfig, CredentialProvider};
use pinvault_node::NodeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssetStoreConfig {
    pub node: NodeConfig,
    /// Scheme used when rendering and parsing asset URIs.
    pub uri_scheme: String,
    pub pinning_services: Vec<PinningServiceConfig>,
    /// Upper bound for one backend's check-and-pin during a fan-out.
    pub pin_timeout_secs: u64,
    pub registration_policy: RegistrationPolicy,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            uri_scheme: pinvault_core::uri::DEFAULT_SCHEME.to_string(),
            pinning_services: Vec::new(),
            pin_timeout_secs: 120,
            registration_policy: RegistrationPolicy::default(),
        }
    }
}

impl AssetStoreConfig {
    pub fn pin_timeout(&self) -> Duration {
        Duration::from_secs(self.pin_timeout_secs)
    }
}

/// What initialization does when a pinning service can't be registered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// The first failure fails initialization.
    #[default]
    Abort,
    /// Log the failure and carry on with the remaining services.
    SkipFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinningServiceConfig {
    pub name: String,
    pub endpoint: String,
    pub credential: CredentialConfig,
}

/// A pinning service to register when the store initializes.
#[derive(Clone)]
pub struct PinningService {
    pub name: String,
    pub endpoint: String,
    pub credential: Arc<dyn CredentialProvider>,
}

impl PinningService {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        credential: impl CredentialProvider,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            credential: Arc::new(credential),
        }
    }
}

impl fmt::Debug for PinningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinningService")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl From<PinningServiceConfig> for PinningService {
    fn from(config: PinningServiceConfig) -> Self {
        Self {
            name: config.name,
            endpoint: config.endpoint,
            credential: config.credential.into_provider(),
        }
    }
}
