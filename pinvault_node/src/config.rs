use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    pub store: NodeConfigStore,
    /// HTTP gateways tried in order when content is not held locally.
    pub gateways: Vec<String>,
    /// Extra addresses advertised to pinning services, next to the node's
    /// own iroh origin.
    pub origins: Vec<String>,
    pub network: NetworkConfig,
    pub fetch_timeout_secs: u64,
    /// How often a foreground pin polls the service for completion.
    pub poll_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            store: NodeConfigStore::Memory,
            gateways: Vec::new(),
            origins: Vec::new(),
            network: NetworkConfig::default(),
            fetch_timeout_secs: 30,
            poll_interval_ms: 500,
        }
    }
}

impl NodeConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Serve held blobs to peers over iroh. Without it nothing outside this
    /// process can fetch what the node adds.
    pub enabled: bool,
    /// Use the public relays and n0 discovery. Off means direct addresses only.
    pub relay: bool,
    /// Fixes the endpoint id across restarts. 32 raw bytes or base64url text.
    pub secret_key_file: Option<PathBuf>,
    /// Endpoint ids asked for missing content before any gateway.
    pub peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            relay: true,
            secret_key_file: None,
            peers: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Direct connections only, for nodes on one host or LAN.
    pub fn local() -> Self {
        Self {
            relay: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum NodeConfigStore {
    Memory,
    Local(pinvault_store_local::LocalStoreConfig),
}
