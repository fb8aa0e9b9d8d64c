//! The node's iroh endpoint and the router serving its blobs.

use crate::config::NetworkConfig;
use crate::net_protocol::{ALPN, BlobsProvider};
use anyhow::{Context, anyhow};
use base64::Engine;
use iroh::{Endpoint, EndpointAddr, EndpointId, RelayMode, SecretKey, protocol::Router};
use pinvault_core::BlobStore;
use std::path::Path;

#[derive(Debug)]
pub struct Network {
    router: Router,
}

impl Network {
    /// Binds an endpoint and starts serving `blobs` to peers.
    pub async fn spawn(config: &NetworkConfig, blobs: BlobStore) -> anyhow::Result<Self> {
        let mut builder = Endpoint::builder();
        if let Some(path) = &config.secret_key_file {
            builder = builder.secret_key(load_secret_key(path).await?);
        }
        builder = if config.relay {
            // iroh 0.94: `Endpoint::builder()` already applies the N0 preset (discovery + relays)
            builder
        } else {
            builder.relay_mode(RelayMode::Disabled)
        };
        let endpoint = builder.bind().await.context("binding iroh endpoint")?;

        let router = Router::builder(endpoint)
            .accept(ALPN, BlobsProvider::new(blobs))
            .spawn();

        let network = Self { router };
        tracing::info!("network: serving blobs as {}", network.origin());
        Ok(network)
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.router.endpoint()
    }

    pub fn addr(&self) -> EndpointAddr {
        self.endpoint().addr()
    }

    /// Where pinning services can fetch our content from.
    pub fn origin(&self) -> String {
        format!("/iroh/{}", self.endpoint().id())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.router.shutdown().await?;
        Ok(())
    }
}

/// Parses configured peers, given as endpoint ids.
pub fn parse_peers(peers: &[String]) -> anyhow::Result<Vec<EndpointAddr>> {
    peers
        .iter()
        .map(|peer| {
            let id: EndpointId = peer
                .trim()
                .parse()
                .with_context(|| format!("invalid peer endpoint id '{peer}'"))?;
            Ok(EndpointAddr::new(id))
        })
        .collect()
}

/// Reads a secret key stored either as 32 raw bytes or as unpadded
/// url-safe base64 text.
pub async fn load_secret_key(path: &Path) -> anyhow::Result<SecretKey> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading secret key from {}", path.display()))?;

    let bytes: [u8; 32] = match <[u8; 32]>::try_from(raw.as_slice()) {
        Ok(bytes) => bytes,
        Err(_) => {
            let text = std::str::from_utf8(&raw)
                .map_err(|_| anyhow!("secret key in {} is neither 32 bytes nor text", path.display()))?;
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(text.trim())
                .with_context(|| format!("decoding secret key in {}", path.display()))?
                .try_into()
                .map_err(|_| anyhow!("secret key in {} must be 32 bytes", path.display()))?
        }
    };
    Ok(SecretKey::from_bytes(&bytes))
}
