//! Network retrieval for content the node does not hold locally.
//!
//! `GatewayFetcher` asks a list of HTTP gateways for `GET {gateway}/{cid}`
//! in order and returns the first response whose BLAKE3 hash matches the
//! identifier. Responses that fail verification count as errors, not hits.

use bytes::Bytes;
use pinvault_core::{ContentId, Hash};
use std::time::Duration;

/// Result of a fetch operation.
#[derive(Debug)]
pub enum FetchResult {
    Ok(Bytes),
    /// Every gateway answered and none had the content.
    NotFound,
    /// At least one gateway errored, so the content may still exist.
    AllFailed(Vec<FetchError>),
}

/// Error from a single gateway.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub gateway: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GatewayFetcher {
    client: reqwest::Client,
    gateways: Vec<String>,
}

impl GatewayFetcher {
    pub fn new(gateways: Vec<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let gateways = gateways
            .into_iter()
            .map(|g| g.trim_end_matches('/').to_string())
            .collect();
        Ok(Self { client, gateways })
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    /// Tries each gateway in order until one returns verified content.
    pub async fn fetch(&self, cid: ContentId) -> FetchResult {
        let mut errors = Vec::new();

        for gateway in &self.gateways {
            match self.try_fetch_from(gateway, cid).await {
                Ok(Some(bytes)) => return FetchResult::Ok(bytes),
                Ok(None) => {
                    tracing::debug!("fetcher: {gateway} does not have {cid}");
                }
                Err(e) => {
                    tracing::debug!("fetcher: {} failed for {cid}: {}", e.gateway, e.reason);
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            FetchResult::NotFound
        } else {
            FetchResult::AllFailed(errors)
        }
    }

    async fn try_fetch_from(
        &self,
        gateway: &str,
        cid: ContentId,
    ) -> Result<Option<Bytes>, FetchError> {
        let fail = |reason: String| FetchError {
            gateway: gateway.to_string(),
            reason,
        };

        let res = self
            .client
            .get(format!("{gateway}/{cid}"))
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(fail(format!("HTTP {}", res.status().as_u16())));
        }

        let bytes = res
            .bytes()
            .await
            .map_err(|e| fail(format!("body read failed: {e}")))?;
        verify(cid, &bytes).map_err(fail)?;
        Ok(Some(bytes))
    }
}

fn verify(cid: ContentId, bytes: &[u8]) -> Result<(), String> {
    let actual = Hash::new(bytes);
    if actual != cid.hash() {
        return Err(format!(
            "hash mismatch: expected {}, got {}",
            cid.hash().fmt_short(),
            actual.fmt_short()
        ));
    }
    Ok(())
}
