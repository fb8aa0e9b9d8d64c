//! Client for services implementing the IPFS Pinning Service API.
//!
//! ```text
//! GET  {endpoint}/pins?cid=<cid>&status=<csv>   -> PinResults
//! POST {endpoint}/pins  {cid, name, origins}     -> PinStatus
//! GET  {endpoint}/pins/{requestid}               -> PinStatus
//! ```
//!
//! Requests carry `Authorization: Bearer <key>`.

use super::PinningConnector;
use anyhow::{Context, anyhow};
use pinvault_core::{ContentId, PinRecord, PinStatus, RemotePinning};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),
    #[error("invalid pinning service endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct HttpPinningService {
    endpoint: String,
    key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpPinningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the key stays out of logs
        f.debug_struct("HttpPinningService")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpPinningService {
    pub fn new(endpoint: &str, key: impl Into<String>) -> Result<Self, Error> {
        reqwest::Url::parse(endpoint)
            .map_err(|e| Error::InvalidEndpoint(endpoint.to_string(), e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key: key.into(),
            client: reqwest::Client::new(),
        })
    }

    fn pins_url(&self) -> String {
        format!("{}/pins", self.endpoint)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let res = req.bearer_auth(&self.key).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::HttpFailWithBody(status.as_u16(), body));
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl RemotePinning for HttpPinningService {
    async fn list(&self, cid: ContentId, statuses: &[PinStatus]) -> anyhow::Result<Vec<PinRecord>> {
        let status_csv = statuses
            .iter()
            .map(PinStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut query = vec![("cid", cid.to_string())];
        if !status_csv.is_empty() {
            query.push(("status", status_csv));
        }

        let results: ApiPinResults = self
            .send(self.client.get(self.pins_url()).query(&query))
            .await?;

        Ok(results
            .results
            .into_iter()
            .filter_map(|s| match s.into_record() {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::debug!("pinning: skipping unreadable pin record: {err}");
                    None
                }
            })
            .collect())
    }

    async fn add(
        &self,
        cid: ContentId,
        name: Option<String>,
        origins: Vec<String>,
    ) -> anyhow::Result<PinRecord> {
        let body = ApiPin {
            cid: cid.to_string(),
            name,
            origins,
        };
        let status: ApiPinStatus = self
            .send(self.client.post(self.pins_url()).json(&body))
            .await?;
        status.into_record()
    }

    async fn status(&self, request_id: &str) -> anyhow::Result<PinRecord> {
        let status: ApiPinStatus = self
            .send(
                self.client
                    .get(format!("{}/{}", self.pins_url(), request_id)),
            )
            .await?;
        status.into_record()
    }
}

/// Connects to real pinning services over HTTPS.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

#[async_trait::async_trait]
impl PinningConnector for HttpConnector {
    async fn connect(&self, endpoint: &str, key: &str) -> anyhow::Result<Arc<dyn RemotePinning>> {
        Ok(Arc::new(HttpPinningService::new(endpoint, key)?))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPin {
    cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPinStatus {
    requestid: String,
    status: PinStatus,
    pin: ApiPin,
}

impl ApiPinStatus {
    fn into_record(self) -> anyhow::Result<PinRecord> {
        let cid = ContentId::parse(&self.pin.cid)
            .with_context(|| format!("pin {} has invalid cid", self.requestid))?;
        if self.requestid.is_empty() {
            return Err(anyhow!("pin for {cid} has an empty request id"));
        }
        Ok(PinRecord {
            request_id: self.requestid,
            status: self.status,
            cid,
            name: self.pin.name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiPinResults {
    results: Vec<ApiPinStatus>,
}
