//! In-process pinning service.
//!
//! Behaves like a remote service (request ids, `queued -> pinned`
//! transitions) without any network. Counters record how often each
//! operation was invoked, and a failure or delay can be injected to
//! exercise degraded backends.

use super::PinningConnector;
use anyhow::anyhow;
use dashmap::DashMap;
use pinvault_core::{ContentId, PinRecord, PinStatus, RemotePinning};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MemoryPinningService {
    pins: DashMap<String, Entry>,
    next_id: AtomicU64,
    list_calls: AtomicUsize,
    add_calls: AtomicUsize,
    status_calls: AtomicUsize,
    /// Number of status polls a new request stays `queued` for.
    pending_polls: AtomicU32,
    failure: RwLock<Option<String>>,
    delay: RwLock<Option<Duration>>,
}

#[derive(Debug, Clone)]
struct Entry {
    record: PinRecord,
    origins: Vec<String>,
    polls_left: u32,
}

impl MemoryPinningService {
    pub fn new() -> Self {
        Self::default()
    }

    /// New requests report `queued` for `polls` status checks before
    /// becoming `pinned`.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }

    /// Every call fails with `reason` until cleared with `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        if let Ok(mut failure) = self.failure.write() {
            *failure = reason.map(str::to_string);
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.delay.write() {
            *d = delay;
        }
    }

    /// Marks `cid` as pinned without going through `add`.
    pub fn seed_pinned(&self, cid: ContentId) {
        let request_id = self.next_request_id();
        self.pins.insert(
            request_id.clone(),
            Entry {
                record: PinRecord {
                    request_id,
                    status: PinStatus::Pinned,
                    cid,
                    name: None,
                },
                origins: Vec::new(),
                polls_left: 0,
            },
        );
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self, cid: ContentId) -> bool {
        self.pins
            .iter()
            .any(|e| e.record.cid == cid && e.record.status == PinStatus::Pinned)
    }

    /// Origins sent with every pin request for `cid`.
    pub fn origins_for(&self, cid: ContentId) -> Vec<String> {
        self.pins
            .iter()
            .filter(|e| e.record.cid == cid)
            .flat_map(|e| e.origins.clone())
            .collect()
    }

    fn next_request_id(&self) -> String {
        format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn simulate(&self) -> anyhow::Result<()> {
        let delay = self.delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.read().ok().and_then(|f| f.clone());
        match failure {
            Some(reason) => Err(anyhow!(reason)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RemotePinning for MemoryPinningService {
    async fn list(&self, cid: ContentId, statuses: &[PinStatus]) -> anyhow::Result<Vec<PinRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self
            .pins
            .iter()
            .filter(|e| e.record.cid == cid)
            .filter(|e| statuses.is_empty() || statuses.contains(&e.record.status))
            .map(|e| e.record.clone())
            .collect())
    }

    async fn add(
        &self,
        cid: ContentId,
        name: Option<String>,
        origins: Vec<String>,
    ) -> anyhow::Result<PinRecord> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let polls_left = self.pending_polls.load(Ordering::SeqCst);
        let status = if polls_left == 0 {
            PinStatus::Pinned
        } else {
            PinStatus::Queued
        };
        let record = PinRecord {
            request_id: self.next_request_id(),
            status,
            cid,
            name,
        };
        self.pins.insert(
            record.request_id.clone(),
            Entry {
                record: record.clone(),
                origins,
                polls_left,
            },
        );
        Ok(record)
    }

    async fn status(&self, request_id: &str) -> anyhow::Result<PinRecord> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;

        let mut entry = self
            .pins
            .get_mut(request_id)
            .ok_or_else(|| anyhow!("unknown pin request {request_id}"))?;
        if entry.polls_left > 0 {
            entry.polls_left -= 1;
            if entry.polls_left == 0 {
                entry.record.status = PinStatus::Pinned;
            }
        }
        Ok(entry.record.clone())
    }
}

/// Resolves endpoints to pre-registered `MemoryPinningService`s.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    services: Arc<DashMap<String, Arc<MemoryPinningService>>>,
    keys: Arc<DashMap<String, String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(
        self,
        endpoint: impl Into<String>,
        service: Arc<MemoryPinningService>,
    ) -> Self {
        self.services.insert(endpoint.into(), service);
        self
    }

    /// The key last used to connect to `endpoint`.
    pub fn key_for(&self, endpoint: &str) -> Option<String> {
        self.keys.get(endpoint).map(|k| k.clone())
    }
}

#[async_trait::async_trait]
impl PinningConnector for MemoryConnector {
    async fn connect(&self, endpoint: &str, key: &str) -> anyhow::Result<Arc<dyn RemotePinning>> {
        let service = self
            .services
            .get(endpoint)
            .map(|s| s.clone())
            .ok_or_else(|| anyhow!("no pinning service at {endpoint}"))?;
        self.keys.insert(endpoint.to_string(), key.to_string());
        Ok(service as Arc<dyn RemotePinning>)
    }
}
