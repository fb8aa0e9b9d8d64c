//! Fan-out pinning across the registered pinning services.

use crate::config::PinningService;
use crate::error::{BackendFailure, Error, Result};
use dashmap::DashMap;
use pinvault_core::ContentId;
use pinvault_node::{ContentNode, NodeError, PinOptions};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// What a backend needed to do for a `pin` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOutcome {
    /// The service already had a pin; no request was sent.
    AlreadyPinned,
    /// A pin request was sent and the service confirmed it.
    Pinned,
}

/// Per-service outcomes of a successful `pin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinReport {
    outcomes: BTreeMap<String, PinOutcome>,
}

impl PinReport {
    pub fn outcome(&self, service: &str) -> Option<PinOutcome> {
        self.outcomes.get(service).copied()
    }

    /// Services that received a new pin request.
    pub fn newly_pinned(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == PinOutcome::Pinned)
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no services were registered.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

type InFlight = Arc<OnceCell<Result<PinOutcome, BackendFailure>>>;

/// Keeps the list of registered services and pins content on all of them.
///
/// The service list is built during initialization and read-only after.
/// Concurrent pins of the same cid on the same service share one
/// check-then-pin operation through the in-flight registry.
pub struct PinCoordinator {
    node: Arc<ContentNode>,
    services: Vec<String>,
    pin_timeout: Duration,
    in_flight: DashMap<(ContentId, String), InFlight>,
}

impl std::fmt::Debug for PinCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinCoordinator")
            .field("services", &self.services)
            .field("pin_timeout", &self.pin_timeout)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl PinCoordinator {
    pub fn new(node: Arc<ContentNode>, pin_timeout: Duration) -> Self {
        Self {
            node,
            services: Vec::new(),
            pin_timeout,
            in_flight: DashMap::new(),
        }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Resolves the credential and registers the service with the node.
    pub async fn register_service(&mut self, service: &PinningService) -> Result<()> {
        let key = service.credential.credential().await.map_err(|err| {
            Error::Backend(BackendFailure::new(
                &service.name,
                format!("credential unavailable: {err:#}"),
            ))
        })?;

        self.node
            .register_pinning_service(&service.name, &service.endpoint, &key)
            .await
            .map_err(|err| Error::Backend(BackendFailure::new(&service.name, err)))?;

        self.services.push(service.name.clone());
        Ok(())
    }

    /// Makes sure every registered service holds a pin for `cid`.
    ///
    /// All services are handled concurrently and each one is bounded by the
    /// pin timeout. Returns `Error::Aggregate` naming every service that
    /// failed; services that succeeded stay pinned either way.
    pub async fn pin(&self, cid: ContentId) -> Result<PinReport> {
        self.pin_with(cid, None).await
    }

    /// Like [`pin`](Self::pin), sending `name` with any new pin request.
    pub async fn pin_named(&self, cid: ContentId, name: &str) -> Result<PinReport> {
        self.pin_with(cid, Some(name)).await
    }

    async fn pin_with(&self, cid: ContentId, name: Option<&str>) -> Result<PinReport> {
        if self.services.is_empty() {
            tracing::warn!("pin: no pinning services registered, {cid} is only stored locally");
            return Ok(PinReport::default());
        }

        let results =
            futures::future::join_all(self.services.iter().map(|s| self.pin_on(cid, s, name))).await;

        let mut report = PinReport::default();
        let mut failures = Vec::new();
        for (service, result) in self.services.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    report.outcomes.insert(service.clone(), outcome);
                }
                Err(failure) => {
                    tracing::warn!("pin: {cid} on '{}' failed: {}", failure.service, failure.reason);
                    failures.push(failure);
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::Aggregate(failures));
        }

        tracing::info!(
            "pin: {cid} pinned on {} service(s), {} new request(s)",
            report.len(),
            report.newly_pinned().len()
        );
        Ok(report)
    }

    /// True if `service` reports a pin for `cid`.
    pub async fn is_pinned(&self, cid: ContentId, service: &str) -> Result<bool> {
        if !self.services.iter().any(|s| s == service) {
            return Err(Error::Backend(BackendFailure::new(
                service,
                "service is not registered",
            )));
        }
        self.is_pinned_on(cid, service)
            .await
            .map_err(|err| Error::Backend(BackendFailure::new(service, err)))
    }

    async fn is_pinned_on(&self, cid: ContentId, service: &str) -> Result<bool, NodeError> {
        let records = self.node.remote_pin_ls(cid, service).await?;
        Ok(records.iter().any(|r| r.cid == cid))
    }

    /// Joins an in-flight operation for `(cid, service)` or starts one.
    async fn pin_on(
        &self,
        cid: ContentId,
        service: &str,
        name: Option<&str>,
    ) -> Result<PinOutcome, BackendFailure> {
        let key = (cid, service.to_string());
        let cell: InFlight = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| self.check_and_pin(cid, service, name))
            .await
            .clone();

        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    async fn check_and_pin(
        &self,
        cid: ContentId,
        service: &str,
        name: Option<&str>,
    ) -> Result<PinOutcome, BackendFailure> {
        let work = async {
            if self.is_pinned_on(cid, service).await? {
                tracing::debug!("pin: {cid} already pinned on '{service}'");
                return Ok(PinOutcome::AlreadyPinned);
            }
            tracing::debug!("pin: requesting {cid} on '{service}'");
            let mut opts = PinOptions::foreground(service);
            if let Some(name) = name {
                opts = opts.named(name);
            }
            self.node.remote_pin_add(cid, opts).await?;
            Ok::<_, NodeError>(PinOutcome::Pinned)
        };

        match tokio::time::timeout(self.pin_timeout, work).await {
            Ok(result) => result.map_err(|err| BackendFailure::new(service, err)),
            Err(_) => Err(BackendFailure::new(
                service,
                format!("timed out after {:?}", self.pin_timeout),
            )),
        }
    }
}
