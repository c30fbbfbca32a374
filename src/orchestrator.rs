//! Pin Orchestration
//!
//! Fans one identifier out to every storage target and collects one result
//! per target:
//! 1. Local pin on the content store (always attempted, reported as `local`)
//! 2. Pin request to every configured remote provider
//! 3. Bounded confirmation polling per remote provider
//!
//! ## Isolation
//!
//! All targets run concurrently and independently. A failing provider,
//! including one with bad credentials or one that is unreachable, only
//! affects its own entry in the result list. Orchestration itself never
//! fails: total failure is a list where every `success` is `false`.
//!
//! ## Success
//!
//! `success` means confirmed: the local store pinned the content, or a
//! provider status query returned `Pinned`. An acknowledged request that
//! never confirmed within the polling bound is `acknowledged: true,
//! success: false`.
//!
//! ## Detached replication
//!
//! `spawn_replication` runs orchestration on a background task so the
//! upload path does not wait for it. The task is not cancelled when the
//! caller goes away. Its outcome is always logged, returned through the
//! [`ReplicationHandle`], and optionally pushed on a report channel.

use crate::cid::ContentId;
use crate::remote::{PollOutcome, RemotePinClient};
use crate::store::ContentStore;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

/// Provider name under which the local store is reported.
pub const LOCAL_PROVIDER: &str = "local";

/// Outcome for one storage target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinningResult {
    pub provider: String,
    /// Confirmed pinned.
    pub success: bool,
    /// Request accepted by the target.
    pub acknowledged: bool,
    pub error: Option<String>,
}

impl PinningResult {
    pub fn confirmed(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            success: true,
            acknowledged: true,
            error: None,
        }
    }

    pub fn unconfirmed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            acknowledged: true,
            error: Some(error.into()),
        }
    }

    pub fn failed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            acknowledged: false,
            error: Some(error.into()),
        }
    }
}

/// Counts derived from a result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_providers: Vec<String>,
}

impl ReplicationSummary {
    pub fn from_results(results: &[PinningResult]) -> Self {
        Self {
            total: results.len(),
            succeeded: results.iter().filter(|r| r.success).count(),
            failed_providers: results
                .iter()
                .filter(|r| !r.success)
                .map(|r| r.provider.clone())
                .collect(),
        }
    }

    /// Some targets succeeded and some did not.
    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && !self.failed_providers.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_providers.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        self.succeeded == 0
    }
}

/// Completion notice for a detached replication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationReport {
    pub identifier: ContentId,
    pub results: Vec<PinningResult>,
    pub summary: ReplicationSummary,
}

/// Handle to a detached replication task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct ReplicationHandle {
    identifier: ContentId,
    join: JoinHandle<Vec<PinningResult>>,
}

impl ReplicationHandle {
    pub fn identifier(&self) -> &ContentId {
        &self.identifier
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the results. Fails only if the task panicked.
    pub async fn wait(self) -> Result<Vec<PinningResult>, JoinError> {
        self.join.await
    }
}

/// Replicates content to the local store and every remote provider.
pub struct PinOrchestrator {
    store: Arc<dyn ContentStore>,
    clients: Vec<Arc<RemotePinClient>>,
    reports: Option<UnboundedSender<ReplicationReport>>,
}

impl PinOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, clients: Vec<Arc<RemotePinClient>>) -> Self {
        Self {
            store,
            clients,
            reports: None,
        }
    }

    /// Push a [`ReplicationReport`] for every detached replication.
    pub fn with_reports(mut self, sender: UnboundedSender<ReplicationReport>) -> Self {
        self.reports = Some(sender);
        self
    }

    pub fn clients(&self) -> &[Arc<RemotePinClient>] {
        &self.clients
    }

    /// Pin `cid` everywhere. Returns `1 + clients` results: `local` first,
    /// then remotes in configuration order.
    ///
    /// When `data` is absent and some provider needs the bytes, they are
    /// read from the local block store.
    pub async fn pin_to_all_providers(&self, cid: &ContentId, data: Option<&[u8]>) -> Vec<PinningResult> {
        let data = self.resolve_bytes(cid, data).await;
        let data = data.as_deref();

        let mut tasks: Vec<BoxFuture<'_, PinningResult>> = Vec::with_capacity(1 + self.clients.len());
        tasks.push(self.pin_local(cid).boxed());
        for client in &self.clients {
            tasks.push(Self::pin_remote(client, cid, data).boxed());
        }

        let results = join_all(tasks).await;
        let summary = ReplicationSummary::from_results(&results);
        if summary.all_succeeded() {
            info!(cid = %cid, targets = summary.total, "pinned on every target");
        } else {
            warn!(
                cid = %cid,
                succeeded = summary.succeeded,
                total = summary.total,
                failed = ?summary.failed_providers,
                "replication incomplete"
            );
        }
        results
    }

    async fn resolve_bytes<'a>(&self, cid: &ContentId, data: Option<&'a [u8]>) -> Option<Cow<'a, [u8]>> {
        if let Some(data) = data {
            return Some(Cow::Borrowed(data));
        }
        if self.clients.iter().all(|c| c.resolves_by_reference()) {
            return None;
        }
        match self.store.read_local(cid).await {
            Ok(bytes) => bytes.map(Cow::Owned),
            Err(e) => {
                warn!(cid = %cid, error = %e, "could not load bytes for upload-only providers");
                None
            }
        }
    }

    async fn pin_local(&self, cid: &ContentId) -> PinningResult {
        match self.store.pin_local(cid).await {
            Ok(()) => PinningResult::confirmed(LOCAL_PROVIDER),
            Err(e) => {
                warn!(cid = %cid, error = %e, "local pin failed");
                PinningResult::failed(LOCAL_PROVIDER, e.to_string())
            }
        }
    }

    async fn pin_remote(client: &RemotePinClient, cid: &ContentId, data: Option<&[u8]>) -> PinningResult {
        if let Err(e) = client.request_pin(cid, data).await {
            return PinningResult::failed(client.name(), e.to_string());
        }

        match client.confirm(cid).await {
            PollOutcome::Confirmed { .. } => PinningResult::confirmed(client.name()),
            PollOutcome::Rejected { .. } => {
                PinningResult::unconfirmed(client.name(), "provider reported the pin as failed")
            }
            PollOutcome::Exhausted { attempts, .. } => PinningResult::unconfirmed(
                client.name(),
                format!("not confirmed after {} attempts", attempts),
            ),
            PollOutcome::Aborted(e) => PinningResult::unconfirmed(client.name(), e.to_string()),
        }
    }

    /// Replicate on a background task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn_replication(self: &Arc<Self>, cid: ContentId, data: Option<Vec<u8>>) -> ReplicationHandle {
        let orchestrator = Arc::clone(self);
        let identifier = cid.clone();

        let join = tokio::spawn(async move {
            let results = orchestrator.pin_to_all_providers(&cid, data.as_deref()).await;
            let summary = ReplicationSummary::from_results(&results);
            info!(
                cid = %cid,
                succeeded = summary.succeeded,
                total = summary.total,
                partial = summary.is_partial_failure(),
                "detached replication finished"
            );

            if let Some(reports) = &orchestrator.reports {
                let report = ReplicationReport {
                    identifier: cid.clone(),
                    results: results.clone(),
                    summary,
                };
                if reports.send(report).is_err() {
                    warn!(cid = %cid, "replication report receiver dropped");
                }
            }
            results
        });

        ReplicationHandle { identifier, join }
    }
}
