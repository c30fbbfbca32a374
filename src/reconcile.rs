//! Status reconciliation.
//!
//! Answers "where is this identifier pinned right now" by asking every
//! target directly instead of trusting earlier pin results. Each target is
//! checked concurrently under its own timeout; a check that errors or times
//! out reports `false`. Providers that are not configured do not appear in
//! the snapshot at all.

use crate::cid::ContentId;
use crate::orchestrator::LOCAL_PROVIDER;
use crate::remote::ledger::now_secs;
use crate::remote::RemotePinClient;
use crate::store::ContentStore;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default bound on a single target check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pin status of one identifier across every configured target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinningStatusSnapshot {
    pub identifier: ContentId,
    /// Target name to pinned. Always contains `local`.
    pub per_provider: BTreeMap<String, bool>,
    /// Unix seconds.
    pub checked_at: u64,
}

impl PinningStatusSnapshot {
    pub fn is_pinned(&self, provider: &str) -> Option<bool> {
        self.per_provider.get(provider).copied()
    }

    pub fn pinned_anywhere(&self) -> bool {
        self.per_provider.values().any(|pinned| *pinned)
    }

    pub fn pinned_remotely(&self) -> usize {
        self.per_provider
            .iter()
            .filter(|(name, pinned)| name.as_str() != LOCAL_PROVIDER && **pinned)
            .count()
    }
}

/// Queries every target for the live pin status of an identifier.
pub struct StatusReconciler {
    store: Arc<dyn ContentStore>,
    clients: Vec<Arc<RemotePinClient>>,
    check_timeout: Duration,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn ContentStore>, clients: Vec<Arc<RemotePinClient>>) -> Self {
        Self {
            store,
            clients,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    pub async fn reconcile(&self, cid: &ContentId) -> PinningStatusSnapshot {
        let mut checks: Vec<BoxFuture<'_, (String, bool)>> = Vec::with_capacity(1 + self.clients.len());

        checks.push(
            async move {
                let pinned = match timeout(self.check_timeout, self.store.is_pinned_local(cid)).await {
                    Ok(Ok(pinned)) => pinned,
                    Ok(Err(e)) => {
                        warn!(cid = %cid, error = %e, "local pin check failed");
                        false
                    }
                    Err(_) => {
                        warn!(cid = %cid, "local pin check timed out");
                        false
                    }
                };
                (LOCAL_PROVIDER.to_string(), pinned)
            }
            .boxed(),
        );

        for client in &self.clients {
            checks.push(
                async move {
                    let pinned = match timeout(self.check_timeout, client.check_pinned(cid)).await {
                        Ok(Ok(pinned)) => pinned,
                        Ok(Err(e)) => {
                            warn!(provider = client.name(), cid = %cid, error = %e, "status check failed");
                            false
                        }
                        Err(_) => {
                            warn!(provider = client.name(), cid = %cid, timeout = ?self.check_timeout, "status check timed out");
                            false
                        }
                    };
                    (client.name().to_string(), pinned)
                }
                .boxed(),
            );
        }

        let per_provider: BTreeMap<String, bool> = join_all(checks).await.into_iter().collect();
        debug!(cid = %cid, ?per_provider, "reconciled");

        PinningStatusSnapshot {
            identifier: cid.clone(),
            per_provider,
            checked_at: now_secs(),
        }
    }
}
