//! Per-provider pin ledger.
//!
//! Tracks every pin attempt a client made and what the provider last said
//! about it. State machine per identifier:
//!
//! ```text
//! Unknown -> Requested -> Pending -> Confirmed
//!                  \          \----> Failed
//!                   \--------------> Failed
//! Confirmed | Failed -> Requested    (a new attempt)
//! any existing record -> Confirmed   (verified by a status query)
//! ```
//!
//! `Confirmed` is only entered through [`PinLedger::mark_confirmed`] or
//! [`PinLedger::mark_verified`], which callers invoke after a provider
//! status query returned `Pinned`.
//!
//! Records are only created by a pin attempt. Each change is applied and
//! mirrored under the same lock, so the mirror never lags or reorders.
//!
//! A ledger may be mirrored into the persistent index under namespace
//! `pin-ledger-<provider>`, store `records`. Mirror failures are logged and
//! never fail the pin operation.

use super::status::{ProviderStatus, RemotePin};
use crate::cid::ContentId;
use crate::index::IndexCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Sub-store holding ledger records inside the ledger namespace.
pub const LEDGER_STORE: &str = "records";

/// Namespace a provider's ledger is persisted under.
pub fn ledger_namespace(provider: &str) -> String {
    format!("pin-ledger-{}", provider)
}

/// Seconds since the Unix epoch.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Our view of a pin attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinState {
    Unknown,
    Requested,
    Pending,
    Confirmed,
    Failed,
}

impl PinState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PinState::Confirmed | PinState::Failed)
    }

    /// Whether the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: PinState) -> bool {
        use PinState::*;
        matches!(
            (self, next),
            (Unknown, Requested)
                | (Requested, Pending)
                | (Requested, Failed)
                | (Pending, Pending)
                | (Pending, Confirmed)
                | (Pending, Failed)
                | (Confirmed, Requested)
                | (Failed, Requested)
                // A verification query may confirm content pinned out of band.
                | (Unknown, Confirmed)
                | (Confirmed, Confirmed)
        )
    }

    /// Our state implied by a status read straight from the provider.
    pub fn from_provider(status: ProviderStatus) -> Self {
        match status {
            ProviderStatus::Pinned => PinState::Confirmed,
            ProviderStatus::Pending | ProviderStatus::Searching => PinState::Pending,
            ProviderStatus::Failed => PinState::Failed,
            ProviderStatus::Unknown => PinState::Unknown,
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinState::Unknown => "unknown",
            PinState::Requested => "requested",
            PinState::Pending => "pending",
            PinState::Confirmed => "confirmed",
            PinState::Failed => "failed",
        })
    }
}

/// One identifier on one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub provider: String,
    pub identifier: ContentId,
    pub state: PinState,
    /// Raw status from the most recent provider answer.
    pub provider_status: Option<ProviderStatus>,
    /// Unix seconds of the most recent provider interaction.
    pub last_checked_at: u64,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl PinRecord {
    pub fn new(provider: impl Into<String>, identifier: ContentId) -> Self {
        Self {
            provider: provider.into(),
            identifier,
            state: PinState::Unknown,
            provider_status: None,
            last_checked_at: now_secs(),
            error: None,
            name: None,
            size: None,
        }
    }

    /// Record built from a provider listing entry.
    pub fn from_remote(provider: &str, pin: RemotePin) -> Self {
        Self {
            provider: provider.to_string(),
            state: PinState::from_provider(pin.status),
            provider_status: Some(pin.status),
            last_checked_at: now_secs(),
            error: None,
            name: pin.name,
            size: pin.size,
            identifier: pin.cid,
        }
    }
}

/// Records for one provider, keyed by identifier.
pub struct PinLedger {
    provider: String,
    records: Mutex<BTreeMap<ContentId, PinRecord>>,
    index: Option<Arc<dyn IndexCatalog>>,
}

impl PinLedger {
    /// In-memory ledger.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            records: Mutex::new(BTreeMap::new()),
            index: None,
        }
    }

    /// Ledger mirrored into `index`. Existing records are loaded; entries
    /// that fail to decode are skipped with a warning.
    pub async fn persistent(provider: impl Into<String>, index: Arc<dyn IndexCatalog>) -> Self {
        let provider = provider.into();
        let namespace = ledger_namespace(&provider);
        let mut records = BTreeMap::new();

        match index.open_namespace(&namespace).await {
            Ok(Some(snapshot)) => {
                let entries = snapshot
                    .stores
                    .into_iter()
                    .filter(|store| store.name == LEDGER_STORE)
                    .flat_map(|store| store.entries);
                for entry in entries {
                    match serde_json::from_value::<PinRecord>(entry.value) {
                        Ok(record) => {
                            records.insert(record.identifier.clone(), record);
                        }
                        Err(e) => {
                            warn!(namespace = %namespace, key = %entry.key, error = %e, "skipping undecodable ledger record");
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(namespace = %namespace, error = %e, "failed to load pin ledger"),
        }

        debug!(provider = %provider, records = records.len(), "pin ledger loaded");
        Self {
            provider,
            records: Mutex::new(records),
            index: Some(index),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub async fn get(&self, cid: &ContentId) -> Option<PinRecord> {
        self.records.lock().await.get(cid).cloned()
    }

    pub async fn all(&self) -> Vec<PinRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    /// Start a new attempt: the record moves to `Requested` and its error
    /// is cleared.
    pub async fn begin_attempt(&self, cid: &ContentId) -> PinRecord {
        self.update(cid, |record| {
            record.state = PinState::Requested;
            record.error = None;
        })
        .await
    }

    /// Provider acknowledged the request.
    pub async fn mark_pending(&self, cid: &ContentId, status: Option<ProviderStatus>) {
        self.transition(cid, PinState::Pending, status, None).await;
    }

    /// Provider status query returned `Pinned`.
    pub async fn mark_confirmed(&self, cid: &ContentId) {
        self.transition(cid, PinState::Confirmed, Some(ProviderStatus::Pinned), None)
            .await;
    }

    pub async fn mark_failed(
        &self,
        cid: &ContentId,
        status: Option<ProviderStatus>,
        error: impl Into<String>,
    ) {
        self.transition(cid, PinState::Failed, status, Some(error.into()))
            .await;
    }

    /// A one-off status query returned `Pinned`. Unlike
    /// [`mark_confirmed`](Self::mark_confirmed) this overrides any earlier
    /// state, since the provider has just verified the pin. Identifiers
    /// without a record are left alone.
    pub async fn mark_verified(&self, cid: &ContentId) -> Option<PinRecord> {
        self.amend(cid, |record| {
            record.state = PinState::Confirmed;
            record.provider_status = Some(ProviderStatus::Pinned);
            record.error = None;
        })
        .await
    }

    /// Attach an error note to an existing record without changing state.
    pub async fn note(
        &self,
        cid: &ContentId,
        status: Option<ProviderStatus>,
        error: impl Into<String>,
    ) -> Option<PinRecord> {
        let error = error.into();
        self.amend(cid, |record| {
            if status.is_some() {
                record.provider_status = status;
            }
            record.error = Some(error);
        })
        .await
    }

    /// Drop a record after a successful unpin.
    pub async fn remove(&self, cid: &ContentId) -> bool {
        let mut records = self.records.lock().await;
        let removed = records.remove(cid).is_some();
        if let Some(index) = &self.index {
            let namespace = ledger_namespace(&self.provider);
            if let Err(e) = index.remove_entry(&namespace, LEDGER_STORE, cid.as_str()).await {
                warn!(namespace = %namespace, cid = %cid, error = %e, "failed to remove ledger record");
            }
        }
        removed
    }

    async fn transition(
        &self,
        cid: &ContentId,
        next: PinState,
        status: Option<ProviderStatus>,
        error: Option<String>,
    ) {
        self.update(cid, |record| {
            if !record.state.can_transition_to(next) {
                debug!(cid = %cid, from = %record.state, to = %next, "ignoring invalid transition");
                return;
            }
            record.state = next;
            if status.is_some() {
                record.provider_status = status;
            }
            record.error = error;
        })
        .await;
    }

    async fn update<F>(&self, cid: &ContentId, apply: F) -> PinRecord
    where
        F: FnOnce(&mut PinRecord),
    {
        let mut records = self.records.lock().await;
        let record = records
            .entry(cid.clone())
            .or_insert_with(|| PinRecord::new(self.provider.clone(), cid.clone()));
        apply(record);
        record.last_checked_at = now_secs();
        let record = record.clone();
        self.persist(&record).await;
        record
    }

    async fn amend<F>(&self, cid: &ContentId, apply: F) -> Option<PinRecord>
    where
        F: FnOnce(&mut PinRecord),
    {
        let mut records = self.records.lock().await;
        let record = records.get_mut(cid)?;
        apply(record);
        record.last_checked_at = now_secs();
        let record = record.clone();
        self.persist(&record).await;
        Some(record)
    }

    async fn persist(&self, record: &PinRecord) {
        let Some(index) = &self.index else {
            return;
        };
        let namespace = ledger_namespace(&self.provider);
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                warn!(cid = %record.identifier, error = %e, "failed to encode ledger record");
                return;
            }
        };
        if let Err(e) = index
            .put_entry(&namespace, LEDGER_STORE, record.identifier.as_str(), value)
            .await
        {
            warn!(namespace = %namespace, cid = %record.identifier, error = %e, "failed to persist ledger record");
        }
    }
}
