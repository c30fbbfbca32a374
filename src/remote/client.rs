//! Shared remote pinning contract.
//!
//! [`RemotePinClient`] wraps one [`PinningProvider`] and supplies the
//! behaviour every provider must share:
//!
//! - `request_pin` only acknowledges; `confirm_pin` polls for `Pinned`
//! - listings follow pagination and merge pending-like filtered views,
//!   deduplicated by identifier
//! - `unpin` treats an absent pin as success
//! - `unpin_by_status` re-checks live status before each deletion and
//!   never deletes a pin the provider reports as `Pinned`
//!
//! Every attempt is tracked in the client's [`PinLedger`].

use super::ledger::{PinLedger, PinRecord, PinState};
use super::poll::{poll_confirmation, ConfirmationPolicy, PollOutcome};
use super::status::ProviderStatus;
use super::traits::{PinError, PinResult, PinningProvider, Submission, SubmissionMode};
use crate::cid::ContentId;
use crate::index::IndexCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records requested per listing page.
pub const PAGE_SIZE: usize = 100;

/// Listing stops after this many pages even if the provider keeps going.
pub const MAX_PAGES: usize = 50;

/// Outcome of a bulk cleanup on one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUnpinReport {
    pub provider: String,
    pub removed_count: usize,
    /// Candidates left alone after the live re-check.
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Remote pinning client for one provider.
pub struct RemotePinClient {
    provider: Arc<dyn PinningProvider>,
    ledger: PinLedger,
    policy: ConfirmationPolicy,
}

impl RemotePinClient {
    /// Client with an in-memory ledger.
    pub fn new(provider: Arc<dyn PinningProvider>, policy: ConfirmationPolicy) -> Self {
        let ledger = PinLedger::new(provider.name());
        Self {
            provider,
            ledger,
            policy,
        }
    }

    /// Client whose ledger is mirrored into `index`.
    pub async fn persistent(
        provider: Arc<dyn PinningProvider>,
        policy: ConfirmationPolicy,
        index: Arc<dyn IndexCatalog>,
    ) -> Self {
        let ledger = PinLedger::persistent(provider.name(), index).await;
        Self {
            provider,
            ledger,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub fn resolves_by_reference(&self) -> bool {
        self.provider.resolves_by_reference()
    }

    /// Ask the provider to pin `cid`. Success is an acknowledgement only.
    ///
    /// Providers that cannot resolve by reference get `data` uploaded, and
    /// the identifier they return must equal `cid`.
    pub async fn request_pin(&self, cid: &ContentId, data: Option<&[u8]>) -> PinResult<Submission> {
        if let Some(record) = self.ledger.get(cid).await {
            if record.state == PinState::Confirmed {
                if let Ok(Some(ProviderStatus::Pinned)) = self.provider.status(cid).await {
                    debug!(provider = self.name(), cid = %cid, "already pinned");
                    return Ok(self.submission(cid, SubmissionMode::AlreadyPinned));
                }
            }
        }

        self.ledger.begin_attempt(cid).await;
        match self.send(cid, data).await {
            Ok(mode) => {
                self.ledger.mark_pending(cid, None).await;
                info!(provider = self.name(), cid = %cid, ?mode, "pin request acknowledged");
                Ok(self.submission(cid, mode))
            }
            Err(e) => {
                warn!(provider = self.name(), cid = %cid, error = %e, "pin request failed");
                self.ledger.mark_failed(cid, None, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn send(&self, cid: &ContentId, data: Option<&[u8]>) -> PinResult<SubmissionMode> {
        if self.provider.resolves_by_reference() {
            self.provider.submit(cid).await?;
            return Ok(SubmissionMode::ByReference);
        }

        let data = data.ok_or_else(|| PinError::MissingContent(cid.clone()))?;
        let returned = self.provider.upload(data).await?;
        if returned.trim() != cid.as_str() {
            return Err(PinError::HashMismatch {
                requested: cid.clone(),
                returned,
            });
        }
        Ok(SubmissionMode::Uploaded)
    }

    fn submission(&self, cid: &ContentId, mode: SubmissionMode) -> Submission {
        Submission {
            provider: self.name().to_string(),
            identifier: cid.clone(),
            mode,
        }
    }

    /// Poll until the provider reports `cid` as pinned. Bounded by the
    /// client's [`ConfirmationPolicy`].
    pub async fn confirm(&self, cid: &ContentId) -> PollOutcome {
        let outcome = poll_confirmation(&self.policy, |attempt| {
            debug!(provider = self.name(), cid = %cid, attempt, "querying pin status");
            self.provider.status(cid)
        })
        .await;

        match &outcome {
            PollOutcome::Confirmed { attempts } => {
                self.ledger.mark_confirmed(cid).await;
                info!(provider = self.name(), cid = %cid, attempts, "pin confirmed");
            }
            PollOutcome::Rejected { attempts } => {
                self.ledger
                    .mark_failed(cid, Some(ProviderStatus::Failed), "provider reported failure")
                    .await;
                warn!(provider = self.name(), cid = %cid, attempts, "provider failed the pin");
            }
            PollOutcome::Exhausted {
                attempts,
                last_status,
                last_error,
            } => {
                let note = match last_error {
                    Some(e) => format!("not confirmed after {} attempts: {}", attempts, e),
                    None => format!("not confirmed after {} attempts", attempts),
                };
                self.ledger.note(cid, *last_status, note).await;
                warn!(provider = self.name(), cid = %cid, attempts, ?last_status, "pin not confirmed in time");
            }
            PollOutcome::Aborted(e) => {
                self.ledger.mark_failed(cid, None, e.to_string()).await;
                warn!(provider = self.name(), cid = %cid, error = %e, "confirmation aborted");
            }
        }
        outcome
    }

    /// `true` only if a status query returned `Pinned` within the policy.
    pub async fn confirm_pin(&self, cid: &ContentId) -> bool {
        self.confirm(cid).await.is_confirmed()
    }

    /// Single status query. Used by the reconciler.
    pub async fn check_pinned(&self, cid: &ContentId) -> PinResult<bool> {
        let status = self.provider.status(cid).await?;
        let pinned = status == Some(ProviderStatus::Pinned);
        let updated = match status {
            Some(ProviderStatus::Pinned) => self.ledger.mark_verified(cid).await,
            Some(other) => self.ledger.note(cid, Some(other), "not pinned on last check").await,
            None => self.ledger.note(cid, None, "provider has no record").await,
        };
        if let Some(record) = updated {
            debug!(provider = self.name(), cid = %cid, state = %record.state, "ledger updated from status check");
        }
        Ok(pinned)
    }

    /// Every pin the provider reports.
    ///
    /// With no filter, the unfiltered listing is merged with a listing per
    /// pending-like filter, since some providers omit in-flight records from
    /// unfiltered queries. Results are deduplicated by identifier; the first
    /// occurrence wins.
    pub async fn list_pins(&self, filter: Option<ProviderStatus>) -> PinResult<Vec<PinRecord>> {
        if filter.is_some() {
            return self.list_all(filter).await;
        }

        let mut records = self.list_all(None).await?;
        for pending in self.provider.pending_filters() {
            match self.list_all(Some(pending)).await {
                Ok(extra) => records.extend(extra),
                Err(e) => {
                    warn!(provider = self.name(), filter = %pending, error = %e, "filtered listing failed");
                }
            }
        }

        let mut seen = BTreeSet::new();
        records.retain(|record| seen.insert(record.identifier.clone()));
        Ok(records)
    }

    async fn list_all(&self, filter: Option<ProviderStatus>) -> PinResult<Vec<PinRecord>> {
        let mut records = Vec::new();
        let mut offset = 0;

        for page_number in 0..MAX_PAGES {
            let page = self.provider.list_page(filter, offset, PAGE_SIZE).await?;
            let count = page.pins.len();
            debug!(provider = self.name(), ?filter, page = page_number, count, "listing page");

            records.extend(
                page.pins
                    .into_iter()
                    .map(|pin| PinRecord::from_remote(self.name(), pin)),
            );
            offset += count;

            let reached_total = page.total.is_some_and(|total| offset as u64 >= total);
            if count < PAGE_SIZE || reached_total {
                return Ok(records);
            }
        }

        warn!(provider = self.name(), ?filter, pages = MAX_PAGES, "listing truncated");
        Ok(records)
    }

    /// Remove a pin. An absent pin counts as removed.
    pub async fn unpin(&self, cid: &ContentId) -> PinResult<()> {
        match self.provider.remove(cid).await {
            Ok(()) => {}
            Err(PinError::NotFound(_)) => {
                debug!(provider = self.name(), cid = %cid, "pin already absent");
            }
            Err(e) => {
                warn!(provider = self.name(), cid = %cid, error = %e, "unpin failed");
                self.ledger.note(cid, None, e.to_string()).await;
                return Err(e);
            }
        }
        self.ledger.remove(cid).await;
        info!(provider = self.name(), cid = %cid, "unpinned");
        Ok(())
    }

    /// Remove every pin whose status satisfies `predicate`.
    ///
    /// Candidates come from the listing, which may be stale, so each one is
    /// re-queried first. A candidate whose live status is `Pinned` is never
    /// removed, whatever the predicate says.
    pub async fn unpin_by_status<P>(&self, predicate: P) -> BulkUnpinReport
    where
        P: Fn(ProviderStatus) -> bool + Send + Sync,
    {
        let mut report = BulkUnpinReport {
            provider: self.name().to_string(),
            ..Default::default()
        };

        let candidates = match self.list_pins(None).await {
            Ok(records) => records,
            Err(e) => {
                report.errors.push(format!("listing failed: {}", e));
                return report;
            }
        };

        for record in candidates {
            let listed = record.provider_status.unwrap_or(ProviderStatus::Unknown);
            if !predicate(listed) {
                continue;
            }
            let cid = record.identifier;

            let live = match self.provider.status(&cid).await {
                Ok(Some(status)) => status,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    report.errors.push(format!("{}: status check failed: {}", cid, e));
                    continue;
                }
            };

            if live == ProviderStatus::Pinned {
                info!(provider = self.name(), cid = %cid, listed = %listed, "keeping pin confirmed on re-check");
                report.skipped += 1;
                continue;
            }
            if !predicate(live) {
                report.skipped += 1;
                continue;
            }

            match self.unpin(&cid).await {
                Ok(()) => report.removed_count += 1,
                Err(e) => report.errors.push(format!("{}: {}", cid, e)),
            }
        }

        info!(
            provider = self.name(),
            removed = report.removed_count,
            skipped = report.skipped,
            errors = report.errors.len(),
            "bulk unpin finished"
        );
        report
    }

    /// Ledger record for `cid`, if this client ever touched it.
    pub async fn record(&self, cid: &ContentId) -> Option<PinRecord> {
        self.ledger.get(cid).await
    }

    pub async fn records(&self) -> Vec<PinRecord> {
        self.ledger.all().await
    }
}
