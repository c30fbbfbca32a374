//! Scriptable in-memory pinning provider for testing.
//!
//! Simulates the provider behaviours the shared client has to cope with:
//! delayed confirmation, outright failure, unreachable endpoints, uploads
//! returning a different identifier, and eventually consistent listings
//! where the unfiltered view is stale or incomplete.

use super::status::{ListPage, ProviderStatus, RemotePin};
use super::traits::{PinError, PinResult, PinningProvider};
use crate::cid::ContentId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Mock pinning provider.
#[derive(Clone)]
pub struct MockPinningProvider {
    name: String,
    by_reference: bool,
    pending_filters: Vec<ProviderStatus>,
    state: Arc<Mutex<MockState>>,
}

struct MockPin {
    status: ProviderStatus,
    /// Status shown in listings when it differs from `status`.
    listed_as: Option<ProviderStatus>,
    hidden_unfiltered: bool,
    polls_remaining: u32,
}

impl MockPin {
    fn listed_status(&self) -> ProviderStatus {
        self.listed_as.unwrap_or(self.status)
    }
}

struct MockState {
    pins: BTreeMap<ContentId, MockPin>,
    unreachable: bool,
    confirm_after: u32,
    final_status: ProviderStatus,
    upload_identifier: Option<String>,
    submit_calls: u32,
    upload_calls: u32,
    status_calls: u32,
    remove_calls: u32,
}

impl MockPinningProvider {
    /// Provider that resolves by reference and confirms on the first
    /// status query.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            by_reference: true,
            pending_filters: Vec::new(),
            state: Arc::new(Mutex::new(MockState {
                pins: BTreeMap::new(),
                unreachable: false,
                confirm_after: 1,
                final_status: ProviderStatus::Pinned,
                upload_identifier: None,
                submit_calls: 0,
                upload_calls: 0,
                status_calls: 0,
                remove_calls: 0,
            })),
        }
    }

    /// Provider that only accepts uploaded bytes.
    pub fn uploads_only(mut self) -> Self {
        self.by_reference = false;
        self
    }

    pub fn with_pending_filters(mut self, filters: Vec<ProviderStatus>) -> Self {
        self.pending_filters = filters;
        self
    }

    /// Every call fails with a network error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Number of status queries before a new submission reaches its final
    /// status. Zero means immediately.
    pub fn set_confirm_after(&self, polls: u32) {
        self.state.lock().unwrap().confirm_after = polls;
    }

    /// Status new submissions end up in.
    pub fn set_final_status(&self, status: ProviderStatus) {
        self.state.lock().unwrap().final_status = status;
    }

    /// Identifier returned by `upload` instead of the real one.
    pub fn set_upload_identifier(&self, identifier: impl Into<String>) {
        self.state.lock().unwrap().upload_identifier = Some(identifier.into());
    }

    /// Seed a pin with a fixed status.
    pub fn insert_pin(&self, cid: ContentId, status: ProviderStatus) {
        self.state.lock().unwrap().pins.insert(
            cid,
            MockPin {
                status,
                listed_as: None,
                hidden_unfiltered: false,
                polls_remaining: 0,
            },
        );
    }

    /// Make listings report `status` for `cid` while direct queries keep
    /// reporting the real one.
    pub fn set_listed_status(&self, cid: &ContentId, status: ProviderStatus) {
        if let Some(pin) = self.state.lock().unwrap().pins.get_mut(cid) {
            pin.listed_as = Some(status);
        }
    }

    /// Leave `cid` out of unfiltered listings.
    pub fn hide_from_unfiltered(&self, cid: &ContentId) {
        if let Some(pin) = self.state.lock().unwrap().pins.get_mut(cid) {
            pin.hidden_unfiltered = true;
        }
    }

    pub fn has_pin(&self, cid: &ContentId) -> bool {
        self.state.lock().unwrap().pins.contains_key(cid)
    }

    pub fn submit_calls(&self) -> u32 {
        self.state.lock().unwrap().submit_calls
    }

    pub fn upload_calls(&self) -> u32 {
        self.state.lock().unwrap().upload_calls
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }

    pub fn remove_calls(&self) -> u32 {
        self.state.lock().unwrap().remove_calls
    }

    fn check_reachable(&self, state: &MockState) -> PinResult<()> {
        if state.unreachable {
            return Err(PinError::Network(format!("{} unreachable", self.name)));
        }
        Ok(())
    }

    fn accept(state: &mut MockState, cid: ContentId) {
        let confirm_after = state.confirm_after;
        let final_status = state.final_status;
        state.pins.entry(cid).or_insert_with(|| MockPin {
            status: if confirm_after == 0 {
                final_status
            } else {
                ProviderStatus::Pending
            },
            listed_as: None,
            hidden_unfiltered: false,
            polls_remaining: confirm_after,
        });
    }
}

#[async_trait]
impl PinningProvider for MockPinningProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolves_by_reference(&self) -> bool {
        self.by_reference
    }

    fn pending_filters(&self) -> Vec<ProviderStatus> {
        self.pending_filters.clone()
    }

    async fn submit(&self, cid: &ContentId) -> PinResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check_reachable(&state)?;
        state.submit_calls += 1;
        Self::accept(&mut state, cid.clone());
        Ok(())
    }

    async fn upload(&self, data: &[u8]) -> PinResult<String> {
        let mut state = self.state.lock().unwrap();
        self.check_reachable(&state)?;
        state.upload_calls += 1;

        let identifier = state
            .upload_identifier
            .clone()
            .unwrap_or_else(|| ContentId::for_bytes(data).to_string());
        if let Ok(cid) = ContentId::parse(&identifier) {
            Self::accept(&mut state, cid);
        }
        Ok(identifier)
    }

    async fn status(&self, cid: &ContentId) -> PinResult<Option<ProviderStatus>> {
        let mut state = self.state.lock().unwrap();
        self.check_reachable(&state)?;
        state.status_calls += 1;

        let final_status = state.final_status;
        Ok(state.pins.get_mut(cid).map(|pin| {
            if pin.polls_remaining > 0 {
                pin.polls_remaining -= 1;
                if pin.polls_remaining == 0 {
                    pin.status = final_status;
                }
            }
            pin.status
        }))
    }

    async fn list_page(
        &self,
        filter: Option<ProviderStatus>,
        offset: usize,
        limit: usize,
    ) -> PinResult<ListPage> {
        let state = self.state.lock().unwrap();
        self.check_reachable(&state)?;

        let matching: Vec<RemotePin> = state
            .pins
            .iter()
            .filter(|(_, pin)| match filter {
                None => !pin.hidden_unfiltered,
                Some(wanted) => pin.listed_status() == wanted,
            })
            .map(|(cid, pin)| RemotePin {
                cid: cid.clone(),
                status: pin.listed_status(),
                name: None,
                size: None,
            })
            .collect();

        Ok(ListPage {
            total: Some(matching.len() as u64),
            pins: matching.into_iter().skip(offset).take(limit).collect(),
        })
    }

    async fn remove(&self, cid: &ContentId) -> PinResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check_reachable(&state)?;
        state.remove_calls += 1;
        state
            .pins
            .remove(cid)
            .map(|_| ())
            .ok_or_else(|| PinError::NotFound(cid.clone()))
    }
}
