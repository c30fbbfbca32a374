//! Trait abstraction for remote pinning providers.
//!
//! Each provider speaks its own protocol. Adapters implement
//! [`PinningProvider`] with raw, per-request semantics; the shared contract
//! (confirmation polling, listing merge, bulk cleanup, ledger bookkeeping)
//! lives once in [`RemotePinClient`](super::RemotePinClient).

use super::status::{ListPage, ProviderStatus};
use crate::cid::ContentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for remote pinning operations.
pub type PinResult<T> = Result<T, PinError>;

/// Remote pinning errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PinError {
    /// Missing or rejected credentials, bad endpoint. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider unreachable, timed out, or failing server-side.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider stored the bytes under a different identifier.
    #[error("Hash mismatch: requested {requested}, provider returned {returned}")]
    HashMismatch {
        requested: ContentId,
        returned: String,
    },

    #[error("Not found on provider: {0}")]
    NotFound(ContentId),

    /// Provider rejected the request.
    #[error("Provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    /// Response body could not be understood.
    #[error("Malformed provider response: {0}")]
    Decode(String),

    /// Provider needs the bytes and none were supplied.
    #[error("Provider cannot resolve {0} by reference and no content was supplied")]
    MissingContent(ContentId),
}

impl PinError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PinError::Network(_))
    }
}

/// How a pin request reached the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionMode {
    /// Provider fetches the content itself by identifier.
    ByReference,
    /// Bytes were uploaded and the returned identifier matched.
    Uploaded,
    /// Provider already reported the content as pinned; nothing was sent.
    AlreadyPinned,
}

/// Acknowledgement of a pin request. Not a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub provider: String,
    pub identifier: ContentId,
    pub mode: SubmissionMode,
}

/// One remote pinning provider.
///
/// Implementations report raw outcomes: `remove` of an absent pin is
/// `Err(NotFound)`, and `status` of an unknown identifier is `Ok(None)`.
#[async_trait]
pub trait PinningProvider: Send + Sync {
    /// Stable name used in results, snapshots and ledger namespaces.
    fn name(&self) -> &str;

    /// Whether the provider can fetch content by identifier alone.
    fn resolves_by_reference(&self) -> bool {
        true
    }

    /// Status filters that must be queried separately because the
    /// unfiltered listing may omit records in those states.
    fn pending_filters(&self) -> Vec<ProviderStatus> {
        Vec::new()
    }

    /// Ask the provider to pin by identifier. Duplicate requests succeed.
    async fn submit(&self, cid: &ContentId) -> PinResult<()>;

    /// Upload bytes; returns the identifier the provider stored them under.
    async fn upload(&self, data: &[u8]) -> PinResult<String>;

    /// Current status of one identifier, `None` when the provider has no record.
    async fn status(&self, cid: &ContentId) -> PinResult<Option<ProviderStatus>>;

    /// One page of the listing, optionally filtered by status.
    async fn list_page(
        &self,
        filter: Option<ProviderStatus>,
        offset: usize,
        limit: usize,
    ) -> PinResult<ListPage>;

    /// Delete a pin.
    async fn remove(&self, cid: &ContentId) -> PinResult<()>;
}
