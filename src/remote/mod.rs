//! Remote pinning clients.
//!
//! - `traits`: the per-provider adapter trait and error type
//! - `status`: status and record normalization at the provider boundary
//! - `ledger`: per-provider record of pin attempts
//! - `poll`: bounded confirmation polling
//! - `client`: the shared contract every provider is driven through
//! - `cloud`, `companion`: concrete adapters
//! - `mock`: scriptable provider for tests

pub mod client;
pub mod cloud;
pub mod companion;
pub mod ledger;
pub mod mock;
pub mod poll;
pub mod status;
pub mod traits;

pub use client::{BulkUnpinReport, RemotePinClient, MAX_PAGES, PAGE_SIZE};
pub use cloud::{CloudPinningService, CloudServiceConfig};
pub use companion::{CompanionConfig, CompanionNode, DEFAULT_COMPANION_ADDRESS};
pub use ledger::{ledger_namespace, PinLedger, PinRecord, PinState, LEDGER_STORE};
pub use mock::MockPinningProvider;
pub use poll::{ConfirmationPolicy, PollOutcome};
pub use status::{ListPage, ProviderStatus, RemotePin};
pub use traits::{PinError, PinResult, PinningProvider, Submission, SubmissionMode};
