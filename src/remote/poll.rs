//! Bounded confirmation polling.
//!
//! A pin request is only an acknowledgement. Confirmation means a later
//! status query returned `Pinned`. Polling runs a fixed number of attempts
//! separated by a fixed delay, so the worst case is bounded:
//! `attempts * (query latency) + (attempts - 1) * delay`.
//!
//! - `Pinned` ends polling with success.
//! - `Failed` ends polling early; the provider has given up.
//! - Network errors are treated like a still-pending answer.
//! - Any other error aborts immediately.

use super::status::ProviderStatus;
use super::traits::{PinError, PinResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default number of status queries.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default spacing between status queries.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// How many times, and how far apart, to ask for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl ConfirmationPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    pub fn max_wait(&self) -> Duration {
        self.delay * self.attempts.saturating_sub(1)
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed { attempts: u32 },
    /// Provider reported `Failed`.
    Rejected { attempts: u32 },
    /// Every attempt ran without a `Pinned` answer.
    Exhausted {
        attempts: u32,
        last_status: Option<ProviderStatus>,
        last_error: Option<PinError>,
    },
    /// Non-retryable error.
    Aborted(PinError),
}

impl PollOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, PollOutcome::Confirmed { .. })
    }
}

/// Poll `check` until it reports `Pinned` or the policy runs out.
///
/// `check` receives the 1-based attempt number.
pub async fn poll_confirmation<F, Fut>(policy: &ConfirmationPolicy, mut check: F) -> PollOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PinResult<Option<ProviderStatus>>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_status = None;
    let mut last_error = None;

    for attempt in 1..=attempts {
        match check(attempt).await {
            Ok(Some(ProviderStatus::Pinned)) => {
                return PollOutcome::Confirmed { attempts: attempt };
            }
            Ok(Some(ProviderStatus::Failed)) => {
                return PollOutcome::Rejected { attempts: attempt };
            }
            Ok(status) => {
                debug!(attempt, ?status, "not yet pinned");
                last_status = status;
            }
            Err(err) if err.is_retryable() => {
                debug!(attempt, error = %err, "status query failed, will retry");
                last_error = Some(err);
            }
            Err(err) => return PollOutcome::Aborted(err),
        }

        if attempt < attempts {
            sleep(policy.delay).await;
        }
    }

    PollOutcome::Exhausted {
        attempts,
        last_status,
        last_error,
    }
}
