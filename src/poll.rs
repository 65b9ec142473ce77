//! Bounded poll-until-predicate primitive shared by every wait phase.
//!
//! Each asynchronous phase of a lifecycle operation (status convergence,
//! guest-agent readiness, clone visibility) waits through the same helper:
//! probe, and either finish, sleep for the policy interval, or fail once the
//! wall-clock budget is spent. Phases never share a policy because remote
//! convergence latency differs by operation.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::error::DriverError;

/// Interval and wall-clock budget governing one wait phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Sleep between unsuccessful probes.
    pub interval: Duration,
    /// Total wall-clock budget for the phase.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Builds a policy from an interval and a timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Polls `probe` until it yields a value or the policy budget expires.
///
/// The first probe runs before any sleep, so a predicate that is already
/// satisfied completes without waiting. `Ok(None)` means "not yet" and
/// schedules another attempt; any `Err` aborts the phase immediately. Once
/// entered the loop has exactly two exits: a produced value or
/// [`DriverError::Timeout`] naming the phase.
pub(crate) async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    phase: impl Into<String>,
    mut probe: F,
) -> Result<T, DriverError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, DriverError>>,
{
    let phase = phase.into();
    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(DriverError::Timeout {
                phase,
                limit: policy.timeout,
            });
        }
        sleep(policy.interval).await;
    }
}
