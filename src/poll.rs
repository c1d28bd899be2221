//! Bounded, cancellable polling.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

/// Interval and overall budget for a polling loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay before each check, including the first.
    pub interval: Duration,
    /// Budget measured from the start of the loop.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a policy from an interval and a timeout.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Reasons a polling loop stopped without the operation reporting done.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PollError<E> {
    /// The budget elapsed before the operation reported done.
    #[error("timed out after {}s while polling", timeout.as_secs())]
    Timeout {
        /// Budget that was exceeded.
        timeout: Duration,
    },
    /// The surrounding context was cancelled.
    #[error("polling cancelled")]
    Cancelled,
    /// The operation returned an error.
    #[error(transparent)]
    Operation(E),
}

/// Invokes `op` once per interval until it reports done.
///
/// The loop sleeps for one interval before every check, so the first check
/// happens one interval after the call. Cancellation is observed at the top
/// of each iteration and interrupts the sleep; it wins over the timeout.
///
/// # Errors
///
/// Returns [`PollError::Operation`] as soon as `op` fails,
/// [`PollError::Cancelled`] when `cancel` fires, and
/// [`PollError::Timeout`] when the operation has not reported done within
/// `policy.timeout`.
pub async fn poll_until<F, E>(
    cancel: &CancellationToken,
    policy: PollPolicy,
    mut op: F,
) -> Result<(), PollError<E>>
where
    F: AsyncFnMut() -> Result<bool, E>,
{
    let start = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled),
            () = sleep(policy.interval) => {}
        }

        if op().await.map_err(PollError::Operation)? {
            return Ok(());
        }

        if start.elapsed() > policy.timeout {
            return Err(PollError::Timeout {
                timeout: policy.timeout,
            });
        }
    }
}
