//! Bounded, cancellable polling on a fixed interval.
//!
//! Provides the loop shared by the deletion waiter and the recreation
//! poller: check, sleep one tick, repeat until the check yields a value, the
//! deadline passes, or the operation is cancelled.

use backon::{BackoffBuilder, ConstantBuilder};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Fixed delay between checks
    pub interval: Duration,
    /// Maximum total time to poll before giving up
    pub timeout: Duration,
    /// Upper bound on a single check
    pub call_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: elb_reaper_common::defaults::default_poll_interval(),
            timeout: Duration::from_secs(
                elb_reaper_common::defaults::DEFAULT_ABSENCE_TIMEOUT_SECS,
            ),
            call_timeout: elb_reaper_common::defaults::default_call_timeout(),
        }
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The check produced a value
    Ready(T),
    /// The deadline passed first
    TimedOut { attempts: u32, elapsed: Duration },
    /// The cancellation token fired first
    Cancelled { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Poll `check` until it returns `Some`, the deadline passes, or `cancel` fires.
///
/// `check` must fold its own errors into `None`; a check that exceeds
/// `config.call_timeout` also counts as `None`. Cancellation interrupts both
/// an in-flight check and the sleep between checks. The final sleep is
/// clamped so the loop never runs past the deadline.
///
/// # Example
/// ```ignore
/// let outcome = poll_until(
///     &PollConfig::default(),
///     &cancel_token,
///     || async { provider.is_gone().await.then_some(()) },
///     "my-load-balancer",
/// ).await;
/// ```
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    mut check: F,
    resource_name: &str,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut attempts = 0u32;

    let mut delays = ConstantBuilder::default()
        .with_delay(config.interval)
        .with_max_times(usize::MAX)
        .build();

    loop {
        if cancel.is_cancelled() {
            debug!(resource = %resource_name, attempts, "Poll cancelled");
            return PollOutcome::Cancelled { attempts };
        }

        attempts += 1;

        let checked = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(resource = %resource_name, attempts, "Poll cancelled during check");
                return PollOutcome::Cancelled { attempts };
            }
            result = tokio::time::timeout(config.call_timeout, check()) => result,
        };

        match checked {
            Ok(Some(value)) => {
                debug!(resource = %resource_name, attempts, "Condition met");
                return PollOutcome::Ready(value);
            }
            Ok(None) => {}
            Err(_) => {
                warn!(
                    resource = %resource_name,
                    attempt = attempts,
                    timeout = ?config.call_timeout,
                    "Check timed out"
                );
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut {
                attempts,
                elapsed: now - start,
            };
        }

        let delay = delays
            .next()
            .unwrap_or(config.interval)
            .min(deadline - now);
        debug!(
            resource = %resource_name,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Condition not met, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                debug!(resource = %resource_name, attempts, "Poll cancelled while waiting");
                return PollOutcome::Cancelled { attempts };
            }
        }
    }
}
