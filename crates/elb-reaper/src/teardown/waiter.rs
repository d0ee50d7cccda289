//! Waiting for the old load balancer to disappear
//!
//! The wait is an optimization, not a correctness gate: the recreation
//! check re-verifies absence on its own, so running out of time here is
//! only a warning.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::wait::{PollConfig, PollOutcome, poll_until};
use elb_reaper_common::LoadBalancerRef;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How the deletion wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    /// The load balancer is no longer describable (or was replaced)
    Absent,
    /// Still describable when the deadline passed
    DeadlineExceeded { attempts: u32, elapsed: Duration },
    /// The wait was cancelled
    Cancelled,
}

/// Blocks until a load balancer is confirmed absent or a deadline elapses
pub struct DeletionWaiter<'a, P> {
    provider: &'a P,
    config: PollConfig,
}

impl<'a, P: LoadBalancerProvider> DeletionWaiter<'a, P> {
    pub fn new(provider: &'a P, config: PollConfig) -> Self {
        Self { provider, config }
    }

    /// Poll until `lb` is gone.
    ///
    /// The name resolving to a different ARN counts as gone. Describe errors
    /// count as "not yet" and are retried on the next tick.
    pub async fn wait(&self, lb: &LoadBalancerRef, cancel: &CancellationToken) -> WaitResult {
        info!(
            lb_name = %lb.name,
            timeout = ?self.config.timeout,
            "Waiting for load balancer deletion to complete"
        );

        let outcome = poll_until(
            &self.config,
            cancel,
            || async move { self.is_absent(lb).await.then_some(()) },
            &lb.name,
        )
        .await;

        match outcome {
            PollOutcome::Ready(()) => {
                info!(lb_name = %lb.name, "Load balancer confirmed absent");
                WaitResult::Absent
            }
            PollOutcome::TimedOut { attempts, elapsed } => {
                warn!(
                    lb_name = %lb.name,
                    attempts,
                    elapsed = ?elapsed,
                    "Load balancer still present after deadline"
                );
                WaitResult::DeadlineExceeded { attempts, elapsed }
            }
            PollOutcome::Cancelled { .. } => WaitResult::Cancelled,
        }
    }

    async fn is_absent(&self, lb: &LoadBalancerRef) -> bool {
        match self.provider.describe_load_balancer(&lb.name).await {
            Ok(None) => true,
            Ok(Some(current)) => !lb.is_same_object(&current),
            Err(e) if classify_anyhow_error(&e).is_not_found() => true,
            Err(e) => {
                debug!(lb_name = %lb.name, error = ?e, "Describe failed, will retry");
                false
            }
        }
    }
}
