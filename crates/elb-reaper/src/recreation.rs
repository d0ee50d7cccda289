//! Recreation verification
//!
//! After teardown the control plane is expected to provision a new load
//! balancer for the service. [`RecreationPoller`] is a three-state machine
//! that only confirms once a new, distinct load balancer is visible *and*
//! the old one is provably gone.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::config::RecreationConfig;
use crate::error::RecreationError;
use crate::resolver::ServiceResolver;
use crate::wait::{PollOutcome, poll_until};
use elb_reaper_common::{LoadBalancerRef, ServiceRef};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Recreation poller state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "load_balancer")]
pub enum RecreationState {
    /// No distinct replacement observed yet
    WaitingNewLb,
    /// A distinct replacement exists and the old load balancer is gone
    Confirmed(LoadBalancerRef),
    /// The deadline passed without confirmation
    TimedOut,
}

impl RecreationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecreationState::WaitingNewLb)
    }
}

/// What one tick saw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// The load balancer currently fronting the service, if any
    pub current: Option<LoadBalancerRef>,
    /// Whether the old load balancer is no longer describable
    pub old_absent: bool,
}

/// The load balancer being replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OldLoadBalancer {
    pub lb: LoadBalancerRef,
    /// Already observed gone, so it is never described again. Anything
    /// found under its name afterwards is a replacement.
    pub gone: bool,
}

impl OldLoadBalancer {
    /// An old load balancer whose absence still has to be observed
    pub fn present(lb: LoadBalancerRef) -> Self {
        Self { lb, gone: false }
    }

    /// An old load balancer that was already observed gone
    pub fn gone(lb: LoadBalancerRef) -> Self {
        Self { lb, gone: true }
    }
}

impl From<LoadBalancerRef> for OldLoadBalancer {
    fn from(lb: LoadBalancerRef) -> Self {
        Self::present(lb)
    }
}

/// Decide the state for one observation.
///
/// Confirms iff a current load balancer exists, it is not the old one and
/// the old one is absent. A reused name counts as distinct when both ARNs
/// are known and differ, or when the old one was gone before its ARN was
/// ever seen.
pub fn evaluate(old: &OldLoadBalancer, observation: &Observation) -> RecreationState {
    let Some(current) = &observation.current else {
        return RecreationState::WaitingNewLb;
    };
    let distinct = current.name != old.lb.name
        || matches!((&old.lb.arn, &current.arn), (Some(a), Some(b)) if a != b)
        || (old.gone && old.lb.arn.is_none());

    if distinct && observation.old_absent {
        RecreationState::Confirmed(current.clone())
    } else {
        RecreationState::WaitingNewLb
    }
}

/// Polls until the service is fronted by a replacement load balancer
pub struct RecreationPoller<'a, P, R> {
    provider: &'a P,
    resolver: &'a R,
    service: ServiceRef,
    old: OldLoadBalancer,
    config: RecreationConfig,
    state: RecreationState,
}

impl<'a, P: LoadBalancerProvider, R: ServiceResolver> RecreationPoller<'a, P, R> {
    pub fn new(
        provider: &'a P,
        resolver: &'a R,
        service: ServiceRef,
        old: impl Into<OldLoadBalancer>,
        config: RecreationConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            service,
            old: old.into(),
            config,
            state: RecreationState::WaitingNewLb,
        }
    }

    pub fn state(&self) -> &RecreationState {
        &self.state
    }

    /// Query the resolver and, if it names a load balancer, check the old
    /// one's absence. Every error folds into "not yet".
    pub async fn observe(&self) -> Observation {
        let name = match self
            .resolver
            .resolve_load_balancer(&self.service.namespace, &self.service.name)
            .await
        {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!(service = %self.service, "Service has no load balancer yet");
                return Observation::default();
            }
            Err(e) => {
                debug!(service = %self.service, error = ?e, "Service lookup failed, will retry");
                return Observation::default();
            }
        };

        let current = match self.provider.describe_load_balancer(&name).await {
            Ok(Some(lb)) => lb,
            Ok(None) => {
                debug!(lb_name = %name, "Resolved load balancer not describable yet");
                return Observation::default();
            }
            Err(e) => {
                debug!(lb_name = %name, error = ?e, "Describe of new load balancer failed, will retry");
                return Observation::default();
            }
        };

        if self.old.gone {
            return Observation {
                current: Some(current),
                old_absent: true,
            };
        }

        let old = &self.old.lb;
        let old_absent = match self.provider.describe_load_balancer(&old.name).await {
            Ok(None) => true,
            Ok(Some(lb)) => !old.is_same_object(&lb),
            Err(e) if classify_anyhow_error(&e).is_not_found() => true,
            Err(e) => {
                debug!(lb_name = %old.name, error = ?e, "Describe of old load balancer failed, will retry");
                false
            }
        };

        Observation {
            current: Some(current),
            old_absent,
        }
    }

    /// Run one observation and update the state; terminal states stick.
    pub async fn tick(&mut self) -> &RecreationState {
        if !self.state.is_terminal() {
            let observation = self.observe().await;
            self.state = evaluate(&self.old, &observation);
        }
        &self.state
    }

    /// Poll until confirmed, timed out or cancelled.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<LoadBalancerRef, RecreationError> {
        if let RecreationState::Confirmed(lb) = &self.state {
            return Ok(lb.clone());
        }

        info!(
            service = %self.service,
            old = %self.old.lb,
            timeout = ?self.config.poll.timeout,
            "Waiting for load balancer recreation"
        );

        let this = &*self;
        let outcome = poll_until(
            &this.config.poll,
            cancel,
            || async move {
                match evaluate(&this.old, &this.observe().await) {
                    RecreationState::Confirmed(lb) => Some(lb),
                    _ => None,
                }
            },
            &this.service.to_string(),
        )
        .await;

        match outcome {
            PollOutcome::Ready(lb) => {
                info!(service = %self.service, old = %self.old.lb, new = %lb, "Load balancer recreated");
                self.state = RecreationState::Confirmed(lb.clone());
                Ok(lb)
            }
            PollOutcome::TimedOut { attempts, elapsed } => {
                warn!(
                    service = %self.service,
                    old = %self.old.lb,
                    attempts,
                    elapsed = ?elapsed,
                    "No replacement load balancer before deadline"
                );
                self.state = RecreationState::TimedOut;
                Err(RecreationError::TimedOut {
                    service: self.service.to_string(),
                    old: self.old.lb.name.clone(),
                    attempts,
                    elapsed,
                })
            }
            PollOutcome::Cancelled { .. } => Err(RecreationError::Cancelled {
                service: self.service.to_string(),
            }),
        }
    }
}
