//! Stage sequencing and fatal-vs-tolerable policy
//!
//! Stages run strictly in order against one load balancer:
//! listeners, target groups, (optionally) the load balancer itself,
//! security groups, then the absence wait. Only a listener failure aborts
//! the run; everything else is folded into the outcome as a warning.
//!
//! If the load balancer is already gone when the listener stage looks it
//! up, no ARN is ever pinned. Every later describe by name could return a
//! replacement, so the stages keyed on the load balancer are skipped and
//! absence counts as confirmed.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::config::TeardownConfig;
use crate::error::TeardownError;
use crate::teardown::listeners::ListenerReaper;
use crate::teardown::outcome::{AbsenceStatus, CleanupResult, TeardownOutcome};
use crate::teardown::security_groups::SecurityGroupReaper;
use crate::teardown::target_groups::TargetGroupReaper;
use crate::teardown::waiter::{DeletionWaiter, WaitResult};
use elb_reaper_common::{LoadBalancerRef, SecurityGroupRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the teardown stages against one load balancer
pub struct TeardownOrchestrator<'a, P> {
    provider: &'a P,
    config: TeardownConfig,
}

impl<'a, P: LoadBalancerProvider> TeardownOrchestrator<'a, P> {
    pub fn new(provider: &'a P, config: TeardownConfig) -> Self {
        Self { provider, config }
    }

    /// Tear down `lb_name` and delete the supplied orphaned security groups.
    ///
    /// Never returns early with an error: the outcome carries the fatal
    /// error, the warnings and whether the run was cancelled. Use
    /// [`TeardownOutcome::into_result`] to turn it into a `Result`.
    pub async fn run(
        &self,
        lb_name: &str,
        orphans: &[SecurityGroupRef],
        cancel: &CancellationToken,
    ) -> TeardownOutcome {
        let mut outcome = TeardownOutcome::new(LoadBalancerRef::named(lb_name));
        info!(
            lb_name = %lb_name,
            orphan_security_groups = orphans.len(),
            delete_load_balancer = self.config.delete_load_balancer,
            "Starting teardown"
        );

        // Listeners
        if self.stop_if_cancelled(&mut outcome, cancel) {
            return outcome;
        }
        let listeners = ListenerReaper::new(self.provider).reap(lb_name).await;
        outcome.listeners = listeners.counts;
        if let Some(message) = listeners.error {
            let err = TeardownError::ListenerCleanup {
                load_balancer: lb_name.to_string(),
                deleted: outcome.listeners.deleted,
                failed: outcome.listeners.failed,
                message,
            };
            error!(lb_name = %lb_name, error = %err, "Aborting teardown");
            outcome.fatal = Some(err);
            return outcome;
        }
        match listeners.load_balancer {
            Some(lb) => outcome.load_balancer = lb,
            None => {
                info!(lb_name = %lb_name, "Load balancer absent at start, skipping target groups and wait");
                outcome.absent_at_start = true;
            }
        }

        // Target groups
        if self.stop_if_cancelled(&mut outcome, cancel) {
            return outcome;
        }
        if !outcome.absent_at_start {
            self.reap_target_groups(&mut outcome).await;
        }

        // Load balancer
        if self.config.delete_load_balancer && !outcome.absent_at_start {
            if self.stop_if_cancelled(&mut outcome, cancel) {
                return outcome;
            }
            self.delete_load_balancer(&mut outcome).await;
        }

        // Security groups
        if self.stop_if_cancelled(&mut outcome, cancel) {
            return outcome;
        }
        let security_groups = SecurityGroupReaper::new(self.provider).reap(orphans).await;
        outcome.security_groups = security_groups.counts;
        for id in &security_groups.failed {
            outcome.warn(format!("failed to delete security group {id}"));
        }
        outcome.failed_security_groups = security_groups.failed;

        // Absence wait
        if self.stop_if_cancelled(&mut outcome, cancel) {
            return outcome;
        }
        if outcome.absent_at_start {
            outcome.absence = AbsenceStatus::Confirmed;
        } else {
            self.wait_for_absence(&mut outcome, cancel).await;
            if outcome.cancelled {
                return outcome;
            }
        }

        info!(
            lb_name = %lb_name,
            listeners = outcome.listeners.deleted,
            target_groups = outcome.target_groups.deleted,
            security_groups = outcome.security_groups.deleted,
            warnings = outcome.warnings.len(),
            "Teardown complete"
        );
        outcome
    }

    async fn reap_target_groups(&self, outcome: &mut TeardownOutcome) {
        let target_groups = TargetGroupReaper::new(self.provider)
            .reap(&outcome.load_balancer)
            .await;
        outcome.target_groups = target_groups.counts;
        if let Some(message) = target_groups.error {
            outcome.warn(format!("target group discovery: {message}"));
        }
        for arn in &target_groups.failed {
            outcome.warn(format!("failed to delete target group {arn}"));
        }
        outcome.failed_target_groups = target_groups.failed;
    }

    async fn wait_for_absence(&self, outcome: &mut TeardownOutcome, cancel: &CancellationToken) {
        let waiter = DeletionWaiter::new(self.provider, self.config.absence_wait.clone());
        match waiter.wait(&outcome.load_balancer, cancel).await {
            WaitResult::Absent => outcome.absence = AbsenceStatus::Confirmed,
            WaitResult::DeadlineExceeded { elapsed, .. } => {
                outcome.absence = AbsenceStatus::DeadlineExceeded;
                outcome.warn(format!(
                    "load balancer {} still present after {elapsed:?}",
                    outcome.load_balancer.name
                ));
            }
            WaitResult::Cancelled => outcome.cancelled = true,
        }
    }

    async fn delete_load_balancer(&self, outcome: &mut TeardownOutcome) {
        let Some(arn) = outcome.load_balancer.arn.clone() else {
            debug!(lb_name = %outcome.load_balancer.name, "Load balancer never resolved, nothing to delete");
            return;
        };

        let result = match self.provider.delete_load_balancer(&arn).await {
            Ok(()) => {
                info!(lb_arn = %arn, "Deleted load balancer");
                CleanupResult::Deleted
            }
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                debug!(lb_arn = %arn, "Load balancer already deleted");
                CleanupResult::AlreadyDeleted
            }
            Err(e) => {
                warn!(lb_arn = %arn, error = ?e, "Failed to delete load balancer");
                outcome.warn(format!("failed to delete load balancer {arn}: {e:#}"));
                CleanupResult::Failed
            }
        };
        outcome.load_balancers.record(result);
    }

    fn stop_if_cancelled(&self, outcome: &mut TeardownOutcome, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            warn!(lb_name = %outcome.load_balancer.name, "Teardown cancelled, skipping remaining stages");
            outcome.cancelled = true;
        }
        outcome.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{AwsError, MockLoadBalancerProvider};
    use crate::teardown::outcome::StageCounts;
    use crate::wait::PollConfig;
    use elb_reaper_common::{ListenerRef, TargetGroupRef};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_config() -> TeardownConfig {
        TeardownConfig {
            absence_wait: PollConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_millis(100),
                call_timeout: Duration::from_millis(50),
            },
            delete_load_balancer: false,
        }
    }

    /// Load balancer visible until the first listener delete, gone afterwards
    fn provider_with_dependents(tg_fails: bool) -> MockLoadBalancerProvider {
        let deleted = Arc::new(AtomicBool::new(false));
        let mut provider = MockLoadBalancerProvider::new();

        let seen = deleted.clone();
        provider.expect_describe_load_balancer().returning(move |name| {
            if seen.load(Ordering::SeqCst) {
                Ok(None)
            } else {
                Ok(Some(LoadBalancerRef::resolved(name, "arn:lb/1")))
            }
        });
        provider.expect_describe_listeners().returning(|lb_arn| {
            Ok(vec![
                ListenerRef::new("arn:listener/1", lb_arn),
                ListenerRef::new("arn:listener/2", lb_arn),
            ])
        });
        provider.expect_delete_listener().times(2).returning(|_| Ok(()));
        provider
            .expect_describe_target_groups()
            .returning(|_| Ok(vec![TargetGroupRef::new("arn:tg/1")]));
        provider
            .expect_delete_target_group()
            .times(1)
            .returning(move |_| {
                if tg_fails {
                    Err(AwsError::ResourceInUse.into())
                } else {
                    Ok(())
                }
            });
        provider.expect_delete_security_group().returning(move |_| {
            deleted.store(true, Ordering::SeqCst);
            Ok(())
        });
        provider
    }

    #[tokio::test]
    async fn test_full_pipeline_no_warnings() {
        let provider = provider_with_dependents(false);
        let orphans = vec![SecurityGroupRef::new("sg-1")];

        let outcome = TeardownOrchestrator::new(&provider, fast_config())
            .run("lb-old", &orphans, &CancellationToken::new())
            .await;

        assert!(!outcome.is_fatal());
        assert!(!outcome.has_warnings(), "{:?}", outcome.warnings);
        assert_eq!(outcome.listeners.deleted, 2);
        assert_eq!(outcome.target_groups.deleted, 1);
        assert_eq!(outcome.security_groups.deleted, 1);
        assert_eq!(outcome.absence, AbsenceStatus::Confirmed);
        assert_eq!(outcome.load_balancer.arn.as_deref(), Some("arn:lb/1"));
    }

    #[tokio::test]
    async fn test_target_group_failure_is_warning() {
        let provider = provider_with_dependents(true);
        let orphans = vec![SecurityGroupRef::new("sg-1")];

        let outcome = TeardownOrchestrator::new(&provider, fast_config())
            .run("lb-old", &orphans, &CancellationToken::new())
            .await;

        assert!(!outcome.is_fatal());
        assert_eq!(outcome.target_groups.failed, 1);
        assert_eq!(outcome.failed_target_groups, vec!["arn:tg/1".to_string()]);
        assert_eq!(outcome.security_groups.deleted, 1);
        assert_eq!(outcome.absence, AbsenceStatus::Confirmed);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_listener_failure_is_fatal() {
        let mut provider = MockLoadBalancerProvider::new();
        provider
            .expect_describe_load_balancer()
            .returning(|name| Ok(Some(LoadBalancerRef::resolved(name, "arn:lb/1"))));
        provider.expect_describe_listeners().returning(|lb_arn| {
            Ok(vec![
                ListenerRef::new("arn:listener/1", lb_arn),
                ListenerRef::new("arn:listener/2", lb_arn),
            ])
        });
        provider
            .expect_delete_listener()
            .withf(|arn| arn == "arn:listener/1")
            .returning(|_| Ok(()));
        provider
            .expect_delete_listener()
            .withf(|arn| arn == "arn:listener/2")
            .returning(|_| Err(anyhow::anyhow!("AccessDenied")));
        provider.expect_describe_target_groups().never();
        provider.expect_delete_security_group().never();

        let outcome = TeardownOrchestrator::new(&provider, fast_config())
            .run("lb-old", &[SecurityGroupRef::new("sg-1")], &CancellationToken::new())
            .await;

        assert!(outcome.is_fatal());
        assert_eq!(
            outcome.listeners,
            StageCounts {
                deleted: 1,
                already_absent: 0,
                failed: 1
            }
        );
        assert_eq!(outcome.absence, AbsenceStatus::NotChecked);
        assert!(matches!(
            outcome.into_result(),
            Err(TeardownError::ListenerCleanup { deleted: 1, failed: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_deadline_is_warning() {
        let mut provider = MockLoadBalancerProvider::new();
        provider
            .expect_describe_load_balancer()
            .returning(|name| Ok(Some(LoadBalancerRef::resolved(name, "arn:lb/1"))));
        provider.expect_describe_listeners().returning(|_| Ok(vec![]));
        provider.expect_describe_target_groups().returning(|_| Ok(vec![]));

        let outcome = TeardownOrchestrator::new(&provider, fast_config())
            .run("lb-old", &[], &CancellationToken::new())
            .await;

        assert!(!outcome.is_fatal());
        assert_eq!(outcome.absence, AbsenceStatus::DeadlineExceeded);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_optional_load_balancer_delete() {
        let deleted = Arc::new(AtomicBool::new(false));
        let seen = deleted.clone();
        let mut provider = MockLoadBalancerProvider::new();
        provider.expect_describe_load_balancer().returning(move |name| {
            if seen.load(Ordering::SeqCst) {
                Ok(None)
            } else {
                Ok(Some(LoadBalancerRef::resolved(name, "arn:lb/1")))
            }
        });
        provider.expect_describe_listeners().returning(|_| Ok(vec![]));
        provider.expect_describe_target_groups().returning(|_| Ok(vec![]));
        provider
            .expect_delete_load_balancer()
            .withf(|arn| arn == "arn:lb/1")
            .times(1)
            .returning(move |_| {
                deleted.store(true, Ordering::SeqCst);
                Ok(())
            });

        let mut config = fast_config();
        config.delete_load_balancer = true;
        let outcome = TeardownOrchestrator::new(&provider, config)
            .run("lb-old", &[], &CancellationToken::new())
            .await;

        assert_eq!(outcome.load_balancers.deleted, 1);
        assert_eq!(outcome.absence, AbsenceStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_absent_at_start_leaves_same_named_replacement_alone() {
        // Gone on the first describe, recreated under the same name after
        let calls = Arc::new(AtomicUsize::new(0));
        let mut provider = MockLoadBalancerProvider::new();
        provider.expect_describe_load_balancer().returning(move |name| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(LoadBalancerRef::resolved(name, "arn:lb/new")))
            }
        });
        provider.expect_describe_listeners().never();
        provider.expect_describe_target_groups().never();
        provider.expect_delete_target_group().never();
        provider.expect_delete_load_balancer().never();
        provider
            .expect_delete_security_group()
            .times(1)
            .returning(|_| Ok(()));

        let mut config = fast_config();
        config.delete_load_balancer = true;
        let outcome = TeardownOrchestrator::new(&provider, config)
            .run("lb-old", &[SecurityGroupRef::new("sg-1")], &CancellationToken::new())
            .await;

        assert!(outcome.absent_at_start);
        assert!(outcome.load_balancer.arn.is_none());
        assert_eq!(outcome.target_groups.total(), 0);
        assert_eq!(outcome.load_balancers.total(), 0);
        assert_eq!(outcome.security_groups.deleted, 1);
        assert_eq!(outcome.absence, AbsenceStatus::Confirmed);
        assert!(!outcome.has_warnings(), "{:?}", outcome.warnings);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut provider = MockLoadBalancerProvider::new();
        provider.expect_describe_load_balancer().never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = TeardownOrchestrator::new(&provider, fast_config())
            .run("lb-old", &[], &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(matches!(
            outcome.into_result(),
            Err(TeardownError::Cancelled { .. })
        ));
    }
}
