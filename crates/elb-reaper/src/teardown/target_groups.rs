//! Target group discovery and deletion
//!
//! Target groups are cleanup-only: every discovered group gets a delete
//! attempt even if an earlier one failed, and failures are warnings.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::teardown::outcome::{CleanupResult, StageCounts};
use elb_reaper_common::LoadBalancerRef;
use tracing::{debug, info, warn};

/// What the target group stage did
#[derive(Debug, Clone, Default)]
pub struct TargetGroupReport {
    pub counts: StageCounts,
    /// ARNs whose deletion failed
    pub failed: Vec<String>,
    /// Set when discovery itself failed
    pub error: Option<String>,
}

/// Deletes every target group associated with a load balancer
pub struct TargetGroupReaper<'a, P> {
    provider: &'a P,
}

impl<'a, P: LoadBalancerProvider> TargetGroupReaper<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Delete the target groups of `lb`.
    ///
    /// `lb` must carry the ARN seen when teardown started. The name is
    /// re-described first; if it now resolves to a different ARN, the
    /// original load balancer has been replaced and there is nothing left
    /// to clean. An unresolved reference is never reaped: whatever the
    /// name resolves to now cannot be told apart from a replacement.
    pub async fn reap(&self, lb: &LoadBalancerRef) -> TargetGroupReport {
        let mut report = TargetGroupReport::default();

        if lb.arn.is_none() {
            info!(lb_name = %lb.name, "Load balancer was never resolved, skipping target groups");
            return report;
        }

        let current = match self.provider.describe_load_balancer(&lb.name).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                info!(lb_name = %lb.name, "Load balancer already gone, no target groups to delete");
                return report;
            }
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                info!(lb_name = %lb.name, "Load balancer already gone, no target groups to delete");
                return report;
            }
            Err(e) => {
                warn!(lb_name = %lb.name, error = ?e, "Failed to resolve load balancer for target groups");
                report.error = Some(format!("failed to resolve load balancer: {e:#}"));
                return report;
            }
        };

        if !lb.is_same_object(&current) {
            info!(
                lb_name = %lb.name,
                old_arn = ?lb.arn,
                new_arn = ?current.arn,
                "Load balancer already replaced, skipping target groups"
            );
            return report;
        }

        let Some(lb_arn) = current.arn.as_deref() else {
            report.error = Some("load balancer resolved without an ARN".to_string());
            return report;
        };

        let target_groups = match self.provider.describe_target_groups(lb_arn).await {
            Ok(groups) => groups,
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                info!(lb_arn = %lb_arn, "Load balancer disappeared before listing target groups");
                return report;
            }
            Err(e) => {
                warn!(lb_arn = %lb_arn, error = ?e, "Failed to list target groups");
                report.error = Some(format!("failed to list target groups: {e:#}"));
                return report;
            }
        };

        info!(lb_name = %lb.name, count = target_groups.len(), "Deleting target groups");

        for tg in &target_groups {
            match self.provider.delete_target_group(&tg.arn).await {
                Ok(()) => {
                    info!(target_group_arn = %tg.arn, "Deleted");
                    report.counts.record(CleanupResult::Deleted);
                }
                Err(e) if classify_anyhow_error(&e).is_not_found() => {
                    debug!(target_group_arn = %tg.arn, "Target group already deleted");
                    report.counts.record(CleanupResult::AlreadyDeleted);
                }
                Err(e) => {
                    warn!(target_group_arn = %tg.arn, error = ?e, "Failed to delete target group");
                    report.counts.record(CleanupResult::Failed);
                    report.failed.push(tg.arn.clone());
                }
            }
        }

        report
    }
}
