//! Best-effort deletion of orphaned security groups
//!
//! The groups are handed in by the caller, never discovered here. They may
//! still be referenced by resources outside this teardown's view, so every
//! failure is a warning and the stage never fails the run.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::teardown::outcome::{CleanupResult, StageCounts};
use elb_reaper_common::SecurityGroupRef;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What the security group stage did
#[derive(Debug, Clone, Default)]
pub struct SecurityGroupReport {
    pub counts: StageCounts,
    /// IDs whose deletion failed
    pub failed: Vec<String>,
}

/// Deletes a supplied set of security groups
pub struct SecurityGroupReaper<'a, P> {
    provider: &'a P,
}

impl<'a, P: LoadBalancerProvider> SecurityGroupReaper<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Attempt to delete each group once; duplicate IDs are ignored.
    pub async fn reap(&self, groups: &[SecurityGroupRef]) -> SecurityGroupReport {
        let mut report = SecurityGroupReport::default();
        let mut seen = HashSet::new();

        if !groups.is_empty() {
            info!(count = groups.len(), "Deleting orphaned security groups");
        }

        for sg in groups.iter().filter(|sg| seen.insert(sg.id.as_str())) {
            let result = match self.provider.delete_security_group(&sg.id).await {
                Ok(()) => {
                    info!(sg_id = %sg.id, "Deleted");
                    CleanupResult::Deleted
                }
                Err(e) if classify_anyhow_error(&e).is_not_found() => {
                    debug!(sg_id = %sg.id, "Security group already deleted");
                    CleanupResult::AlreadyDeleted
                }
                Err(e) => {
                    warn!(sg_id = %sg.id, error = ?e, "Failed to delete security group, skipping");
                    report.failed.push(sg.id.clone());
                    CleanupResult::Failed
                }
            };
            report.counts.record(result);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{AwsError, MockLoadBalancerProvider};

    #[tokio::test]
    async fn test_every_failure_is_skipped() {
        let mut provider = MockLoadBalancerProvider::new();
        provider
            .expect_delete_security_group()
            .withf(|id| id == "sg-1")
            .returning(|_| Err(AwsError::DependencyViolation.into()));
        provider
            .expect_delete_security_group()
            .withf(|id| id == "sg-2")
            .returning(|id| Err(AwsError::not_found("security-group", id).into()));
        provider
            .expect_delete_security_group()
            .withf(|id| id == "sg-3")
            .returning(|_| Ok(()));

        let groups: Vec<SecurityGroupRef> = ["sg-1", "sg-2", "sg-3"].into_iter().map(Into::into).collect();
        let report = SecurityGroupReaper::new(&provider).reap(&groups).await;

        assert_eq!(
            report.counts,
            StageCounts {
                deleted: 1,
                already_absent: 1,
                failed: 1
            }
        );
        assert_eq!(report.failed, vec!["sg-1".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicates_deleted_once() {
        let mut provider = MockLoadBalancerProvider::new();
        provider
            .expect_delete_security_group()
            .times(1)
            .returning(|_| Ok(()));

        let groups = vec![SecurityGroupRef::new("sg-1"), SecurityGroupRef::new("sg-1")];
        let report = SecurityGroupReaper::new(&provider).reap(&groups).await;

        assert_eq!(report.counts.deleted, 1);
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_calls() {
        let mut provider = MockLoadBalancerProvider::new();
        provider.expect_delete_security_group().never();

        let report = SecurityGroupReaper::new(&provider).reap(&[]).await;

        assert_eq!(report.counts.total(), 0);
    }
}
