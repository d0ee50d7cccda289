//! Listener discovery and deletion
//!
//! Listeners go first: some providers refuse to delete a target group that a
//! live listener still routes to, so a partial result here is fatal.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::teardown::outcome::{CleanupResult, StageCounts};
use elb_reaper_common::LoadBalancerRef;
use tracing::{debug, error, info};

/// What the listener stage did
#[derive(Debug, Clone, Default)]
pub struct ListenerReport {
    /// The resolved load balancer, `None` if it was already gone
    pub load_balancer: Option<LoadBalancerRef>,
    pub counts: StageCounts,
    /// Set when resolution, discovery or any deletion failed
    pub error: Option<String>,
}

impl ListenerReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Deletes every listener on a load balancer
pub struct ListenerReaper<'a, P> {
    provider: &'a P,
}

impl<'a, P: LoadBalancerProvider> ListenerReaper<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Resolve `lb_name`, list its listeners and delete each one.
    ///
    /// An absent load balancer is success with nothing deleted. Deletion
    /// stops at the first failure.
    pub async fn reap(&self, lb_name: &str) -> ListenerReport {
        let mut report = ListenerReport::default();

        let lb = match self.provider.describe_load_balancer(lb_name).await {
            Ok(Some(lb)) => lb,
            Ok(None) => {
                info!(lb_name = %lb_name, "Load balancer already gone, no listeners to delete");
                return report;
            }
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                info!(lb_name = %lb_name, "Load balancer already gone, no listeners to delete");
                return report;
            }
            Err(e) => {
                error!(lb_name = %lb_name, error = ?e, "Failed to resolve load balancer");
                report.error = Some(format!("failed to resolve load balancer: {e:#}"));
                return report;
            }
        };
        report.load_balancer = Some(lb.clone());

        let Some(lb_arn) = lb.arn.as_deref() else {
            report.error = Some("load balancer resolved without an ARN".to_string());
            return report;
        };

        let listeners = match self.provider.describe_listeners(lb_arn).await {
            Ok(listeners) => listeners,
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                info!(lb_arn = %lb_arn, "Load balancer disappeared before listing listeners");
                return report;
            }
            Err(e) => {
                error!(lb_arn = %lb_arn, error = ?e, "Failed to list listeners");
                report.error = Some(format!("failed to list listeners: {e:#}"));
                return report;
            }
        };

        info!(lb_name = %lb_name, count = listeners.len(), "Deleting listeners");

        for listener in &listeners {
            match self.provider.delete_listener(&listener.arn).await {
                Ok(()) => {
                    info!(listener_arn = %listener.arn, "Deleted");
                    report.counts.record(CleanupResult::Deleted);
                }
                Err(e) if classify_anyhow_error(&e).is_not_found() => {
                    debug!(listener_arn = %listener.arn, "Listener already deleted");
                    report.counts.record(CleanupResult::AlreadyDeleted);
                }
                Err(e) => {
                    error!(listener_arn = %listener.arn, error = ?e, "Failed to delete listener");
                    report.counts.record(CleanupResult::Failed);
                    report.error = Some(format!(
                        "failed to delete listener {}: {e:#}",
                        listener.arn
                    ));
                    break;
                }
            }
        }

        report
    }
}
