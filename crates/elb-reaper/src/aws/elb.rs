//! Elastic Load Balancing v2 operations
//!
//! Load balancers, listeners and target groups. Describe calls map
//! "not found" to an empty result; delete calls surface it as a classified
//! [`AwsError::NotFound`](super::AwsError::NotFound) so callers can count the
//! resource as already gone.

use super::context::{AwsContext, FromAwsContext};
use super::error::{classify_anyhow_error, ignore_not_found};
use anyhow::{Context, Result};
use aws_sdk_elasticloadbalancingv2::Client;
use backon::{ExponentialBuilder, Retryable};
use elb_reaper_common::{ListenerRef, LoadBalancerRef, TargetGroupRef};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backoff for deletes that race the provider's eventual consistency
fn delete_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(2))
        .with_max_delay(Duration::from_secs(20))
        .with_max_times(5)
}

/// ELBv2 client for load balancer teardown
pub struct ElbClient {
    pub(crate) client: Client,
}

impl FromAwsContext for ElbClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.elb_client(),
        }
    }
}

impl ElbClient {
    /// Create a new ELB client (loads AWS config from environment)
    pub async fn new(region: &str) -> Result<Self> {
        let ctx = AwsContext::new(region).await;
        Ok(Self::from_context(&ctx))
    }

    /// Look up a load balancer by name.
    ///
    /// Returns `Ok(None)` if no load balancer with that name exists.
    pub async fn describe_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRef>> {
        let result = self
            .client
            .describe_load_balancers()
            .names(name)
            .send()
            .await
            .context("Failed to describe load balancer");

        let Some(response) = ignore_not_found(result)? else {
            debug!(lb_name = %name, "Load balancer not found");
            return Ok(None);
        };

        let Some(lb) = response.load_balancers().first() else {
            return Ok(None);
        };
        let arn = lb
            .load_balancer_arn()
            .context("No load balancer ARN in response")?;

        Ok(Some(LoadBalancerRef::resolved(name, arn)))
    }

    /// Security group IDs attached to a load balancer.
    ///
    /// Returns an empty list if the load balancer does not exist.
    pub async fn load_balancer_security_groups(&self, name: &str) -> Result<Vec<String>> {
        let result = self
            .client
            .describe_load_balancers()
            .names(name)
            .send()
            .await
            .context("Failed to describe load balancer");

        Ok(ignore_not_found(result)?
            .and_then(|response| response.load_balancers().first().cloned())
            .map(|lb| lb.security_groups().to_vec())
            .unwrap_or_default())
    }

    /// List every listener on a load balancer, following pagination.
    pub async fn describe_listeners(&self, lb_arn: &str) -> Result<Vec<ListenerRef>> {
        let mut listeners = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_listeners()
                .load_balancer_arn(lb_arn)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to describe listeners")?;

            listeners.extend(response.listeners().iter().filter_map(|l| {
                l.listener_arn().map(|arn| ListenerRef {
                    arn: arn.to_string(),
                    load_balancer_arn: l.load_balancer_arn().unwrap_or(lb_arn).to_string(),
                })
            }));

            match response.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(lb_arn = %lb_arn, count = listeners.len(), "Found listeners");
        Ok(listeners)
    }

    /// Delete a listener
    pub async fn delete_listener(&self, listener_arn: &str) -> Result<()> {
        info!(listener_arn = %listener_arn, "Deleting listener");

        (|| async {
            self.client
                .delete_listener()
                .listener_arn(listener_arn)
                .send()
                .await
                .context("Failed to delete listener")?;
            Ok(())
        })
        .retry(delete_backoff())
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                listener_arn = %listener_arn,
                delay = ?dur,
                error = %e,
                "Listener deletion failed, retrying..."
            );
        })
        .await
    }

    /// List every target group associated with a load balancer, following pagination.
    pub async fn describe_target_groups(&self, lb_arn: &str) -> Result<Vec<TargetGroupRef>> {
        let mut target_groups = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_target_groups()
                .load_balancer_arn(lb_arn)
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to describe target groups")?;

            target_groups.extend(
                response
                    .target_groups()
                    .iter()
                    .filter_map(|tg| tg.target_group_arn().map(TargetGroupRef::new)),
            );

            match response.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(lb_arn = %lb_arn, count = target_groups.len(), "Found target groups");
        Ok(target_groups)
    }

    /// Delete a target group
    ///
    /// Retries while the target group is still referenced by a listener that
    /// the provider has not finished removing.
    pub async fn delete_target_group(&self, target_group_arn: &str) -> Result<()> {
        info!(target_group_arn = %target_group_arn, "Deleting target group");

        (|| async {
            self.client
                .delete_target_group()
                .target_group_arn(target_group_arn)
                .send()
                .await
                .context("Failed to delete target group")?;
            Ok(())
        })
        .retry(delete_backoff())
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                target_group_arn = %target_group_arn,
                delay = ?dur,
                error = %e,
                "Target group deletion failed, retrying..."
            );
        })
        .await
    }

    /// Delete a load balancer by ARN
    pub async fn delete_load_balancer(&self, lb_arn: &str) -> Result<()> {
        info!(lb_arn = %lb_arn, "Deleting load balancer");

        (|| async {
            self.client
                .delete_load_balancer()
                .load_balancer_arn(lb_arn)
                .send()
                .await
                .context("Failed to delete load balancer")?;
            Ok(())
        })
        .retry(delete_backoff())
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                lb_arn = %lb_arn,
                delay = ?dur,
                error = %e,
                "Load balancer deletion failed, retrying..."
            );
        })
        .await
    }
}
