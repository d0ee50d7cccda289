//! Provider operations trait for testing
//!
//! The teardown engine only ever talks to the cloud through
//! [`LoadBalancerProvider`], so orchestration logic can be unit tested
//! without hitting real AWS.

use super::context::{AwsContext, FromAwsContext};
use super::ec2::Ec2Client;
use super::elb::ElbClient;
use anyhow::Result;
use elb_reaper_common::{ListenerRef, LoadBalancerRef, TargetGroupRef};

/// Trait for the provider operations the teardown consumes.
///
/// Describe calls report absence as `Ok(None)` or an empty list. Delete
/// calls report absence as an error that
/// [`classify_anyhow_error`](super::classify_anyhow_error) maps to
/// `NotFound`.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait LoadBalancerProvider: Send + Sync {
    /// Resolve a load balancer name to its ARN, or `None` if absent
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRef>>;

    /// List listeners attached to a load balancer
    async fn describe_listeners(&self, lb_arn: &str) -> Result<Vec<ListenerRef>>;

    /// Delete a listener
    async fn delete_listener(&self, listener_arn: &str) -> Result<()>;

    /// List target groups associated with a load balancer
    async fn describe_target_groups(&self, lb_arn: &str) -> Result<Vec<TargetGroupRef>>;

    /// Delete a target group
    async fn delete_target_group(&self, target_group_arn: &str) -> Result<()>;

    /// Delete a security group
    async fn delete_security_group(&self, security_group_id: &str) -> Result<()>;

    /// Delete a load balancer
    async fn delete_load_balancer(&self, lb_arn: &str) -> Result<()>;
}

/// [`LoadBalancerProvider`] backed by the AWS SDK
pub struct AwsProvider {
    elb: ElbClient,
    ec2: Ec2Client,
}

impl FromAwsContext for AwsProvider {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            elb: ElbClient::from_context(ctx),
            ec2: Ec2Client::from_context(ctx),
        }
    }
}

impl LoadBalancerProvider for AwsProvider {
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRef>> {
        self.elb.describe_load_balancer(name).await
    }

    async fn describe_listeners(&self, lb_arn: &str) -> Result<Vec<ListenerRef>> {
        self.elb.describe_listeners(lb_arn).await
    }

    async fn delete_listener(&self, listener_arn: &str) -> Result<()> {
        self.elb.delete_listener(listener_arn).await
    }

    async fn describe_target_groups(&self, lb_arn: &str) -> Result<Vec<TargetGroupRef>> {
        self.elb.describe_target_groups(lb_arn).await
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> Result<()> {
        self.elb.delete_target_group(target_group_arn).await
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        self.ec2.delete_security_group(security_group_id).await
    }

    async fn delete_load_balancer(&self, lb_arn: &str) -> Result<()> {
        self.elb.delete_load_balancer(lb_arn).await
    }
}
