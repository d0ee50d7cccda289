//! EC2 security group deletion

use super::context::{AwsContext, FromAwsContext};
use super::error::classify_anyhow_error;
use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{info, warn};

/// EC2 client for security group cleanup
pub struct Ec2Client {
    pub(crate) client: Client,
}

impl FromAwsContext for Ec2Client {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }
}

impl Ec2Client {
    /// Create a new EC2 client (loads AWS config from environment)
    pub async fn new(region: &str) -> Result<Self> {
        let ctx = AwsContext::new(region).await;
        Ok(Self::from_context(&ctx))
    }

    /// Delete a security group
    ///
    /// Retries on DependencyViolation errors (e.g., when the load balancer's
    /// network interfaces are still being released). A missing group is
    /// returned as a classified not-found error.
    pub async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        info!(sg_id = %security_group_id, "Deleting security group");

        (|| async {
            self.client
                .delete_security_group()
                .group_id(security_group_id)
                .send()
                .await
                .context("Failed to delete security group")?;
            info!(sg_id = %security_group_id, "Security group deleted");
            Ok(())
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(4),
        )
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                sg_id = %security_group_id,
                delay = ?dur,
                error = %e,
                "Security group deletion failed, retrying..."
            );
        })
        .await
    }
}
