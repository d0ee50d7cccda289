//! Security group discovery for a load balancer
//!
//! The teardown only deletes security groups it is handed. This scanner
//! collects the groups attached to a load balancer so the CLI can capture
//! them before the load balancer (and the attachment) disappears.

use super::context::{AwsContext, FromAwsContext};
use super::elb::ElbClient;
use anyhow::Result;
use elb_reaper_common::SecurityGroupRef;
use std::collections::HashSet;
use tracing::debug;

/// Scanner for security groups referenced by a load balancer
pub struct SecurityGroupScanner {
    elb: ElbClient,
}

impl FromAwsContext for SecurityGroupScanner {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            elb: ElbClient::from_context(ctx),
        }
    }
}

impl SecurityGroupScanner {
    /// Security groups attached to the named load balancer (empty if absent)
    pub async fn scan(&self, lb_name: &str) -> Result<Vec<SecurityGroupRef>> {
        let groups: Vec<SecurityGroupRef> = self
            .elb
            .load_balancer_security_groups(lb_name)
            .await?
            .into_iter()
            .map(SecurityGroupRef::new)
            .collect();

        debug!(lb_name = %lb_name, count = groups.len(), "Found attached security groups");
        Ok(groups)
    }
}

/// Merge security group sets, dropping duplicates and keeping first-seen order.
pub fn merge_security_groups<I>(sets: I) -> Vec<SecurityGroupRef>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = SecurityGroupRef>,
{
    let mut seen = HashSet::new();
    sets.into_iter()
        .flatten()
        .filter(|sg| seen.insert(sg.id.clone()))
        .collect()
}
