//! Load balancer resource classes and teardown ordering
//!
//! Provides a single source of truth for the order in which dependents of a
//! load balancer are removed. Resources must be cleaned in dependency order
//! to avoid failures.

use serde::Serialize;

/// Types of AWS resources touched during a teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Listener (must go before target groups it routes to)
    Listener,
    /// Target group (may keep security groups in use)
    TargetGroup,
    /// The load balancer itself (optional explicit deletion)
    LoadBalancer,
    /// Security group (depends on the load balancer's interfaces being gone)
    SecurityGroup,
}

impl ResourceKind {
    /// Every kind, in teardown order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Listener,
        ResourceKind::TargetGroup,
        ResourceKind::LoadBalancer,
        ResourceKind::SecurityGroup,
    ];

    /// Get teardown priority (lower number = cleanup first)
    ///
    /// - 0: Delete listeners (some providers refuse to delete a target group
    ///   still referenced by a listener rule)
    /// - 1: Delete target groups
    /// - 2: Delete the load balancer, when explicitly requested
    /// - 3: Delete security groups (network interfaces must be released)
    pub fn cleanup_priority(self) -> u8 {
        match self {
            ResourceKind::Listener => 0,
            ResourceKind::TargetGroup => 1,
            ResourceKind::LoadBalancer => 2,
            ResourceKind::SecurityGroup => 3,
        }
    }

    /// Short name for logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::SecurityGroup => "security-group",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
