//! Typed references to cloud objects
//!
//! All references are built fresh for each teardown from live describe calls
//! or from caller input. Nothing here is cached.

use serde::Serialize;
use std::fmt;

/// A load balancer, identified by name with its ARN once resolved.
///
/// The name is the stable external identity; the ARN pins a specific
/// object. A later describe returning a different ARN for the same name
/// means the original object has already been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LoadBalancerRef {
    pub name: String,
    pub arn: Option<String>,
}

impl LoadBalancerRef {
    /// Reference by name only (ARN not yet resolved)
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arn: None,
        }
    }

    /// Reference with a resolved ARN
    pub fn resolved(name: impl Into<String>, arn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arn: Some(arn.into()),
        }
    }

    /// Whether `observed` (a fresh describe result for this name) is still
    /// the object this reference pins.
    ///
    /// An unresolved reference matches anything describable under its name.
    pub fn is_same_object(&self, observed: &LoadBalancerRef) -> bool {
        if self.name != observed.name {
            return false;
        }
        match (&self.arn, &observed.arn) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }
}

impl fmt::Display for LoadBalancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arn {
            Some(arn) => write!(f, "{} ({})", self.name, arn),
            None => f.write_str(&self.name),
        }
    }
}

/// A listener owned by exactly one load balancer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerRef {
    pub arn: String,
    pub load_balancer_arn: String,
}

impl ListenerRef {
    pub fn new(arn: impl Into<String>, load_balancer_arn: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            load_balancer_arn: load_balancer_arn.into(),
        }
    }
}

/// A target group, treated as exclusively owned by the load balancer under
/// teardown
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetGroupRef {
    pub arn: String,
}

impl TargetGroupRef {
    pub fn new(arn: impl Into<String>) -> Self {
        Self { arn: arn.into() }
    }
}

/// An orphaned security group handed in by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SecurityGroupRef {
    pub id: String,
}

impl SecurityGroupRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl From<&str> for SecurityGroupRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A Kubernetes service fronted by a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceRef {
    pub namespace: String,
    pub name: String,
}

impl ServiceRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
