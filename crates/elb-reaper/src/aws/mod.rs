//! AWS client modules
//!
//! This module provides wrappers around AWS SDK clients for:
//! - ELBv2: Load balancers, listeners and target groups
//! - EC2: Security group deletion
//! - provider: The mockable seam the teardown engine is written against
//! - scanner: Security group discovery

pub mod context;
pub mod ec2;
pub mod elb;
pub mod error;
pub mod provider;
pub mod scanner;

// Core clients
pub use context::{AwsContext, FromAwsContext};
pub use ec2::Ec2Client;
pub use elb::ElbClient;
pub use provider::{AwsProvider, LoadBalancerProvider};
pub use scanner::{SecurityGroupScanner, merge_security_groups};

#[cfg(test)]
pub use provider::MockLoadBalancerProvider;

// Error handling
pub use error::{AwsError, classify_anyhow_error, classify_aws_error, ignore_not_found};
