//! elb-reaper-common - Shared types for load balancer teardown
//!
//! This crate provides the resource identifiers and timing defaults used by
//! the teardown engine and its test fixtures, without any AWS SDK
//! dependencies to keep it lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Default polling intervals and deadlines
//! - [`resource_kind`]: Resource classes and their teardown order
//! - [`resources`]: Typed references to load balancers and their dependents

pub mod defaults;
pub mod resource_kind;
pub mod resources;

// Re-export commonly used types
pub use resource_kind::ResourceKind;
pub use resources::{ListenerRef, LoadBalancerRef, SecurityGroupRef, ServiceRef, TargetGroupRef};
