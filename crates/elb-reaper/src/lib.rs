//! elb-reaper - ordered load balancer teardown and recreation verification
//!
//! Deletes the dependents of an AWS load balancer in dependency order
//! (listeners, target groups, security groups), waits for the load balancer
//! to disappear, and then verifies that a new, distinct load balancer is
//! provisioned for the service it fronted.

pub mod aws;
pub mod config;
pub mod cycle;
pub mod error;
pub mod recreation;
pub mod report;
pub mod resolver;
pub mod teardown;
pub mod wait;
