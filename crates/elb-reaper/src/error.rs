//! Teardown, recreation and configuration errors
//!
//! Only the failures that end a test case live here. Tolerable stage
//! failures are recorded in the teardown outcome instead.

use std::time::Duration;
use thiserror::Error;

/// Fatal teardown failures
#[derive(Debug, Clone, Error)]
pub enum TeardownError {
    /// Listener cleanup could not be completed, so later stages are unsafe
    #[error(
        "listener cleanup failed for load balancer '{load_balancer}' \
         ({deleted} deleted, {failed} failed): {message}"
    )]
    ListenerCleanup {
        load_balancer: String,
        deleted: usize,
        failed: usize,
        message: String,
    },

    /// The operation was cancelled before all stages ran
    #[error("teardown of load balancer '{load_balancer}' was cancelled")]
    Cancelled { load_balancer: String },
}

/// Fatal recreation-verification failures
#[derive(Debug, Clone, Error)]
pub enum RecreationError {
    /// No new, distinct load balancer was observed before the deadline
    #[error(
        "no replacement for load balancer '{old}' on service {service} \
         after {elapsed:?} ({attempts} attempts)"
    )]
    TimedOut {
        service: String,
        old: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Verification was cancelled before reaching a verdict
    #[error("recreation check for service {service} was cancelled")]
    Cancelled { service: String },
}

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// region is empty
    #[error("region cannot be empty")]
    EmptyRegion,

    /// load balancer name is empty
    #[error("load balancer name cannot be empty")]
    EmptyLoadBalancer,

    /// service namespace is empty
    #[error("service namespace cannot be empty")]
    EmptyNamespace,

    /// service name is empty
    #[error("service name cannot be empty")]
    EmptyService,

    /// a polling duration is zero
    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    /// poll interval longer than the whole deadline
    #[error("{0} poll interval must not exceed its timeout")]
    IntervalExceedsTimeout(&'static str),
}
