//! Configuration types for teardown and recreation checks
//!
//! Everything the engine needs is passed in at construction; nothing is read
//! from the environment below the CLI.

use crate::error::ConfigError;
use crate::wait::PollConfig;
use elb_reaper_common::ServiceRef;
use elb_reaper_common::defaults::{
    DEFAULT_RECREATE_TIMEOUT_SECS, DEFAULT_REGION, default_call_timeout, default_poll_interval,
};
use std::time::Duration;

/// Teardown pipeline settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownConfig {
    /// Polling for the old load balancer to disappear
    pub absence_wait: PollConfig,
    /// Delete the load balancer itself after its target groups
    pub delete_load_balancer: bool,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            absence_wait: PollConfig::default(),
            delete_load_balancer: false,
        }
    }
}

/// Recreation verification settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecreationConfig {
    pub poll: PollConfig,
}

impl Default for RecreationConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig {
                interval: default_poll_interval(),
                timeout: Duration::from_secs(DEFAULT_RECREATE_TIMEOUT_SECS),
                call_timeout: default_call_timeout(),
            },
        }
    }
}

/// AWS infrastructure configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: None,
        }
    }
}

/// Configuration for a full teardown-and-verify run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub aws: AwsConfig,
    pub service: ServiceRef,
    pub teardown: TeardownConfig,
    pub recreation: RecreationConfig,
}

impl RunConfig {
    /// Validate every field the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws.region.trim().is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        if self.service.namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::EmptyService);
        }
        validate_poll(&self.teardown.absence_wait, "absence wait")?;
        validate_poll(&self.recreation.poll, "recreation")?;
        Ok(())
    }
}

/// Check that a polling configuration can make progress
pub fn validate_poll(poll: &PollConfig, name: &'static str) -> Result<(), ConfigError> {
    if poll.interval.is_zero() || poll.timeout.is_zero() || poll.call_timeout.is_zero() {
        return Err(ConfigError::ZeroDuration(name));
    }
    if poll.interval > poll.timeout {
        return Err(ConfigError::IntervalExceedsTimeout(name));
    }
    Ok(())
}
