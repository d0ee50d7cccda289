//! Default timing values shared between the library, CLI and tests
//!
//! These constants keep the CLI flags and the library's `Default` impls in
//! agreement.

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default fixed interval between polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default maximum time to wait for the old load balancer to disappear (5 minutes)
pub const DEFAULT_ABSENCE_TIMEOUT_SECS: u64 = 300;

/// Default maximum time to wait for a replacement load balancer (15 minutes)
pub const DEFAULT_RECREATE_TIMEOUT_SECS: u64 = 900;

/// Default upper bound on a single provider or resolver call, in seconds
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Returns the default poll interval
pub fn default_poll_interval() -> std::time::Duration {
    std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
}

/// Returns the default per-call timeout
pub fn default_call_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS)
}
