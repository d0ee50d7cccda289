//! AWS test utilities
//!
//! Provides region detection and unique names for live AWS integration tests.

use chrono::Utc;
use elb_reaper_common::defaults::DEFAULT_REGION;

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to the tool's default region
///
/// # Example
///
/// ```
/// use elb_reaper_test_utils::aws::get_test_region;
///
/// let region = get_test_region();
/// assert!(!region.is_empty());
/// ```
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| DEFAULT_REGION.to_string())
}

/// Generate a unique run ID for test resources.
///
/// Format: `test-{timestamp_ms}-{counter}`.
///
/// # Example
///
/// ```
/// use elb_reaper_test_utils::aws::test_run_id;
///
/// let run_id = test_run_id();
/// assert!(run_id.starts_with("test-"));
/// ```
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

/// Generate a load balancer name for a live test.
///
/// ELB names are limited to 32 characters, so only the tail of the run ID
/// is kept.
pub fn test_load_balancer_name() -> String {
    let run_id = test_run_id();
    let tail: String = run_id
        .chars()
        .rev()
        .take(24)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("elbr-{}", tail.trim_start_matches('-'))
}
