//! Shared test utilities for elb-reaper
//!
//! This crate provides common test helpers that can be used across
//! multiple test modules without circular dependencies.
//!
//! ## Modules
//!
//! - [`aws`]: AWS region detection and unique test resource names
//! - [`fake`]: In-memory cloud implementing the provider and resolver seams

pub mod aws;
pub mod fake;

// Re-export commonly used items
pub use aws::{get_test_region, test_run_id};
pub use fake::{Call, FakeCloud, ResolverStep};
