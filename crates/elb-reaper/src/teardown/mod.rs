//! Ordered load balancer teardown
//!
//! Each stage lives in its own module and reports what it did; the
//! [`TeardownOrchestrator`] decides whether a stage failure ends the run.

mod listeners;
mod orchestrator;
mod outcome;
mod security_groups;
mod target_groups;
mod waiter;

pub use listeners::{ListenerReaper, ListenerReport};
pub use orchestrator::TeardownOrchestrator;
pub use outcome::{AbsenceStatus, CleanupResult, StageCounts, TeardownOutcome};
pub use security_groups::{SecurityGroupReaper, SecurityGroupReport};
pub use target_groups::{TargetGroupReaper, TargetGroupReport};
pub use waiter::{DeletionWaiter, WaitResult};
