//! Per-stage teardown ledger
//!
//! `TeardownOutcome` is what the orchestrator returns and what a test
//! asserts against. It separates the three error classes: fatal (stored
//! once, ends the run), tolerable (counted and listed as warnings) and
//! benign (counted as already-absent, never reported as a problem).

use crate::error::TeardownError;
use elb_reaper_common::{LoadBalancerRef, ResourceKind};
use serde::{Serialize, Serializer};

/// Result of a single resource cleanup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupResult {
    /// Resource was successfully deleted
    Deleted,
    /// Resource was already deleted (not found)
    AlreadyDeleted,
    /// Cleanup failed with error
    Failed,
}

/// Deleted / already-absent / failed counts for one resource class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub deleted: usize,
    pub already_absent: usize,
    pub failed: usize,
}

impl StageCounts {
    /// Count one cleanup result
    pub fn record(&mut self, result: CleanupResult) {
        match result {
            CleanupResult::Deleted => self.deleted += 1,
            CleanupResult::AlreadyDeleted => self.already_absent += 1,
            CleanupResult::Failed => self.failed += 1,
        }
    }

    /// Number of resources this stage touched
    pub fn total(&self) -> usize {
        self.deleted + self.already_absent + self.failed
    }
}

/// What the deletion waiter observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceStatus {
    /// The wait stage never ran (fatal error or cancellation earlier)
    NotChecked,
    /// The old load balancer is no longer describable
    Confirmed,
    /// The deadline passed while it was still describable
    DeadlineExceeded,
}

/// Outcome of one teardown run
#[derive(Debug, Clone, Serialize)]
pub struct TeardownOutcome {
    /// The load balancer under teardown (ARN filled in once resolved)
    pub load_balancer: LoadBalancerRef,
    /// The name did not resolve when teardown started; `load_balancer`
    /// then stays unresolved and nothing under its name is touched
    pub absent_at_start: bool,
    pub listeners: StageCounts,
    pub target_groups: StageCounts,
    /// Only non-zero when explicit load balancer deletion is enabled
    pub load_balancers: StageCounts,
    pub security_groups: StageCounts,
    pub failed_target_groups: Vec<String>,
    pub failed_security_groups: Vec<String>,
    pub absence: AbsenceStatus,
    pub warnings: Vec<String>,
    #[serde(serialize_with = "serialize_fatal")]
    pub fatal: Option<TeardownError>,
    pub cancelled: bool,
}

impl TeardownOutcome {
    /// Empty ledger for a load balancer
    pub fn new(load_balancer: LoadBalancerRef) -> Self {
        Self {
            load_balancer,
            absent_at_start: false,
            listeners: StageCounts::default(),
            target_groups: StageCounts::default(),
            load_balancers: StageCounts::default(),
            security_groups: StageCounts::default(),
            failed_target_groups: Vec::new(),
            failed_security_groups: Vec::new(),
            absence: AbsenceStatus::NotChecked,
            warnings: Vec::new(),
            fatal: None,
            cancelled: false,
        }
    }

    /// Counts for a resource class
    pub fn counts(&self, kind: ResourceKind) -> &StageCounts {
        match kind {
            ResourceKind::Listener => &self.listeners,
            ResourceKind::TargetGroup => &self.target_groups,
            ResourceKind::LoadBalancer => &self.load_balancers,
            ResourceKind::SecurityGroup => &self.security_groups,
        }
    }

    /// Record a tolerable problem
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Turn the ledger into a `Result` for callers that abort on fatal
    /// outcomes and cancellation; warnings stay in the `Ok` value.
    pub fn into_result(self) -> Result<Self, TeardownError> {
        if let Some(err) = self.fatal {
            return Err(err);
        }
        if self.cancelled {
            return Err(TeardownError::Cancelled {
                load_balancer: self.load_balancer.name,
            });
        }
        Ok(self)
    }
}

fn serialize_fatal<S: Serializer>(
    fatal: &Option<TeardownError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match fatal {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}
