//! Human and machine readable run reports

use crate::recreation::RecreationState;
use crate::teardown::{AbsenceStatus, TeardownOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use elb_reaper_common::{LoadBalancerRef, ResourceKind, ServiceRef};
use serde::Serialize;

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Verdict of a recreation check
#[derive(Debug, Clone, Serialize)]
pub struct RecreationVerdict {
    pub service: ServiceRef,
    pub old: LoadBalancerRef,
    #[serde(flatten)]
    pub state: RecreationState,
    /// Set when the check ended without confirmation
    pub error: Option<String>,
}

/// Everything one CLI invocation did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub teardown: Option<TeardownOutcome>,
    pub recreation: Option<RecreationVerdict>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            teardown: None,
            recreation: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Whether the run ended in a fatal teardown error, a cancellation or
    /// an unconfirmed recreation
    pub fn is_failure(&self) -> bool {
        let teardown_failed = self
            .teardown
            .as_ref()
            .is_some_and(|t| t.is_fatal() || t.cancelled);
        let recreation_failed = self
            .recreation
            .as_ref()
            .is_some_and(|r| !matches!(r.state, RecreationState::Confirmed(_)));
        teardown_failed || recreation_failed
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Table => Ok(self.render_table()),
        }
    }

    fn render_table(&self) -> String {
        let mut out = String::new();

        if let Some(teardown) = &self.teardown {
            out.push_str(&format!(
                "\n=== Teardown: {} ===\n\n",
                teardown.load_balancer
            ));

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Resource"),
                    Cell::new("Deleted"),
                    Cell::new("Already absent"),
                    Cell::new("Failed"),
                ]);
            for kind in ResourceKind::ALL {
                let counts = teardown.counts(kind);
                table.add_row(vec![
                    Cell::new(kind.as_str()),
                    Cell::new(counts.deleted),
                    Cell::new(counts.already_absent),
                    Cell::new(counts.failed),
                ]);
            }
            out.push_str(&format!("{table}\n"));

            let absence = match teardown.absence {
                AbsenceStatus::NotChecked => "not checked",
                AbsenceStatus::Confirmed if teardown.absent_at_start => "already gone at start",
                AbsenceStatus::Confirmed => "confirmed",
                AbsenceStatus::DeadlineExceeded => "deadline exceeded",
            };
            out.push_str(&format!("\nOld load balancer absence: {absence}\n"));

            if teardown.cancelled {
                out.push_str("Teardown was cancelled before all stages ran\n");
            }
            if let Some(fatal) = &teardown.fatal {
                out.push_str(&format!("FATAL: {fatal}\n"));
            }
            if teardown.has_warnings() {
                out.push_str(&format!("\nWarnings ({}):\n", teardown.warnings.len()));
                for warning in &teardown.warnings {
                    out.push_str(&format!("  - {warning}\n"));
                }
            }
        }

        if let Some(recreation) = &self.recreation {
            out.push_str(&format!("\n=== Recreation: {} ===\n\n", recreation.service));
            out.push_str(&format!("  Old load balancer: {}\n", recreation.old));
            match &recreation.state {
                RecreationState::Confirmed(lb) => {
                    out.push_str(&format!("  New load balancer: {lb}\n  Result: CONFIRMED\n"));
                }
                RecreationState::TimedOut => out.push_str("  Result: TIMED OUT\n"),
                RecreationState::WaitingNewLb => out.push_str("  Result: NOT CONFIRMED\n"),
            }
            if let Some(error) = &recreation.error {
                out.push_str(&format!("  Error: {error}\n"));
            }
        }

        if let Some(finished) = self.finished_at {
            let elapsed = finished - self.started_at;
            out.push_str(&format!(
                "\nStarted {} ({}s)\n",
                self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                elapsed.num_seconds()
            ));
        }

        out
    }
}
