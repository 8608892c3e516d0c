//! Threaded run state and the final report
//!
//! All mutable run state (error records, the monotonic counter, the elapsed
//! timer) lives on [`SessionContext`], created once and passed into every
//! phase. Nothing is ambient or global; a phase can only report through the
//! context it was handed.

use crate::aws::account::CallerIdentity;
use crate::config::TeardownConfig;
use chrono::{DateTime, Utc};
use scuttle_common::Environment;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, warn};

/// Process exit code for a clean run (warnings allowed).
pub const EXIT_OK: i32 = 0;
/// Process exit code when one or more phases recorded an error.
pub const EXIT_ERRORS: i32 = 1;
/// Process exit code for usage and precondition failures, pre-mutation.
pub const EXIT_USAGE: i32 = 2;

/// Fatal pre-mutation failures.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("failed to validate cloud credentials: {0}")]
    Credentials(String),

    #[error("teardown declined: input did not match environment name '{0}'")]
    ConfirmationMismatch(String),

    #[error("failed to read confirmation input: {0}")]
    ConfirmationInput(String),
}

/// How bad a recorded failure is. Only `Error` affects the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// The resource a record is about, when one is identifiable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}

/// One recorded failure. Append-only; records are never removed or edited.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub phase: &'static str,
    pub resource: Option<ResourceRef>,
    pub message: String,
    pub severity: Severity,
}

/// Run state threaded through every phase.
#[derive(Debug)]
pub struct SessionContext {
    pub environment: Environment,
    pub region: String,
    pub cluster_name: String,
    pub dry_run: bool,
    pub auto_approve: bool,
    pub skip_stack_destroy: bool,
    /// Whether the cluster API answered the preflight probe. Cleared, not
    /// fatal, when unreachable; cluster phases then no-op.
    pub cluster_available: bool,
    /// Account/identity snapshot captured during preflight.
    pub identity: Option<CallerIdentity>,
    /// Wall-clock start, shown in the plan summary.
    pub started_at: DateTime<Utc>,
    started: Instant,
    records: Vec<ErrorRecord>,
    errors: u64,
    warnings: u64,
}

impl SessionContext {
    pub fn new(config: &TeardownConfig) -> Self {
        Self {
            environment: config.environment,
            region: config.region.clone(),
            cluster_name: config.cluster_name(),
            dry_run: config.dry_run,
            auto_approve: config.auto_approve,
            skip_stack_destroy: config.skip_stack_destroy,
            cluster_available: true,
            identity: None,
            started_at: Utc::now(),
            started: Instant::now(),
            records: Vec::new(),
            errors: 0,
            warnings: 0,
        }
    }

    /// Record an error against a phase. In dry-run mode nothing can actually
    /// fail to delete, so the record is downgraded to a warning and the run
    /// still exits zero.
    pub fn record_error(
        &mut self,
        phase: &'static str,
        resource: Option<ResourceRef>,
        message: impl Into<String>,
    ) {
        let message = message.into();
        if self.dry_run {
            self.push(phase, resource, message, Severity::Warning);
        } else {
            self.push(phase, resource, message, Severity::Error);
        }
    }

    pub fn record_warning(
        &mut self,
        phase: &'static str,
        resource: Option<ResourceRef>,
        message: impl Into<String>,
    ) {
        self.push(phase, resource, message.into(), Severity::Warning);
    }

    fn push(
        &mut self,
        phase: &'static str,
        resource: Option<ResourceRef>,
        message: String,
        severity: Severity,
    ) {
        match severity {
            Severity::Error => {
                self.errors += 1;
                error!(phase, resource = ?resource.as_ref().map(ToString::to_string), %message, "Recorded error");
            }
            Severity::Warning => {
                self.warnings += 1;
                warn!(phase, resource = ?resource.as_ref().map(ToString::to_string), %message, "Recorded warning");
            }
        }
        self.records.push(ErrorRecord {
            phase,
            resource,
            message,
            severity,
        });
    }

    /// Monotonic error count; never decremented.
    pub fn error_count(&self) -> u64 {
        self.errors
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Outcome of one phase, as aggregated by the sequencer.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub name: &'static str,
    pub errors: u64,
    pub warnings: u64,
    pub duration: Duration,
    pub skipped: bool,
}

/// Final result of the whole run.
#[derive(Debug)]
pub struct TeardownReport {
    pub environment: Environment,
    pub errors: u64,
    pub warnings: u64,
    pub elapsed: Duration,
    pub phases: Vec<PhaseOutcome>,
    pub dry_run: bool,
}

impl TeardownReport {
    /// Exit code contract: non-zero iff at least one error was recorded.
    pub fn exit_code(&self) -> i32 {
        if self.errors > 0 {
            EXIT_ERRORS
        } else {
            EXIT_OK
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = 52;
        writeln!(f, "┌{}┐", "─".repeat(width))?;
        let mode = if self.dry_run { " (dry-run)" } else { "" };
        writeln!(
            f,
            "│ {:<w$} │",
            format!("Teardown summary: {}{}", self.environment, mode),
            w = width - 2
        )?;
        writeln!(f, "├{}┤", "─".repeat(width))?;
        for phase in &self.phases {
            let status = if phase.skipped {
                "skipped".to_string()
            } else if phase.errors > 0 {
                format!("{} error(s)", phase.errors)
            } else if phase.warnings > 0 {
                format!("ok, {} warning(s)", phase.warnings)
            } else {
                "ok".to_string()
            };
            writeln!(
                f,
                "│ {:<22}{:>28} │",
                phase.name,
                format!("{} [{}s]", status, phase.duration.as_secs())
            )?;
        }
        writeln!(f, "├{}┤", "─".repeat(width))?;
        writeln!(
            f,
            "│ {:<w$} │",
            format!(
                "{} error(s), {} warning(s) in {}s",
                self.errors,
                self.warnings,
                self.elapsed.as_secs()
            ),
            w = width - 2
        )?;
        write!(f, "└{}┘", "─".repeat(width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_config;

    #[test]
    fn error_counter_is_monotonic() {
        let mut ctx = SessionContext::new(&test_config(false));
        assert_eq!(ctx.error_count(), 0);
        ctx.record_error("cluster-reap", None, "first");
        ctx.record_warning("cluster-reap", None, "not counted");
        ctx.record_error(
            "network-sweep",
            Some(ResourceRef::new("subnet", "subnet-1")),
            "second",
        );
        assert_eq!(ctx.error_count(), 2);
        assert_eq!(ctx.warning_count(), 1);
        assert_eq!(ctx.records().len(), 3);
    }

    #[test]
    fn dry_run_downgrades_errors_to_warnings() {
        let mut ctx = SessionContext::new(&test_config(true));
        ctx.record_error("network-sweep", None, "would have failed");
        assert_eq!(ctx.error_count(), 0);
        assert_eq!(ctx.warning_count(), 1);
    }

    #[test]
    fn exit_code_follows_error_count() {
        let report = TeardownReport {
            environment: scuttle_common::Environment::Dev,
            errors: 0,
            warnings: 3,
            elapsed: Duration::from_secs(12),
            phases: Vec::new(),
            dry_run: false,
        };
        assert_eq!(report.exit_code(), EXIT_OK);

        let report = TeardownReport {
            errors: 1,
            ..report
        };
        assert_eq!(report.exit_code(), EXIT_ERRORS);
    }
}
