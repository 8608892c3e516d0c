//! Ordered best-effort phase sequencer
//!
//! Phases run in a fixed order; a failure inside one phase becomes an error
//! record and the next phase still runs. The sequencer holds no
//! resource-specific logic: it only orders the phases and folds their
//! outcomes into the final report.

use crate::aws::iam::{self, ProfileOps};
use crate::aws::orphan::{self, OrphanOps};
use crate::aws::stack::{self, StackOps};
use crate::aws::vpc::{self, NetworkOps};
use crate::cluster::{reaper, ClusterOps};
use crate::session::{PhaseOutcome, SessionContext, TeardownReport};
use std::time::Instant;
use tracing::info;

/// The provider set one teardown run operates against. The cluster provider
/// is optional: building a client can fail outright when no cluster endpoint
/// is reachable, which degrades the cluster phase rather than the run.
pub struct Providers<C, N, S, P, O> {
    pub cluster: Option<C>,
    pub network: N,
    pub stacks: S,
    pub profiles: P,
    pub orphans: O,
}

/// Captures counters at phase start so the outcome can report deltas.
struct PhaseTimer {
    name: &'static str,
    errors_before: u64,
    warnings_before: u64,
    started: Instant,
}

impl PhaseTimer {
    fn start(ctx: &SessionContext, name: &'static str) -> Self {
        info!(phase = name, "Phase starting");
        Self {
            name,
            errors_before: ctx.error_count(),
            warnings_before: ctx.warning_count(),
            started: Instant::now(),
        }
    }

    fn finish(
        self,
        ctx: &mut SessionContext,
        result: anyhow::Result<()>,
        skipped: bool,
    ) -> PhaseOutcome {
        if let Err(e) = result {
            ctx.record_error(self.name, None, format!("phase failed: {e:#}"));
        }
        let outcome = PhaseOutcome {
            name: self.name,
            errors: ctx.error_count() - self.errors_before,
            warnings: ctx.warning_count() - self.warnings_before,
            duration: self.started.elapsed(),
            skipped,
        };
        info!(
            phase = self.name,
            errors = outcome.errors,
            warnings = outcome.warnings,
            skipped,
            "Phase finished"
        );
        outcome
    }
}

/// Run every teardown phase in order and produce the final report.
pub async fn run_teardown<C, N, S, P, O>(
    ctx: &mut SessionContext,
    providers: &Providers<C, N, S, P, O>,
) -> TeardownReport
where
    C: ClusterOps,
    N: NetworkOps,
    S: StackOps,
    P: ProfileOps,
    O: OrphanOps,
{
    let mut outcomes = Vec::new();

    {
        let timer = PhaseTimer::start(ctx, reaper::PHASE);
        match (&providers.cluster, ctx.cluster_available) {
            (Some(cluster), true) => {
                let result = reaper::reap_cluster(ctx, cluster).await;
                outcomes.push(timer.finish(ctx, result, false));
            }
            _ => {
                info!("Cluster API unavailable, skipping cluster teardown");
                outcomes.push(timer.finish(ctx, Ok(()), true));
            }
        }
    }

    {
        let timer = PhaseTimer::start(ctx, iam::PHASE);
        let result = iam::detach_instance_profiles(ctx, &providers.profiles).await;
        outcomes.push(timer.finish(ctx, result, false));
    }

    {
        let timer = PhaseTimer::start(ctx, stack::PHASE);
        if ctx.skip_stack_destroy {
            info!("Stack destruction skipped by flag");
            outcomes.push(timer.finish(ctx, Ok(()), true));
        } else {
            let result = stack::destroy_stacks(ctx, &providers.stacks).await;
            outcomes.push(timer.finish(ctx, result, false));
        }
    }

    {
        let timer = PhaseTimer::start(ctx, vpc::PHASE);
        let result = vpc::sweep_network(ctx, &providers.network).await;
        outcomes.push(timer.finish(ctx, result, false));
    }

    {
        let timer = PhaseTimer::start(ctx, orphan::PHASE);
        let result = orphan::audit_orphans(ctx, &providers.orphans).await;
        outcomes.push(timer.finish(ctx, result, false));
    }

    TeardownReport {
        environment: ctx.environment,
        errors: ctx.error_count(),
        warnings: ctx.warning_count(),
        elapsed: ctx.elapsed(),
        phases: outcomes,
        dry_run: ctx.dry_run,
    }
}
