//! Preflight validation
//!
//! Confirms identity, scope, and capability before anything destructive
//! happens. A credential failure is fatal; an unreachable cluster API only
//! degrades the cluster phases. The confirmation prompt requires the exact
//! environment name rather than y/N, so a destructive run cannot be approved
//! on reflex.

use crate::aws::account::get_caller_identity;
use crate::aws::AwsContext;
use crate::cluster::ClusterOps;
use crate::session::{SessionContext, UsageError};
use std::io::{self, Write};
use tracing::warn;

/// Validate credentials, probe the cluster, print the plan, and gate on the
/// typed confirmation. Returns a [`UsageError`] for anything fatal.
pub async fn run<C: ClusterOps>(
    ctx: &mut SessionContext,
    aws: &AwsContext,
    cluster: Option<&C>,
) -> Result<(), UsageError> {
    match get_caller_identity(aws.sdk_config()).await {
        Ok(identity) => ctx.identity = Some(identity),
        Err(e) => return Err(UsageError::Credentials(format!("{e:#}"))),
    }

    ctx.cluster_available = match cluster {
        Some(cluster) => match cluster.probe().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = ?e, "Cluster API unreachable; cluster phases will be skipped");
                false
            }
        },
        None => {
            warn!("No cluster client available; cluster phases will be skipped");
            false
        }
    };

    print_plan(ctx);

    if ctx.auto_approve || ctx.dry_run {
        return Ok(());
    }
    confirm(ctx.environment.as_str())
}

fn print_plan(ctx: &SessionContext) {
    println!();
    println!("Teardown plan for environment '{}'", ctx.environment);
    println!(
        "  Cluster:   {}{}",
        ctx.cluster_name,
        if ctx.cluster_available {
            ""
        } else {
            " (API unreachable, cluster phases skipped)"
        }
    );
    println!("  Region:    {}", ctx.region);
    if let Some(identity) = &ctx.identity {
        println!("  Account:   {}", identity.account);
        println!("  Identity:  {}", identity.arn);
    }
    if ctx.skip_stack_destroy {
        println!("  Stacks:    kept (--skip-stack-destroy)");
    } else {
        println!("  Stacks:    {}", ctx.environment.stack_names().join(", "));
    }
    if ctx.dry_run {
        println!("  Mode:      dry-run, no mutating calls");
    }
    println!(
        "  Started:   {}",
        ctx.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
}

fn confirm(environment: &str) -> Result<(), UsageError> {
    print!("Type '{environment}' to confirm teardown: ");
    io::stdout()
        .flush()
        .map_err(|e| UsageError::ConfirmationInput(e.to_string()))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| UsageError::ConfirmationInput(e.to_string()))?;

    if input.trim() == environment {
        Ok(())
    } else {
        Err(UsageError::ConfirmationMismatch(environment.to_string()))
    }
}
