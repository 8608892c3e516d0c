//! scuttle: graceful decommissioning of a compute environment
//!
//! Tears down the environment's cluster-resident objects, IAM instance
//! profiles, declarative stacks, and networking footprint, then audits for
//! orphaned resources. Every phase is best-effort; the exit code reports
//! whether anything was left behind.

use anyhow::Result;
use clap::Parser;
use scuttle::aws::iam::IamProfiles;
use scuttle::aws::orphan::AwsOrphanSweep;
use scuttle::aws::stack::CloudFormationStacks;
use scuttle::aws::vpc::Ec2Network;
use scuttle::aws::AwsContext;
use scuttle::cluster::KubeCluster;
use scuttle::config::TeardownConfig;
use scuttle::phases::{self, Providers};
use scuttle::preflight;
use scuttle::session::{SessionContext, EXIT_USAGE};
use scuttle_common::Environment;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "scuttle")]
#[command(about = "Graceful decommissioning of atlas compute environments")]
#[command(version)]
struct Args {
    /// Target environment to tear down
    #[arg(value_enum)]
    environment: Environment,

    /// AWS region holding the environment
    #[arg(long, default_value = "us-east-2")]
    region: String,

    /// Skip the typed confirmation prompt
    #[arg(long)]
    auto_approve: bool,

    /// Leave the declarative stacks in place; cluster-resident cleanup only
    #[arg(long)]
    skip_stack_destroy: bool,

    /// Log what would be deleted without issuing any mutating call
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(EXIT_USAGE);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config = TeardownConfig {
        environment: args.environment,
        region: args.region,
        auto_approve: args.auto_approve,
        skip_stack_destroy: args.skip_stack_destroy,
        dry_run: args.dry_run,
    };
    let mut ctx = SessionContext::new(&config);

    let aws = AwsContext::new(&config.region).await;
    let cluster = match KubeCluster::connect().await {
        Ok(cluster) => Some(cluster),
        Err(e) => {
            warn!(error = ?e, "Failed to build cluster client");
            None
        }
    };

    if let Err(e) = preflight::run(&mut ctx, &aws, cluster.as_ref()).await {
        print_error(&anyhow::Error::new(e));
        std::process::exit(EXIT_USAGE);
    }

    let providers = Providers {
        cluster,
        network: Ec2Network::from_context(&aws),
        stacks: CloudFormationStacks::from_context(&aws),
        profiles: IamProfiles::from_context(&aws),
        orphans: AwsOrphanSweep::from_context(&aws),
    };

    let report = phases::run_teardown(&mut ctx, &providers).await;
    println!("\n{report}");
    std::process::exit(report.exit_code());
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into())
        // Keep the AWS SDK and HTTP internals down to warnings
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?)
        .add_directive("aws_sdk_ec2=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?)
        .add_directive("kube_client=warn".parse()?);

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}
