//! Cluster resource reaper
//!
//! Drains each resource class in dependency order: enumerate, issue
//! non-blocking deletes, poll the remaining count up to the class ceiling,
//! and only then escalate by stripping finalizers. The escalation is a
//! one-time step per class; an object surviving it becomes an error record.

use super::{ClusterOps, ObjectRef, ResourceClass, NODE_CLAIMS, TEARDOWN_CLASSES};
use crate::session::{ResourceRef, SessionContext};
use crate::wait::{poll_until_drained, PollConfig, WaitError};
use anyhow::Result;
use scuttle_common::defaults::{
    ESCALATION_GRACE_SECS, NODE_DRAIN_TIMEOUT_SECS, POLL_INTERVAL_SECS,
};
use tracing::{debug, info, warn};

pub(crate) const PHASE: &str = "cluster-reap";

/// Remove cluster-resident objects class by class.
///
/// Application-management objects go first so their controller cannot
/// recreate provisioning objects cleared later; provisioning objects go
/// before the provisioning controller itself is removed with the stacks,
/// because that controller performs the actual compute drain.
pub async fn reap_cluster<C: ClusterOps>(ctx: &mut SessionContext, cluster: &C) -> Result<()> {
    for class in TEARDOWN_CLASSES {
        drain_class(ctx, cluster, class).await;
        if class.name == NODE_CLAIMS.name {
            verify_nodes_terminated(ctx, cluster).await;
        }
    }
    Ok(())
}

async fn drain_class<C: ClusterOps>(
    ctx: &mut SessionContext,
    cluster: &C,
    class: &ResourceClass,
) {
    let objects = match cluster.list(class).await {
        Ok(Some(objects)) => objects,
        Ok(None) => {
            debug!(class = class.name, "Schema not installed, skipping class");
            return;
        }
        Err(e) => {
            ctx.record_error(PHASE, None, format!("failed to list {}: {e:#}", class.name));
            return;
        }
    };

    if objects.is_empty() {
        debug!(class = class.name, "Nothing to delete");
        return;
    }

    info!(
        class = class.name,
        count = objects.len(),
        "Deleting cluster objects"
    );
    for object in &objects {
        if ctx.dry_run {
            info!(class = class.name, object = %object, "[dry-run] would delete");
            continue;
        }
        if let Err(e) = cluster.delete(class, object).await {
            ctx.record_warning(
                PHASE,
                Some(object_ref(class, object)),
                format!("delete failed: {e:#}"),
            );
        }
    }
    if ctx.dry_run {
        return;
    }

    let config = PollConfig::new(POLL_INTERVAL_SECS, class.ceiling_secs);
    match poll_until_drained(config, || remaining(cluster, class), class.name).await {
        Ok(()) => info!(class = class.name, "Class drained"),
        Err(WaitError::Timeout { remaining, .. }) => {
            warn!(
                class = class.name,
                remaining, "Drain ceiling elapsed, stripping finalizers"
            );
            escalate(ctx, cluster, class).await;
        }
        Err(WaitError::Check(e)) => {
            ctx.record_error(PHASE, None, format!("failed to poll {}: {e:#}", class.name));
        }
    }
}

async fn remaining<C: ClusterOps>(cluster: &C, class: &ResourceClass) -> Result<usize> {
    Ok(cluster
        .list(class)
        .await?
        .map(|objects| objects.len())
        .unwrap_or(0))
}

/// One-time escalation after a class's ceiling elapsed: strip the finalizer
/// list of every surviving object and re-issue its delete. This unblocks
/// deletion when the owning controller is degraded or already gone.
async fn escalate<C: ClusterOps>(ctx: &mut SessionContext, cluster: &C, class: &ResourceClass) {
    let stuck = match cluster.list(class).await {
        Ok(Some(objects)) => objects,
        Ok(None) => return,
        Err(e) => {
            ctx.record_error(
                PHASE,
                None,
                format!("failed to list {} for escalation: {e:#}", class.name),
            );
            return;
        }
    };

    for object in &stuck {
        info!(class = class.name, object = %object, "Stripping finalizers");
        if let Err(e) = cluster.strip_finalizers(class, object).await {
            ctx.record_warning(
                PHASE,
                Some(object_ref(class, object)),
                format!("finalizer strip failed: {e:#}"),
            );
        }
        if let Err(e) = cluster.delete(class, object).await {
            ctx.record_warning(
                PHASE,
                Some(object_ref(class, object)),
                format!("delete after finalizer strip failed: {e:#}"),
            );
        }
    }

    let grace = PollConfig::new(POLL_INTERVAL_SECS, ESCALATION_GRACE_SECS);
    match poll_until_drained(grace, || remaining(cluster, class), class.name).await {
        Ok(()) => info!(class = class.name, "Class drained after finalizer strip"),
        Err(WaitError::Timeout { .. }) => match cluster.list(class).await {
            Ok(Some(survivors)) => {
                for object in survivors {
                    ctx.record_error(
                        PHASE,
                        Some(object_ref(class, &object)),
                        "object still present after finalizer strip",
                    );
                }
            }
            _ => {
                ctx.record_error(
                    PHASE,
                    None,
                    format!("{} objects still present after finalizer strip", class.name),
                );
            }
        },
        Err(WaitError::Check(e)) => {
            ctx.record_error(PHASE, None, format!("failed to poll {}: {e:#}", class.name));
        }
    }
}

/// Compute-node termination is verified two ways: the claim objects being
/// gone (drained above) and no nodes remaining with the provisioner's label,
/// because a degraded controller can leave an instance running after its
/// claim object is deleted.
async fn verify_nodes_terminated<C: ClusterOps>(ctx: &mut SessionContext, cluster: &C) {
    if ctx.dry_run {
        return;
    }

    let config = PollConfig::new(POLL_INTERVAL_SECS, NODE_DRAIN_TIMEOUT_SECS);
    let check = || async { Ok(cluster.list_managed_nodes().await?.len()) };
    match poll_until_drained(config, check, "provisioner-managed nodes").await {
        Ok(()) => info!("All provisioner-managed nodes are gone"),
        Err(WaitError::Timeout { remaining, .. }) => {
            let names = cluster.list_managed_nodes().await.unwrap_or_default();
            ctx.record_error(
                PHASE,
                None,
                format!(
                    "{remaining} provisioner-managed node(s) still present after claim cleanup: {}",
                    names.join(", ")
                ),
            );
        }
        Err(WaitError::Check(e)) => {
            ctx.record_error(
                PHASE,
                None,
                format!("failed to list provisioner-managed nodes: {e:#}"),
            );
        }
    }
}

fn object_ref(class: &ResourceClass, object: &ObjectRef) -> ResourceRef {
    ResourceRef::new(class.name, object.to_string())
}
