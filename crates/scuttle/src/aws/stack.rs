//! Declarative stack destruction with retain-and-retry escalation
//!
//! Stacks are destroyed in strict reverse dependency order. When a stack
//! reports an unrecoverable delete failure, the specific blocking resources
//! are read from its event history and the delete is resubmitted with those
//! resources retained. That trades completeness for forward progress: the
//! survivors fall through to the network sweep and the orphan audit.

use crate::aws::context::AwsContext;
use crate::aws::error::ignore_not_found;
use crate::session::{ResourceRef, SessionContext};
use crate::wait::{poll_until_drained, PollConfig, WaitError};
use anyhow::{Context, Result};
use aws_sdk_cloudformation::types::{ResourceStatus, StackStatus};
use scuttle_common::defaults::{STACK_DELETE_TIMEOUT_SECS, STACK_POLL_INTERVAL_SECS};
use std::future::Future;
use tracing::{debug, info, warn};

pub(crate) const PHASE: &str = "stack-destroy";

/// Condensed stack state, as far as teardown cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    /// Any state outside the delete lifecycle (stack still standing)
    Other,
}

/// Trait for the declarative-stack operations the destroyer needs.
pub trait StackOps {
    /// Current state; `Ok(None)` when the stack does not exist.
    fn status(&self, name: &str) -> impl Future<Output = Result<Option<StackState>>> + Send;

    fn delete(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Resubmit deletion with the given logical resource ids retained.
    fn delete_retaining(
        &self,
        name: &str,
        resources: &[String],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Logical ids of resources that blocked the last delete attempt.
    fn failed_resources(&self, name: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Destroy every declarative stack of the environment, in order.
/// Failure on one stack never blocks an attempt on the next.
pub async fn destroy_stacks<S: StackOps>(ctx: &mut SessionContext, stacks: &S) -> Result<()> {
    for name in ctx.environment.stack_names() {
        destroy_stack(ctx, stacks, &name).await;
    }
    Ok(())
}

async fn destroy_stack<S: StackOps>(ctx: &mut SessionContext, stacks: &S, name: &str) {
    match stacks.status(name).await {
        Ok(None) => {
            debug!(stack = name, "Stack absent");
            return;
        }
        Ok(Some(_)) => {}
        Err(e) => {
            ctx.record_error(PHASE, Some(stack_ref(name)), format!("failed to describe stack: {e:#}"));
            return;
        }
    }

    if ctx.dry_run {
        info!(stack = name, "[dry-run] would delete stack");
        return;
    }

    info!(stack = name, "Deleting stack");
    if let Err(e) = stacks.delete(name).await {
        ctx.record_error(PHASE, Some(stack_ref(name)), format!("delete failed: {e:#}"));
        return;
    }

    match wait_terminal(stacks, name).await {
        Ok(StackOutcome::Gone) => info!(stack = name, "Stack deleted"),
        Ok(StackOutcome::Failed) => escalate_retained(ctx, stacks, name).await,
        Err(e) => {
            ctx.record_error(
                PHASE,
                Some(stack_ref(name)),
                format!("stack did not finish deleting: {e}"),
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackOutcome {
    Gone,
    Failed,
}

async fn wait_terminal<S: StackOps>(stacks: &S, name: &str) -> Result<StackOutcome, WaitError> {
    let config = PollConfig::new(STACK_POLL_INTERVAL_SECS, STACK_DELETE_TIMEOUT_SECS);
    poll_until_drained(
        config,
        || async {
            Ok(match stacks.status(name).await? {
                None | Some(StackState::DeleteComplete) | Some(StackState::DeleteFailed) => 0,
                Some(_) => 1,
            })
        },
        name,
    )
    .await?;

    match stacks.status(name).await.map_err(WaitError::Check)? {
        Some(StackState::DeleteFailed) => Ok(StackOutcome::Failed),
        _ => Ok(StackOutcome::Gone),
    }
}

async fn escalate_retained<S: StackOps>(ctx: &mut SessionContext, stacks: &S, name: &str) {
    let blocking = match stacks.failed_resources(name).await {
        Ok(ids) => ids,
        Err(e) => {
            ctx.record_error(
                PHASE,
                Some(stack_ref(name)),
                format!("delete failed and the event history was unreadable: {e:#}"),
            );
            return;
        }
    };

    if blocking.is_empty() {
        ctx.record_error(
            PHASE,
            Some(stack_ref(name)),
            "delete failed with no identifiable blocking resources",
        );
        return;
    }

    warn!(
        stack = name,
        retained = ?blocking,
        "Retrying stack delete with blocking resources retained"
    );
    if let Err(e) = stacks.delete_retaining(name, &blocking).await {
        ctx.record_error(
            PHASE,
            Some(stack_ref(name)),
            format!("retained delete failed: {e:#}"),
        );
        return;
    }

    match wait_terminal(stacks, name).await {
        Ok(StackOutcome::Gone) => {
            info!(
                stack = name,
                retained = ?blocking,
                "Stack deleted; retained resources fall through to the orphan audit"
            );
        }
        Ok(StackOutcome::Failed) => {
            ctx.record_error(
                PHASE,
                Some(stack_ref(name)),
                "delete failed even with blocking resources retained",
            );
        }
        Err(e) => {
            ctx.record_error(
                PHASE,
                Some(stack_ref(name)),
                format!("retained delete did not finish: {e}"),
            );
        }
    }
}

fn stack_ref(name: &str) -> ResourceRef {
    ResourceRef::new("stack", name)
}

/// Production stack access over the CloudFormation SDK client.
pub struct CloudFormationStacks {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationStacks {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudformation_client(),
        }
    }
}

impl StackOps for CloudFormationStacks {
    async fn status(&self, name: &str) -> Result<Option<StackState>> {
        let response = ignore_not_found(
            self.client
                .describe_stacks()
                .stack_name(name)
                .send()
                .await,
        )
        .context("Failed to describe stack")?;

        let Some(response) = response else {
            return Ok(None);
        };

        Ok(response
            .stacks()
            .first()
            .and_then(|stack| stack.stack_status())
            .map(|status| match status {
                StackStatus::DeleteInProgress => StackState::DeleteInProgress,
                StackStatus::DeleteFailed => StackState::DeleteFailed,
                StackStatus::DeleteComplete => StackState::DeleteComplete,
                _ => StackState::Other,
            }))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .context("Failed to submit stack deletion")?;
        Ok(())
    }

    async fn delete_retaining(&self, name: &str, resources: &[String]) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .set_retain_resources(Some(resources.to_vec()))
            .send()
            .await
            .context("Failed to submit retained stack deletion")?;
        Ok(())
    }

    async fn failed_resources(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_stack_events()
            .stack_name(name)
            .send()
            .await
            .context("Failed to describe stack events")?;

        // Most recent events come first; the current attempt's failures are
        // in the first page.
        let mut ids = Vec::new();
        for event in response.stack_events() {
            if event.resource_status() != Some(&ResourceStatus::DeleteFailed) {
                continue;
            }
            if event.resource_type() == Some("AWS::CloudFormation::Stack") {
                continue;
            }
            if let Some(id) = event.logical_resource_id() {
                if !ids.iter().any(|seen: &String| seen == id) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }
}
