//! Cloud control-plane access for the teardown run
//!
//! This module provides wrappers around AWS SDK clients for:
//! - EC2: VPC graph sweep (endpoints, interfaces, groups, subnets, gateways)
//! - IAM: instance-profile detachment and deletion
//! - CloudFormation: declarative stack destruction
//! - ELBv2: orphaned load balancers and target groups
//! - STS: identity snapshot for preflight

pub mod account;
pub mod context;
pub mod error;
pub mod iam;
pub mod orphan;
pub mod stack;
pub mod vpc;

pub use account::{get_caller_identity, AccountId, CallerIdentity};
pub use context::AwsContext;
pub use error::{classify_anyhow_error, classify_aws_error, ignore_not_found, AwsError};

use crate::session::{ResourceRef, SessionContext};
use scuttle_common::ResourceKind;

/// Record a failed control-plane call against a phase. Throttling and
/// eventual-consistency failures are warnings; everything else is an error.
pub(crate) fn record_api_failure(
    ctx: &mut SessionContext,
    phase: &'static str,
    kind: ResourceKind,
    id: &str,
    err: &anyhow::Error,
) {
    let resource = Some(ResourceRef::new(kind.as_str(), id));
    if classify_anyhow_error(err).is_transient() {
        ctx.record_warning(phase, resource, format!("{err:#}"));
    } else {
        ctx.record_error(phase, resource, format!("{err:#}"));
    }
}
