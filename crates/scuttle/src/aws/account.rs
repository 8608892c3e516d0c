//! AWS account validation and identity

use anyhow::{Context, Result};
use tracing::info;

/// Strongly-typed AWS account ID (12-digit string)
///
/// This newtype prevents accidentally mixing account IDs with other strings
/// and ensures account validation happens at specific points in the code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

impl AccountId {
    /// Create an AccountId for testing purposes
    #[cfg(test)]
    pub fn new(s: String) -> Self {
        AccountId(s)
    }
}

/// Identity snapshot captured at preflight and shown in the plan summary.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account: AccountId,
    pub arn: String,
}

/// Fetch the current AWS identity via STS GetCallerIdentity
///
/// This operation requires no special permissions - it always succeeds if
/// credentials are valid. Use this to validate credentials and capture the
/// account ID before any destructive call is made.
pub async fn get_caller_identity(config: &aws_config::SdkConfig) -> Result<CallerIdentity> {
    let sts = aws_sdk_sts::Client::new(config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;
    let arn = identity
        .arn()
        .context("No ARN returned from STS GetCallerIdentity")?;

    info!(account_id = %account, arn = %arn, "AWS identity validated");

    Ok(CallerIdentity {
        account: AccountId(account.to_string()),
        arn: arn.to_string(),
    })
}
