//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` method
//! instead of string matching on Debug format. Deleting something that is
//! already gone is the normal case during teardown, so "not found" must be
//! cheap to detect everywhere.

use aws_sdk_ec2::error::ProvideErrorMetadata;
use thiserror::Error;

/// AWS error categories for teardown control flow
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (success for any delete)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Rate limit exceeded (transient; the phase's polling absorbs it)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Resource has dependent objects still attached
    #[error("Resource has dependent objects")]
    DependencyViolation,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this failure is transient (recorded as a warning, not an error)
    pub fn is_transient(&self) -> bool {
        matches!(self, AwsError::Throttled | AwsError::DependencyViolation)
    }
}

/// Known AWS error codes for "not found" / "already gone" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidAssociationID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidPermission.NotFound",
    "InvalidVpcID.NotFound",
    "InvalidVpcEndpointId.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidNetworkInterfaceID.NotFound",
    "InvalidVolume.NotFound",
    "NatGatewayNotFound",
    "Gateway.NotAttached",
    "NoSuchEntity",
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "ResourceInUse"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation,
        // CloudFormation reports a missing stack as a validation failure
        Some("ValidationError") if message.contains("does not exist") => {
            AwsError::NotFound { message }
        }
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an error from an anyhow::Error by extracting the AWS error code
/// from its debug representation. Works for any SDK operation without
/// per-operation downcasts.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    let debug_str = format!("{error:?}");
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Treat a "not found" SDK error as success, passing other errors through.
///
/// Returns `Ok(Some(output))` when the call succeeded and `Ok(None)` when the
/// resource was already gone.
pub fn ignore_not_found<T, E>(result: Result<T, E>) -> Result<Option<T>, E>
where
    E: ProvideErrorMetadata,
{
    match result {
        Ok(output) => Ok(Some(output)),
        Err(e) if classify_aws_error(e.code(), e.message()).is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in NOT_FOUND_CODES
        .iter()
        .chain(THROTTLING_CODES)
        .chain(DEPENDENCY_CODES)
    {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_transient(), "Expected transient for code: {code}");
            assert!(matches!(err, AwsError::Throttled));
        }
    }

    #[test]
    fn dependency_violation_is_transient() {
        let err = classify_aws_error(Some("DependencyViolation"), Some("ENI attached"));
        assert!(err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn missing_stack_is_not_found() {
        let err = classify_aws_error(
            Some("ValidationError"),
            Some("Stack with id atlas-dev-addons does not exist"),
        );
        assert!(err.is_not_found());

        let other = classify_aws_error(Some("ValidationError"), Some("Template format error"));
        assert!(!other.is_not_found());
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, AwsError::Sdk { .. }));

        let err2 = classify_aws_error(None, Some("something failed"));
        assert!(matches!(err2, AwsError::Sdk { code: None, .. }));
    }

    #[test]
    fn extract_code_from_debug_string() {
        let debug_str = r#"SdkError { code: Some("InvalidGroup.NotFound"), message: "fail" }"#;
        assert_eq!(
            extract_error_code(debug_str).as_deref(),
            Some("InvalidGroup.NotFound")
        );

        let unknown = r#"SdkError { code: Some("SomeRandomCode"), message: "fail" }"#;
        assert_eq!(extract_error_code(unknown).as_deref(), Some("SomeRandomCode"));

        assert!(extract_error_code("connection refused").is_none());
    }

    #[test]
    fn anyhow_classification_finds_embedded_codes() {
        let err = anyhow::anyhow!("service error: NatGatewayNotFound: nat-0123 is gone");
        assert!(classify_anyhow_error(&err).is_not_found());

        let err = anyhow::anyhow!("plain failure");
        assert!(matches!(
            classify_anyhow_error(&err),
            AwsError::Sdk { code: None, .. }
        ));
    }
}
