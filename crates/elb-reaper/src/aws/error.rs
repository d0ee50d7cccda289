//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` method
//! instead of string matching on Debug format.

use thiserror::Error;

/// AWS error categories for retry and teardown logic
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// Resource was not found (benign during teardown)
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: &'static str,
        resource_id: String,
    },

    /// Resource already exists
    #[error("Resource already exists")]
    AlreadyExists,

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Resource has dependent objects (retryable, e.g., SG with attached ENI)
    #[error("Resource has dependent objects")]
    DependencyViolation,

    /// Resource is still referenced (retryable, e.g., target group behind a listener)
    #[error("Resource is in use")]
    ResourceInUse,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Build a not-found error for a specific resource
    pub fn not_found(resource_type: &'static str, resource_id: impl Into<String>) -> Self {
        AwsError::NotFound {
            resource_type,
            resource_id: resource_id.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled | AwsError::DependencyViolation | AwsError::ResourceInUse
        )
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists)
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "LoadBalancerNotFound",
    "ListenerNotFound",
    "TargetGroupNotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "DuplicateLoadBalancerName",
    "DuplicateListener",
    "DuplicateTargetGroupName",
    "InvalidGroup.Duplicate",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation"];

/// Known AWS error codes for resources still referenced by another object
const IN_USE_CODES: &[&str] = &["ResourceInUse"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_type: resource_type_for_code(c),
            resource_id: message,
        },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists,
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation,
        Some(c) if IN_USE_CODES.contains(&c) => AwsError::ResourceInUse,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

fn resource_type_for_code(code: &str) -> &'static str {
    match code {
        "LoadBalancerNotFound" => "load-balancer",
        "ListenerNotFound" => "listener",
        "TargetGroupNotFound" => "target-group",
        "InvalidGroup.NotFound" | "InvalidGroupId.NotFound" => "security-group",
        _ => "resource",
    }
}

/// Classify an error from an anyhow::Error by extracting the AWS error code.
///
/// Walks the error chain looking for an already-classified `AwsError`, then
/// for any SDK error exposing `ProvideErrorMetadata`. Falls back to string
/// matching on the Debug representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_elasticloadbalancingv2::error::ProvideErrorMetadata;
    use aws_sdk_elasticloadbalancingv2::operation as elb;

    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<AwsError>() {
            return e.clone();
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::describe_load_balancers::DescribeLoadBalancersError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::describe_listeners::DescribeListenersError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::delete_listener::DeleteListenerError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::describe_target_groups::DescribeTargetGroupsError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::delete_target_group::DeleteTargetGroupError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_elasticloadbalancingv2::error::SdkError<
            elb::delete_load_balancer::DeleteLoadBalancerError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::delete_security_group::DeleteSecurityGroupError,
        >>() {
            let meta = aws_sdk_ec2::error::ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
    }

    // Fallback: extract error code from debug string representation
    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Convert a `Result` into `Ok(None)` when the error is a "not found".
///
/// Any other error is passed through unchanged.
pub fn ignore_not_found<T>(result: anyhow::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if classify_anyhow_error(&e).is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// All known AWS error codes for extraction from debug strings (flat list)
const ALL_KNOWN_CODES: &[&[&str]] = &[
    NOT_FOUND_CODES,
    ALREADY_EXISTS_CODES,
    THROTTLING_CODES,
    DEPENDENCY_CODES,
    IN_USE_CODES,
];

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    // Longest match first so "ThrottlingException" wins over "Throttling"
    let mut known: Vec<&str> = ALL_KNOWN_CODES.iter().flat_map(|c| c.iter().copied()).collect();
    known.sort_by_key(|c| std::cmp::Reverse(c.len()));
    if let Some(code) = known.into_iter().find(|code| debug_str.contains(code)) {
        return Some(code.to_string());
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
