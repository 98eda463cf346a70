//! AWS-facing building blocks: STS exchanges, ARN parsing, regions and the
//! service client registry.

pub mod principal;
pub mod region;
pub mod services;
pub mod sts;

use thiserror::Error;

/// Errors from plain AWS calls made outside a role assumption
#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS SDK error: {0}")]
    SdkError(String),
}

pub type AwsResult<T> = Result<T, AwsError>;

/// Error codes AWS services use when the calling identity lacks a permission
const AUTHORIZATION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "AuthorizationError",
    "UnauthorizedException",
];

/// Whether a service call failed because the (assumed) identity is not
/// permitted to perform it.
///
/// Service-level denials surface from the SDK client the resolver returned,
/// so they are never `AccountContextError`s; this lets callers report
/// "role lacks permission X" separately from a failed role assumption.
pub fn is_authorization_failure(code: Option<&str>, message: &str) -> bool {
    if code.is_some_and(|c| AUTHORIZATION_CODES.contains(&c)) {
        return true;
    }
    message.contains("AccessDenied") || message.contains("not authorized")
}
