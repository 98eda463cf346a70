//! Error types for account-scoped client resolution

use crate::aws::AwsError;
use thiserror::Error;

/// Main error type for account context resolution
///
/// Every variant that involves a role assumption names the account, region,
/// service and role it was attempting so operators can tell a trust-policy
/// gap from a permissions gap without re-running with debug logging.
#[derive(Error, Debug)]
pub enum AccountContextError {
    /// Caller mistake: malformed context, unsupported service or invalid
    /// resolver configuration. Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// STS rejected the role assumption. Not retryable without operator
    /// intervention.
    #[error(
        "AssumeRole of {role_arn} for service '{service}' in account {account_id} ({region}) was rejected{}: {message}",
        code_suffix(.code)
    )]
    AssumeRole {
        account_id: String,
        region: String,
        service: String,
        role_arn: String,
        code: Option<String>,
        message: String,
    },

    /// Network, timeout or throttling failure talking to STS. The caller
    /// decides whether and how to retry.
    #[error(
        "Transient STS failure assuming {role_arn} for service '{service}' in account {account_id} ({region}){}: {message}",
        code_suffix(.code)
    )]
    TransientService {
        account_id: String,
        region: String,
        service: String,
        role_arn: String,
        code: Option<String>,
        message: String,
    },

    #[error("AWS operation failed: {0}")]
    Aws(#[from] AwsError),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default()
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AccountContextError>;

impl AccountContextError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether a caller may reasonably retry the failed resolution
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientService { .. })
    }

    /// STS error code attached to the failure, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::AssumeRole { code, .. } | Self::TransientService { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Account the failed resolution targeted, if the failure got that far
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::AssumeRole { account_id, .. } | Self::TransientService { account_id, .. } => {
                Some(account_id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assume_role_error(code: Option<&str>) -> AccountContextError {
        AccountContextError::AssumeRole {
            account_id: "111122223333".to_string(),
            region: "us-east-1".to_string(),
            service: "ecs".to_string(),
            role_arn: "arn:aws:iam::111122223333:role/McpReadOnlyRole".to_string(),
            code: code.map(str::to_string),
            message: "not authorized to perform: sts:AssumeRole".to_string(),
        }
    }

    #[test]
    fn test_configuration_error_creation() {
        let error = AccountContextError::configuration("account_id must not be empty");
        assert_eq!(
            error.to_string(),
            "Configuration error: account_id must not be empty"
        );
        assert!(!error.is_retryable());
        assert!(error.account_id().is_none());
    }

    #[test]
    fn test_assume_role_error_names_target() {
        let error = assume_role_error(Some("AccessDenied"));
        let text = error.to_string();
        assert!(text.contains("111122223333"));
        assert!(text.contains("us-east-1"));
        assert!(text.contains("'ecs'"));
        assert!(text.contains("McpReadOnlyRole"));
        assert!(text.contains("[AccessDenied]"));
        assert_eq!(error.code(), Some("AccessDenied"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_assume_role_error_without_code() {
        let text = assume_role_error(None).to_string();
        assert!(text.contains("was rejected: not authorized"));
    }

    #[test]
    fn test_transient_error_is_retryable() {
        let error = AccountContextError::TransientService {
            account_id: "111122223333".to_string(),
            region: "us-west-2".to_string(),
            service: "cloudformation".to_string(),
            role_arn: "arn:aws:iam::111122223333:role/McpReadOnlyRole".to_string(),
            code: Some("Throttling".to_string()),
            message: "Rate exceeded".to_string(),
        };
        assert!(error.is_retryable());
        assert_eq!(error.account_id(), Some("111122223333"));
        assert!(error.to_string().contains("us-west-2"));
    }

    #[test]
    fn test_aws_error_conversion() {
        let aws_error = AwsError::SdkError("STS GetCallerIdentity missing Account".to_string());
        let error = AccountContextError::from(aws_error);
        assert!(error.to_string().contains("AWS operation failed"));
    }
}
