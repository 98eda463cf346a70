//! STS exchanges: caller identity and role assumption

use crate::aws::{AwsError, AwsResult};
use crate::error::{AccountContextError, Result};
use crate::types::TemporaryCredentials;
use async_trait::async_trait;
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::config::retry::RetryConfig;
use aws_sdk_sts::config::Region;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role::{AssumeRoleError, AssumeRoleOutput};
use aws_sdk_sts::types::Tag;
use aws_sdk_sts::Client as StsClient;
use aws_types::SdkConfig;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Identity of whoever holds the ambient credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

/// Look up the caller identity using STS GetCallerIdentity.
///
/// # Arguments
///
/// * `client` - STS client to use for the API call
pub async fn caller_identity(client: &StsClient) -> AwsResult<CallerIdentity> {
    let out = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| {
            AwsError::SdkError(format!(
                "STS GetCallerIdentity failed: {}",
                DisplayErrorContext(&e)
            ))
        })?;
    let account = out
        .account()
        .map(std::string::ToString::to_string)
        .ok_or_else(|| AwsError::SdkError("STS GetCallerIdentity missing Account".to_string()))?;
    Ok(CallerIdentity {
        account,
        arn: out.arn().unwrap_or_default().to_string(),
        user_id: out.user_id().unwrap_or_default().to_string(),
    })
}

/// Return the current caller account ID using STS GetCallerIdentity.
pub async fn caller_account_id(client: &StsClient) -> AwsResult<String> {
    Ok(caller_identity(client).await?.account)
}

/// A fully prepared AssumeRole call, plus the target it was made for so any
/// failure can name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub role_arn: String,
    pub session_name: String,
    pub duration: Duration,
    pub external_id: Option<String>,
    pub tags: Vec<(String, String)>,
}

/// How a failed exchange should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// STS refused: trust policy, permissions, caller credentials
    Rejected,
    /// Network, timeout, throttling or STS-side fault
    Transient,
}

impl AssumeRoleRequest {
    /// Build the error for a failed exchange of this request
    pub fn failure(
        &self,
        class: FailureClass,
        code: Option<String>,
        message: impl Into<String>,
    ) -> AccountContextError {
        let (account_id, region, service, role_arn, message) = (
            self.account_id.clone(),
            self.region.clone(),
            self.service.clone(),
            self.role_arn.clone(),
            message.into(),
        );
        match class {
            FailureClass::Rejected => AccountContextError::AssumeRole {
                account_id,
                region,
                service,
                role_arn,
                code,
                message,
            },
            FailureClass::Transient => AccountContextError::TransientService {
                account_id,
                region,
                service,
                role_arn,
                code,
                message,
            },
        }
    }
}

/// Exchanges the caller's identity for temporary role credentials.
///
/// Implementations make exactly one attempt per call; retry policy belongs to
/// whoever called the resolver.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<TemporaryCredentials>;
}

/// [`RoleAssumer`] backed by STS AssumeRole, signed with the ambient credentials
#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    base: SdkConfig,
}

impl StsRoleAssumer {
    pub fn new(base: SdkConfig) -> Self {
        Self { base }
    }

    /// STS client for the target region with SDK-level retries turned off
    fn client_for(&self, region: &str) -> StsClient {
        let config = aws_sdk_sts::config::Builder::from(&self.base)
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::disabled())
            .build();
        StsClient::from_conf(config)
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<TemporaryCredentials> {
        let client = self.client_for(&request.region);

        let tags = request
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AccountContextError::configuration(format!("invalid session tag: {e}")))?;

        let duration = i32::try_from(request.duration.as_secs()).map_err(|_| {
            AccountContextError::configuration(format!(
                "session duration {}s is too large",
                request.duration.as_secs()
            ))
        })?;

        let output = client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(duration)
            .set_external_id(request.external_id.clone())
            .set_tags((!tags.is_empty()).then_some(tags))
            .send()
            .await
            .map_err(|e| classify_sdk_error(request, &e))?;

        credentials_from_output(request, &output)
    }
}

/// Classify an STS error code
pub fn classify_error_code(code: Option<&str>) -> FailureClass {
    const TRANSIENT_CODES: &[&str] = &[
        "Throttling",
        "ThrottlingException",
        "RequestLimitExceeded",
        "TooManyRequestsException",
        "ServiceUnavailable",
        "ServiceUnavailableException",
        "InternalFailure",
        "InternalError",
        "RequestTimeout",
        "RequestTimeoutException",
        "IDPCommunicationError",
        "PriorRequestNotComplete",
    ];
    match code {
        Some(code) if TRANSIENT_CODES.contains(&code) => FailureClass::Transient,
        _ => FailureClass::Rejected,
    }
}

fn classify_sdk_error(
    request: &AssumeRoleRequest,
    err: &SdkError<AssumeRoleError, HttpResponse>,
) -> AccountContextError {
    let code = err.code().map(str::to_string);
    let class = match err {
        SdkError::TimeoutError(_) | SdkError::ResponseError(_) => FailureClass::Transient,
        SdkError::DispatchFailure(failure) if failure.is_io() || failure.is_timeout() => {
            FailureClass::Transient
        }
        SdkError::ServiceError(context) if context.raw().status().as_u16() >= 500 => {
            FailureClass::Transient
        }
        SdkError::ServiceError(_) => classify_error_code(code.as_deref()),
        // Construction and credential-resolution failures: the caller's own
        // identity is unusable, which retrying will not fix.
        _ => FailureClass::Rejected,
    };
    request.failure(class, code, DisplayErrorContext(err).to_string())
}

fn credentials_from_output(
    request: &AssumeRoleRequest,
    output: &AssumeRoleOutput,
) -> Result<TemporaryCredentials> {
    let credentials = output.credentials().ok_or_else(|| {
        request.failure(
            FailureClass::Rejected,
            None,
            "AssumeRole response is missing credentials",
        )
    })?;
    let user = output.assumed_role_user().ok_or_else(|| {
        request.failure(
            FailureClass::Rejected,
            None,
            "AssumeRole response is missing the assumed role user",
        )
    })?;
    let expiration = SystemTime::try_from(*credentials.expiration()).map_err(|e| {
        request.failure(
            FailureClass::Rejected,
            None,
            format!("AssumeRole returned an unusable expiration: {e}"),
        )
    })?;

    Ok(TemporaryCredentials {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiration,
        assumed_role_arn: user.arn().to_string(),
        assumed_role_id: user.assumed_role_id().to_string(),
    })
}
