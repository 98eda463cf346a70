//! In-memory credential exchange for unit tests

use crate::aws::sts::{AssumeRoleRequest, FailureClass, RoleAssumer};
use crate::error::Result;
use crate::types::{AccountContext, CallerMetadata, TemporaryCredentials};
use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_types::region::Region;
use aws_types::SdkConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

pub(crate) const AMBIENT_ACCESS_KEY: &str = "AKIDAMBIENTCALLER";

#[derive(Debug, Clone, Copy)]
pub(crate) enum MockOutcome {
    Grant,
    Reject,
    Throttle,
    /// Grant, but report a session in an unrelated account
    WrongAccount,
}

#[derive(Debug)]
pub(crate) struct MockAssumer {
    outcome: MockOutcome,
    calls: AtomicUsize,
    requests: Mutex<Vec<AssumeRoleRequest>>,
}

impl MockAssumer {
    pub(crate) fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<AssumeRoleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleAssumer for MockAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<TemporaryCredentials> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let account_id = match self.outcome {
            MockOutcome::Reject => {
                return Err(request.failure(
                    FailureClass::Rejected,
                    Some("AccessDenied".to_string()),
                    "not authorized to perform: sts:AssumeRole",
                ))
            }
            MockOutcome::Throttle => {
                return Err(request.failure(
                    FailureClass::Transient,
                    Some("Throttling".to_string()),
                    "Rate exceeded",
                ))
            }
            MockOutcome::Grant => request.account_id.as_str(),
            MockOutcome::WrongAccount => "999999999999",
        };
        let role_name = request.role_arn.rsplit('/').next().unwrap_or_default();

        Ok(TemporaryCredentials {
            access_key_id: format!("ASIA{account_id}N{call}"),
            secret_access_key: format!("secret-{account_id}-{call}"),
            session_token: format!("token-{account_id}-{call}"),
            expiration: SystemTime::now() + Duration::from_secs(3600),
            assumed_role_arn: format!(
                "arn:aws:sts::{account_id}:assumed-role/{role_name}/{}",
                request.session_name
            ),
            assumed_role_id: format!("AROAEXAMPLE:{}", request.session_name),
        })
    }
}

/// SDK configuration holding the caller's own long-lived credentials
pub(crate) fn ambient_config() -> SdkConfig {
    SdkConfig::builder()
        .behavior_version(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
            AMBIENT_ACCESS_KEY,
            "ambient-secret",
            None,
            None,
            "ambient",
        )))
        .build()
}

pub(crate) fn context(account_id: &str, region: &str) -> AccountContext {
    AccountContext::new(
        account_id,
        region,
        CallerMetadata::new("local-test", "test-repo"),
    )
}
