//! Account-scoped client resolution
//!
//! [`Resolver`] turns an [`AccountContext`] into SDK configuration whose only
//! credentials are temporary credentials for the configured role in the
//! target account. Nothing is cached: every call performs its own STS
//! exchange, so concurrent callers targeting different accounts never share
//! state.

use crate::aws::principal::parse_principal_arn;
use crate::aws::services::ServiceClient;
use crate::aws::sts::{AssumeRoleRequest, FailureClass, RoleAssumer, StsRoleAssumer};
use crate::config::ResolverConfig;
use crate::error::{AccountContextError, Result};
use crate::types::{AccountContext, AssumedIdentity, CallerMetadata, TemporaryCredentials};
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::{debug, info, warn};
use regex::Regex;
use std::ops::Deref;
use std::sync::OnceLock;
use std::time::SystemTime;

/// STS RoleSessionName limit
const MAX_SESSION_NAME_LEN: usize = 64;
/// STS session tag value limit
const MAX_TAG_VALUE_LEN: usize = 256;
/// Provider name recorded on the credentials handed to scoped clients
const CREDENTIALS_PROVIDER_NAME: &str = "platform-aws-context";

pub const SESSION_TAG_ACTOR: &str = "actor";
pub const SESSION_TAG_REPO: &str = "repo";

/// Resolves account contexts into scoped SDK configuration and clients
#[derive(Debug)]
pub struct Resolver<A = StsRoleAssumer> {
    config: ResolverConfig,
    base: SdkConfig,
    assumer: A,
}

impl Resolver<StsRoleAssumer> {
    /// Resolver that signs AssumeRole calls with the credentials in `base`
    pub fn new(config: ResolverConfig, base: SdkConfig) -> Result<Self> {
        let assumer = StsRoleAssumer::new(base.clone());
        Self::with_assumer(config, base, assumer)
    }

    /// Resolver configured from the environment, using the default AWS
    /// credential provider chain for the calling identity
    pub async fn from_env() -> Result<Self> {
        let config = ResolverConfig::from_env()?;
        let base = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(config, base)
    }
}

impl<A: RoleAssumer> Resolver<A> {
    /// Resolver with a custom credential exchange.
    ///
    /// `base` supplies transport, timeout and endpoint settings for the
    /// clients built from resolved contexts. Its credentials are never used
    /// by those clients.
    pub fn with_assumer(config: ResolverConfig, base: SdkConfig, assumer: A) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            base,
            assumer,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn assumer(&self) -> &A {
        &self.assumer
    }

    /// Check a resolution request without contacting AWS
    pub fn validate_request(&self, service: &str, context: &AccountContext) -> Result<()> {
        if service.is_empty() {
            return Err(AccountContextError::configuration(
                "service name must not be empty",
            ));
        }
        if !self.config.supports_service(service) {
            let supported: Vec<&str> = self
                .config
                .supported_services
                .iter()
                .map(String::as_str)
                .collect();
            return Err(AccountContextError::configuration(format!(
                "service '{service}' is not supported (supported: {})",
                supported.join(", ")
            )));
        }
        context.validate()
    }

    /// Assume the configured role in the context's account and return SDK
    /// configuration carrying only the resulting temporary credentials.
    ///
    /// Failures are returned as-is: no retry, no fallback to the calling
    /// identity.
    pub async fn resolve_config(&self, service: &str, context: AccountContext) -> Result<ScopedConfig> {
        self.validate_request(service, &context)?;

        let request = self.build_request(service, &context);
        let metadata = context.metadata();
        info!(
            "Assuming {} for service '{}' in account {} ({}) on behalf of actor '{}' from repo '{}'",
            request.role_arn,
            service,
            context.account_id(),
            context.region(),
            metadata.actor,
            metadata.repo
        );

        let credentials = match self.assumer.assume_role(&request).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("{e}");
                return Err(e);
            }
        };

        self.verify_identity(&request, &credentials)?;
        debug!(
            "Assumed {} for account {} (expires {:?})",
            credentials.assumed_role_arn,
            context.account_id(),
            credentials.expiration
        );

        let identity = AssumedIdentity {
            role_arn: request.role_arn,
            assumed_role_arn: credentials.assumed_role_arn.clone(),
            assumed_role_id: credentials.assumed_role_id.clone(),
        };
        let expires_at = credentials.expiration;
        let sdk_config = self.scoped_sdk_config(context.region(), credentials);

        Ok(ScopedConfig {
            sdk_config,
            service: service.to_string(),
            context,
            identity,
            expires_at,
        })
    }

    /// Typed form of [`resolve_config`](Self::resolve_config): the service
    /// name comes from `C`.
    pub async fn resolve_client<C: ServiceClient>(
        &self,
        context: AccountContext,
    ) -> Result<ScopedClient<C>> {
        Ok(self.resolve_config(C::SERVICE, context).await?.into_client())
    }

    fn build_request(&self, service: &str, context: &AccountContext) -> AssumeRoleRequest {
        let tags = if self.config.tag_session {
            session_tags(context.metadata())
        } else {
            Vec::new()
        };
        AssumeRoleRequest {
            account_id: context.account_id().to_string(),
            region: context.region().to_string(),
            service: service.to_string(),
            role_arn: self.config.role_arn(context.account_id(), context.region()),
            session_name: role_session_name(&self.config.session_prefix, &context.metadata().actor),
            duration: self.config.session_duration,
            external_id: self.config.external_id.clone(),
            tags,
        }
    }

    /// The session STS handed back must belong to the requested role in the
    /// requested account.
    fn verify_identity(
        &self,
        request: &AssumeRoleRequest,
        credentials: &TemporaryCredentials,
    ) -> Result<()> {
        let principal = parse_principal_arn(&credentials.assumed_role_arn).map_err(|e| {
            request.failure(
                FailureClass::Rejected,
                None,
                format!(
                    "unrecognised assumed role ARN '{}': {e}",
                    credentials.assumed_role_arn
                ),
            )
        })?;
        if !principal.is_session_of(&request.account_id, &self.config.role_name) {
            return Err(request.failure(
                FailureClass::Rejected,
                None,
                format!(
                    "STS returned a session for '{}', not {} in account {}",
                    credentials.assumed_role_arn, self.config.role_name, request.account_id
                ),
            ));
        }
        Ok(())
    }

    fn scoped_sdk_config(&self, region: &str, credentials: TemporaryCredentials) -> SdkConfig {
        let provider = Credentials::new(
            credentials.access_key_id,
            credentials.secret_access_key,
            Some(credentials.session_token),
            Some(credentials.expiration),
            CREDENTIALS_PROVIDER_NAME,
        );
        self.base
            .to_builder()
            .region(Region::new(region.to_string()))
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .build()
    }
}

/// SDK configuration scoped to one account, region and assumed role
#[derive(Debug, Clone)]
pub struct ScopedConfig {
    sdk_config: SdkConfig,
    service: String,
    context: AccountContext,
    identity: AssumedIdentity,
    expires_at: SystemTime,
}

impl ScopedConfig {
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    /// Service this configuration was resolved for
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn context(&self) -> &AccountContext {
        &self.context
    }

    pub fn identity(&self) -> &AssumedIdentity {
        &self.identity
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Build the SDK client for `C` from this configuration
    pub fn into_client<C: ServiceClient>(self) -> ScopedClient<C> {
        ScopedClient {
            client: C::from_sdk_config(&self.sdk_config),
            context: self.context,
            identity: self.identity,
            expires_at: self.expires_at,
        }
    }
}

/// An SDK client whose every call runs as the assumed role.
///
/// Dereferences to the SDK client. Valid until the underlying credentials
/// expire; long-lived holders should resolve again before then.
#[derive(Debug, Clone)]
pub struct ScopedClient<C> {
    client: C,
    context: AccountContext,
    identity: AssumedIdentity,
    expires_at: SystemTime,
}

impl<C> ScopedClient<C> {
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    pub fn context(&self) -> &AccountContext {
        &self.context
    }

    pub fn identity(&self) -> &AssumedIdentity {
        &self.identity
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

impl<C> Deref for ScopedClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

fn sanitize_regex() -> &'static Regex {
    static SANITIZE_REGEX: OnceLock<Regex> = OnceLock::new();
    SANITIZE_REGEX.get_or_init(|| {
        Regex::new(r"[^a-zA-Z0-9+=,.@_-]+").expect("Valid regex pattern for session names")
    })
}

fn tag_value_regex() -> &'static Regex {
    static TAG_VALUE_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_VALUE_REGEX.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{Z}\p{N}_.:/=+@-]+").expect("Valid regex pattern for tag values")
    })
}

/// STS role session name: `{prefix}-{actor}`, restricted to the characters
/// STS accepts and truncated to 64 characters.
pub fn role_session_name(prefix: &str, actor: &str) -> String {
    let actor = sanitize_regex().replace_all(actor, "-");
    let actor = actor.trim_matches('-');
    let actor = if actor.is_empty() { "unknown" } else { actor };
    let name: String = format!("{prefix}-{actor}")
        .chars()
        .take(MAX_SESSION_NAME_LEN)
        .collect();
    name.trim_end_matches('-').to_string()
}

/// Session tags carrying the caller metadata; empty values are skipped
pub fn session_tags(metadata: &CallerMetadata) -> Vec<(String, String)> {
    [
        (SESSION_TAG_ACTOR, metadata.actor.as_str()),
        (SESSION_TAG_REPO, metadata.repo.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| {
        let value: String = tag_value_regex()
            .replace_all(value, "-")
            .chars()
            .take(MAX_TAG_VALUE_LEN)
            .collect();
        (key.to_string(), value)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ambient_config, context, MockAssumer, MockOutcome, AMBIENT_ACCESS_KEY};
    use aws_credential_types::provider::ProvideCredentials;
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver(outcome: MockOutcome) -> Resolver<MockAssumer> {
        resolver_with(ResolverConfig::default(), outcome)
    }

    fn resolver_with(config: ResolverConfig, outcome: MockOutcome) -> Resolver<MockAssumer> {
        Resolver::with_assumer(config, ambient_config(), MockAssumer::new(outcome)).unwrap()
    }

    async fn access_key(scoped: &ScopedConfig) -> String {
        scoped
            .sdk_config()
            .credentials_provider()
            .expect("scoped config must carry credentials")
            .provide_credentials()
            .await
            .unwrap()
            .access_key_id()
            .to_string()
    }

    #[tokio::test]
    async fn test_resolve_cloudformation_scenario() {
        let resolver = resolver(MockOutcome::Grant);
        let scoped = resolver
            .resolve_config("cloudformation", context("111122223333", "us-east-1"))
            .await
            .unwrap();

        assert_eq!(scoped.service(), "cloudformation");
        assert_eq!(scoped.context().account_id(), "111122223333");
        assert_eq!(
            scoped.sdk_config().region().map(ToString::to_string),
            Some("us-east-1".to_string())
        );
        assert_eq!(
            scoped.identity().role_arn,
            "arn:aws:iam::111122223333:role/McpReadOnlyRole"
        );
        assert!(scoped
            .identity()
            .assumed_role_arn
            .starts_with("arn:aws:sts::111122223333:assumed-role/McpReadOnlyRole/"));
        assert!(!scoped.is_expired());
        assert_eq!(resolver.assumer.calls(), 1);
    }

    #[tokio::test]
    async fn test_scoped_config_never_carries_ambient_credentials() {
        let resolver = resolver(MockOutcome::Grant);
        let scoped = resolver
            .resolve_config("ecs", context("111122223333", "us-east-1"))
            .await
            .unwrap();
        let key = access_key(&scoped).await;
        assert_ne!(key, AMBIENT_ACCESS_KEY);
        assert!(key.contains("111122223333"));
    }

    #[tokio::test]
    async fn test_resolve_typed_client() {
        let resolver = resolver(MockOutcome::Grant);
        let ecs = resolver
            .resolve_client::<aws_sdk_ecs::Client>(context("111122223333", "us-west-2"))
            .await
            .unwrap();
        assert_eq!(
            ecs.config().region().map(ToString::to_string),
            Some("us-west-2".to_string())
        );
        assert_eq!(ecs.context().region(), "us-west-2");
        assert_eq!(resolver.assumer.requests()[0].service, "ecs");
    }

    #[tokio::test]
    async fn test_empty_account_id_fails_without_network() {
        let resolver = resolver(MockOutcome::Grant);
        let err = resolver
            .resolve_config("cloudformation", context("", "us-east-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountContextError::Configuration(_)));
        assert_eq!(resolver.assumer.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_region_fails_without_network() {
        let resolver = resolver(MockOutcome::Grant);
        let err = resolver
            .resolve_config("ecs", context("111122223333", "us_east_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountContextError::Configuration(_)));
        assert_eq!(resolver.assumer.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_service_fails_without_network() {
        let resolver = resolver(MockOutcome::Grant);
        let err = resolver
            .resolve_config("s3", context("111122223333", "us-east-1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'s3' is not supported"));
        assert_eq!(resolver.assumer.calls(), 0);

        let err = resolver
            .resolve_config("", context("111122223333", "us-east-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountContextError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_typed_client_requires_registration() {
        let mut config = ResolverConfig::default();
        config.supported_services.retain(|s| s == "cloudformation");
        let resolver = resolver_with(config, MockOutcome::Grant);
        let result = resolver
            .resolve_client::<aws_sdk_ecs::Client>(context("111122223333", "us-east-1"))
            .await;
        assert!(matches!(result, Err(AccountContextError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_rejected_assumption_is_not_retried() {
        let resolver = resolver(MockOutcome::Reject);
        let err = resolver
            .resolve_config("ecs", context("111122223333", "us-east-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountContextError::AssumeRole { .. }));
        assert_eq!(err.code(), Some("AccessDenied"));
        assert!(!err.is_retryable());
        assert_eq!(resolver.assumer.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_surfaced_once() {
        let resolver = resolver(MockOutcome::Throttle);
        let err = resolver
            .resolve_config("cloudtrail", context("111122223333", "us-east-1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("cloudtrail"));
        assert_eq!(resolver.assumer.calls(), 1);
    }

    #[tokio::test]
    async fn test_session_in_wrong_account_is_rejected() {
        let resolver = resolver(MockOutcome::WrongAccount);
        let err = resolver
            .resolve_config("ecs", context("111122223333", "us-east-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountContextError::AssumeRole { .. }));
        assert!(err.to_string().contains("not McpReadOnlyRole in account 111122223333"));
    }

    #[tokio::test]
    async fn test_request_uses_configured_role_not_caller_input() {
        let config = ResolverConfig::default()
            .with_role_name("AuditRole")
            .with_role_path("/ops/")
            .with_external_id(Some("shared-secret".to_string()))
            .with_session_duration(Duration::from_secs(900));
        let resolver = resolver_with(config, MockOutcome::Grant);
        resolver
            .resolve_config("cloudformation", context("111122223333", "cn-north-1"))
            .await
            .unwrap();

        let request = &resolver.assumer.requests()[0];
        assert_eq!(request.role_arn, "arn:aws-cn:iam::111122223333:role/ops/AuditRole");
        assert_eq!(request.session_name, "platform-aws-context-local-test");
        assert_eq!(request.external_id.as_deref(), Some("shared-secret"));
        assert_eq!(request.duration, Duration::from_secs(900));
        assert!(request.tags.is_empty());
    }

    #[tokio::test]
    async fn test_session_tags_sent_when_configured() {
        let resolver = resolver_with(
            ResolverConfig::default().with_tag_session(true),
            MockOutcome::Grant,
        );
        resolver
            .resolve_config("ecs", context("111122223333", "us-east-1"))
            .await
            .unwrap();
        assert_eq!(
            resolver.assumer.requests()[0].tags,
            vec![
                ("actor".to_string(), "local-test".to_string()),
                ("repo".to_string(), "test-repo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_sequential_resolutions_are_independent() {
        let resolver = resolver(MockOutcome::Grant);
        let first = resolver
            .resolve_config("cloudformation", context("111122223333", "us-east-1"))
            .await
            .unwrap();
        let second = resolver
            .resolve_config("cloudformation", context("111122223333", "us-east-1"))
            .await
            .unwrap();
        assert_eq!(resolver.assumer.calls(), 2);
        assert_ne!(access_key(&first).await, access_key(&second).await);
    }

    #[tokio::test]
    async fn test_concurrent_accounts_do_not_cross_contaminate() {
        let resolver = Arc::new(resolver(MockOutcome::Grant));
        let handles: Vec<_> = ["111122223333", "222233334444", "111122223333", "222233334444"]
            .into_iter()
            .map(|account| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve_config("cloudformation", context(account, "us-east-1"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let scoped = handle.await.unwrap().unwrap();
            let account = scoped.context().account_id().to_string();
            assert!(access_key(&scoped).await.contains(&account));
            assert!(scoped.identity().assumed_role_arn.contains(&account));
            assert!(scoped.identity().role_arn.contains(&account));
        }
        assert_eq!(resolver.assumer.calls(), 4);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = ResolverConfig::default().with_role_name("not a role");
        let result = Resolver::with_assumer(
            config,
            SdkConfig::builder().build(),
            MockAssumer::new(MockOutcome::Grant),
        );
        assert!(matches!(result, Err(AccountContextError::Configuration(_))));
    }

    #[test]
    fn test_role_session_name() {
        assert_eq!(
            role_session_name("platform-aws-context", "local-test"),
            "platform-aws-context-local-test"
        );
        assert_eq!(
            role_session_name("ops", "jane doe/laptop!"),
            "ops-jane-doe-laptop"
        );
        assert_eq!(role_session_name("ops", ""), "ops-unknown");
        assert_eq!(role_session_name("ops", "!!!"), "ops-unknown");

        let long = role_session_name("platform-aws-context", &"a".repeat(100));
        assert_eq!(long.len(), 64);
    }

    #[test]
    fn test_session_tags() {
        let tags = session_tags(&CallerMetadata::new("local-test", "local/mcp-test"));
        assert_eq!(
            tags,
            vec![
                ("actor".to_string(), "local-test".to_string()),
                ("repo".to_string(), "local/mcp-test".to_string()),
            ]
        );

        let tags = session_tags(&CallerMetadata::new("ci#42", ""));
        assert_eq!(tags, vec![("actor".to_string(), "ci-42".to_string())]);
    }
}
