//! Resolver configuration
//!
//! Role naming, session lifetime and the other deployment conventions the
//! resolver depends on. Defaults match the read-only operator role deployed
//! in every member account; each value can be overridden from the
//! environment or set programmatically.

use crate::aws::region::{is_valid_region, partition_for_region};
use crate::aws::services::BUILTIN_SERVICES;
use crate::error::{AccountContextError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_ROLE_NAME: &str = "McpReadOnlyRole";
pub const DEFAULT_ROLE_PATH: &str = "/";
pub const DEFAULT_SESSION_PREFIX: &str = "platform-aws-context";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);

/// STS AssumeRole bounds for DurationSeconds
const MIN_SESSION_DURATION_SECS: u64 = 900;
const MAX_SESSION_DURATION_SECS: u64 = 43_200;

/// https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_iam-quotas.html
const MAX_ROLE_NAME_LEN: usize = 64;
const MAX_ROLE_PATH_LEN: usize = 512;
const MAX_EXTERNAL_ID_LEN: usize = 1224;

pub const ENV_ROLE_NAME: &str = "PLATFORM_AWS_CONTEXT_ROLE_NAME";
pub const ENV_ROLE_PATH: &str = "PLATFORM_AWS_CONTEXT_ROLE_PATH";
pub const ENV_SESSION_PREFIX: &str = "PLATFORM_AWS_CONTEXT_SESSION_PREFIX";
pub const ENV_SESSION_DURATION_SECS: &str = "PLATFORM_AWS_CONTEXT_SESSION_DURATION_SECS";
pub const ENV_EXTERNAL_ID: &str = "PLATFORM_AWS_CONTEXT_EXTERNAL_ID";
pub const ENV_TAG_SESSION: &str = "PLATFORM_AWS_CONTEXT_TAG_SESSION";
pub const ENV_DEFAULT_REGION: &str = "PLATFORM_AWS_CONTEXT_DEFAULT_REGION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Name of the role assumed in every target account
    pub role_name: String,
    /// IAM path of that role, `/` for none
    pub role_path: String,
    /// Prefix of the STS role session name; the caller's actor is appended
    pub session_prefix: String,
    /// Requested lifetime of the temporary credentials
    pub session_duration: Duration,
    /// External id required by the target role's trust policy, if any
    pub external_id: Option<String>,
    /// Send caller metadata as STS session tags. Requires `sts:TagSession`
    /// in the target role's trust policy.
    pub tag_session: bool,
    /// Region used when an upstream context omits one
    pub default_region: String,
    /// Service names the resolver will produce clients for
    pub supported_services: BTreeSet<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            role_name: DEFAULT_ROLE_NAME.to_string(),
            role_path: DEFAULT_ROLE_PATH.to_string(),
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            session_duration: DEFAULT_SESSION_DURATION,
            external_id: None,
            tag_session: false,
            default_region: DEFAULT_REGION.to_string(),
            supported_services: BUILTIN_SERVICES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by `PLATFORM_AWS_CONTEXT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(role_name) = lookup(ENV_ROLE_NAME) {
            config.role_name = role_name;
        }
        if let Some(role_path) = lookup(ENV_ROLE_PATH) {
            config.role_path = role_path;
        }
        if let Some(prefix) = lookup(ENV_SESSION_PREFIX) {
            config.session_prefix = prefix;
        }
        if let Some(secs) = lookup(ENV_SESSION_DURATION_SECS) {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                AccountContextError::configuration(format!(
                    "{ENV_SESSION_DURATION_SECS}='{secs}' is not a number of seconds: {e}"
                ))
            })?;
            config.session_duration = Duration::from_secs(secs);
        }
        if let Some(external_id) = lookup(ENV_EXTERNAL_ID) {
            config.external_id = Some(external_id);
        }
        if let Some(flag) = lookup(ENV_TAG_SESSION) {
            config.tag_session = parse_flag(ENV_TAG_SESSION, &flag)?;
        }
        if let Some(region) = lookup(ENV_DEFAULT_REGION) {
            config.default_region = region;
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = role_name.into();
        self
    }

    #[must_use]
    pub fn with_role_path(mut self, role_path: impl Into<String>) -> Self {
        self.role_path = role_path.into();
        self
    }

    #[must_use]
    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    #[must_use]
    pub fn with_tag_session(mut self, tag_session: bool) -> Self {
        self.tag_session = tag_session;
        self
    }

    /// Register an additional service name
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.supported_services.insert(service.into());
        self
    }

    pub fn supports_service(&self, service: &str) -> bool {
        self.supported_services.contains(service)
    }

    /// ARN of the configured role in `account_id`, in the partition of `region`
    pub fn role_arn(&self, account_id: &str, region: &str) -> String {
        format!(
            "arn:{}:iam::{}:role{}{}",
            partition_for_region(region),
            account_id,
            self.role_path,
            self.role_name
        )
    }

    /// Check every setting is acceptable to IAM and STS
    pub fn validate(&self) -> Result<()> {
        if self.role_name.is_empty()
            || self.role_name.len() > MAX_ROLE_NAME_LEN
            || !iam_name_regex().is_match(&self.role_name)
        {
            return Err(AccountContextError::configuration(format!(
                "role name '{}' must be 1-{MAX_ROLE_NAME_LEN} characters of [A-Za-z0-9+=,.@_-]",
                self.role_name
            )));
        }

        if self.role_path.len() > MAX_ROLE_PATH_LEN
            || !self.role_path.starts_with('/')
            || !self.role_path.ends_with('/')
            || self.role_path.chars().any(|c| !('\u{21}'..='\u{7e}').contains(&c))
        {
            return Err(AccountContextError::configuration(format!(
                "role path '{}' must begin and end with '/' and contain printable ASCII only",
                self.role_path
            )));
        }

        if self.session_prefix.is_empty() || !iam_name_regex().is_match(&self.session_prefix) {
            return Err(AccountContextError::configuration(format!(
                "session prefix '{}' must be non-empty and use only [A-Za-z0-9+=,.@_-]",
                self.session_prefix
            )));
        }

        let secs = self.session_duration.as_secs();
        if !(MIN_SESSION_DURATION_SECS..=MAX_SESSION_DURATION_SECS).contains(&secs) {
            return Err(AccountContextError::configuration(format!(
                "session duration {secs}s is outside the STS range \
{MIN_SESSION_DURATION_SECS}-{MAX_SESSION_DURATION_SECS}s"
            )));
        }

        if let Some(external_id) = &self.external_id {
            if external_id.len() < 2 || external_id.len() > MAX_EXTERNAL_ID_LEN {
                return Err(AccountContextError::configuration(format!(
                    "external id must be 2-{MAX_EXTERNAL_ID_LEN} characters"
                )));
            }
        }

        if !is_valid_region(&self.default_region) {
            return Err(AccountContextError::configuration(format!(
                "default region '{}' is not a valid AWS region identifier",
                self.default_region
            )));
        }

        if self.supported_services.is_empty() {
            return Err(AccountContextError::configuration(
                "at least one supported service must be configured",
            ));
        }

        Ok(())
    }
}

fn iam_name_regex() -> &'static Regex {
    static IAM_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    IAM_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9+=,.@_-]+$").expect("Valid regex pattern for IAM name validation")
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AccountContextError::configuration(format!(
            "{key}='{other}' is not a boolean"
        ))),
    }
}
