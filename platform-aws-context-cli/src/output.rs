//! JSON reports written to stdout

use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use platform_aws_context::{AssumedIdentity, ScopedConfig};
use serde::Serialize;

/// Result of `resolve`: who the scoped config acts as, and until when
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolveReport {
    pub service: String,
    pub account_id: String,
    pub region: String,
    pub actor: String,
    pub repo: String,
    #[serde(flatten)]
    pub identity: AssumedIdentity,
    pub expiration: String,
}

impl ResolveReport {
    pub fn from_scoped(scoped: &ScopedConfig) -> Self {
        let context = scoped.context();
        Self {
            service: scoped.service().to_string(),
            account_id: context.account_id().to_string(),
            region: context.region().to_string(),
            actor: context.metadata().actor.clone(),
            repo: context.metadata().repo.clone(),
            identity: scoped.identity().clone(),
            expiration: format_time(scoped.expires_at()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    Passed,
    /// The role was assumed but lacks permission for the call
    Denied,
    Failed,
}

/// One service call made by `smoke-test`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckResult {
    pub name: String,
    pub region: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmokeTestReport {
    pub account_id: String,
    pub role_arn: String,
    pub actor: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumed_role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    pub checks: Vec<CheckResult>,
}

impl SmokeTestReport {
    /// True when the first CloudFormation check passed
    pub fn cloudformation_passed(&self) -> bool {
        self.checks
            .iter()
            .find(|check| check.name.starts_with("cloudformation:"))
            .is_some_and(|check| check.status == CheckStatus::Passed)
    }
}

pub fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write `value` as JSON to stdout
pub fn write_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize JSON output")?;

    print!("{json}");
    if pretty {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn check(name: &str, status: CheckStatus) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            status,
            count: None,
            items: Vec::new(),
            detail: None,
        }
    }

    fn report(checks: Vec<CheckResult>) -> SmokeTestReport {
        SmokeTestReport {
            account_id: "111122223333".to_string(),
            role_arn: "arn:aws:iam::111122223333:role/McpReadOnlyRole".to_string(),
            actor: "local-test".to_string(),
            repo: "test-repo".to_string(),
            assumed_role_arn: None,
            expiration: None,
            checks,
        }
    }

    #[test]
    fn test_format_time_is_utc_seconds() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(format_time(time), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_cloudformation_passed_uses_first_cloudformation_check() {
        let passed = report(vec![
            check("cloudformation:ListStacks", CheckStatus::Passed),
            check("ecs:ListClusters", CheckStatus::Denied),
            check("cloudformation:ListStacks", CheckStatus::Failed),
        ]);
        assert!(passed.cloudformation_passed());

        let failed = report(vec![
            check("cloudformation:ListStacks", CheckStatus::Failed),
            check("ecs:ListClusters", CheckStatus::Passed),
        ]);
        assert!(!failed.cloudformation_passed());
        assert!(!report(Vec::new()).cloudformation_passed());
    }

    #[test]
    fn test_check_serialization_skips_empty_fields() {
        let value = serde_json::to_value(check("ecs:ListClusters", CheckStatus::Denied)).unwrap();
        assert_eq!(value["Name"], "ecs:ListClusters");
        assert_eq!(value["Status"], "Denied");
        assert!(value.get("Count").is_none());
        assert!(value.get("Items").is_none());
    }
}
