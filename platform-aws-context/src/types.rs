//! Core type definitions for account-scoped resolution

use crate::aws::region::is_valid_region;
use crate::error::{AccountContextError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Audit metadata describing who is asking for cross-account access.
///
/// Logged and propagated at the role-assumption boundary only; it never takes
/// part in an authorization decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallerMetadata {
    /// Calling principal or tool
    #[serde(default, deserialize_with = "string_or_empty")]
    pub actor: String,
    /// Originating codebase or tool
    #[serde(default, deserialize_with = "string_or_empty")]
    pub repo: String,
    /// Any further attributes supplied upstream, kept as-is
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CallerMetadata {
    #[must_use]
    pub fn new(actor: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            repo: repo.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Null or non-string audit values read as empty rather than failing the
/// whole request.
fn string_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => value,
        _ => String::new(),
    })
}

/// A `_metadata` that is not an object is treated as absent.
fn metadata_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<CallerMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    CallerMetadata::deserialize(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Target of a cross-account operation.
///
/// Immutable once constructed. Validation is deferred to the resolver so that
/// a malformed context is reported as a configuration error at the point of
/// use rather than silently dropped upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountContext {
    account_id: String,
    region: String,
    metadata: CallerMetadata,
}

impl AccountContext {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        metadata: CallerMetadata,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            metadata,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn metadata(&self) -> &CallerMetadata {
        &self.metadata
    }

    /// Check the account id and region are well formed
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(AccountContextError::configuration(
                "account_id must not be empty",
            ));
        }
        if self.account_id.len() != 12 || !self.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(AccountContextError::configuration(format!(
                "account_id '{}' is not a 12-digit AWS account id",
                self.account_id
            )));
        }
        if self.region.is_empty() {
            return Err(AccountContextError::configuration(format!(
                "region must not be empty (account {})",
                self.account_id
            )));
        }
        if !is_valid_region(&self.region) {
            return Err(AccountContextError::configuration(format!(
                "region '{}' is not a valid AWS region identifier (account {})",
                self.region, self.account_id
            )));
        }
        Ok(())
    }
}

/// Account context as it arrives from upstream collaborators.
///
/// ```json
/// {"account_id": "111122223333", "region": "us-east-1",
///  "_metadata": {"actor": "local-test", "repo": "local/mcp-test"}}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountContextParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(
        default,
        rename = "_metadata",
        deserialize_with = "metadata_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<CallerMetadata>,
}

impl AccountContextParams {
    /// Convert into an [`AccountContext`], filling a missing region with
    /// `default_region`.
    ///
    /// Returns `None` when no account id was supplied: the upstream caller did
    /// not ask for cross-account access at all.
    pub fn into_context(self, default_region: &str) -> Option<AccountContext> {
        let account_id = self.account_id.filter(|id| !id.is_empty())?;
        let region = self
            .region
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| default_region.to_string());
        Some(AccountContext::new(
            account_id,
            region,
            self.metadata.unwrap_or_default(),
        ))
    }
}

/// Temporary credentials issued by an STS role assumption
#[derive(Clone)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: SystemTime,
    /// ARN of the assumed-role session, e.g.
    /// `arn:aws:sts::111122223333:assumed-role/McpReadOnlyRole/session`
    pub assumed_role_arn: String,
    pub assumed_role_id: String,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .field("assumed_role_arn", &self.assumed_role_arn)
            .field("assumed_role_id", &self.assumed_role_id)
            .finish()
    }
}

/// Identity a scoped client acts as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumedIdentity {
    pub role_arn: String,
    pub assumed_role_arn: String,
    pub assumed_role_id: String,
}
