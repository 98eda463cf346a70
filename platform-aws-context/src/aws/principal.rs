//! Principal ARN parsing
//!
//! Used to check that a role assumption really landed in the requested
//! account and role, and to describe the calling identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrincipalKind {
    Role,
    User,
    AssumedRole,
    Root,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PrincipalArn {
    pub partition: String,
    pub account_id: String,
    pub kind: PrincipalKind,
    /// Role or user name including any path; empty for the root user
    pub name: String,
    /// Session name, only set for assumed roles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl PrincipalArn {
    /// Whether this is a session of `role_name` in `account_id`
    pub fn is_session_of(&self, account_id: &str, role_name: &str) -> bool {
        self.kind == PrincipalKind::AssumedRole
            && self.account_id == account_id
            && self.name == role_name
    }
}

/// Parse an IAM user/role, root or STS assumed-role ARN
pub fn parse_principal_arn(principal_arn: &str) -> Result<PrincipalArn, String> {
    // arn:partition:service:region:account:resource
    let parts: Vec<&str> = principal_arn.splitn(6, ':').collect();
    if parts.len() < 6 || parts[0] != "arn" {
        return Err("invalid ARN format: expected at least 6 colon-separated parts".to_string());
    }
    let (partition, service, account_id, resource) = (parts[1], parts[2], parts[4], parts[5]);
    if account_id.is_empty() {
        return Err("invalid ARN format: missing account id".to_string());
    }
    let (kind, name, session) = match service {
        "iam" => parse_iam_resource(resource)?,
        "sts" => parse_sts_resource(resource)?,
        _ => {
            return Err(format!(
                "unsupported service '{service}': only IAM and STS principals are supported"
            ))
        }
    };
    Ok(PrincipalArn {
        partition: partition.to_string(),
        account_id: account_id.to_string(),
        kind,
        name,
        session,
    })
}

type ParsedResource = (PrincipalKind, String, Option<String>);

fn parse_iam_resource(resource: &str) -> Result<ParsedResource, String> {
    if resource == "root" {
        return Ok((PrincipalKind::Root, String::new(), None));
    }
    match resource.split_once('/') {
        Some(("role", path)) if !path.is_empty() => Ok((PrincipalKind::Role, path.to_string(), None)),
        Some(("user", path)) if !path.is_empty() => Ok((PrincipalKind::User, path.to_string(), None)),
        Some(("role" | "user", _)) => Err("invalid IAM resource format: missing name".to_string()),
        Some((kind, _)) => Err(format!(
            "unsupported IAM resource type '{kind}': only 'role' and 'user' are supported"
        )),
        None => Err("invalid IAM resource format: expected resource type and name".to_string()),
    }
}

fn parse_sts_resource(resource: &str) -> Result<ParsedResource, String> {
    let resource_parts: Vec<&str> = resource.split('/').collect();
    if resource_parts.len() < 3 {
        return Err("invalid STS resource format: expected at least 3 parts".to_string());
    }
    match resource_parts[0] {
        "assumed-role" => Ok((
            PrincipalKind::AssumedRole,
            resource_parts[1].to_string(),
            Some(resource_parts[2..].join("/")),
        )),
        "federated-user" => Err("federated users are not supported".to_string()),
        other => Err(format!(
            "unsupported STS resource type '{other}': only 'assumed-role' is supported"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iam_role_with_path() {
        let info = parse_principal_arn("arn:aws:iam::123456789012:role/application/MyRole").unwrap();
        assert_eq!(info.kind, PrincipalKind::Role);
        assert_eq!(info.name, "application/MyRole");
        assert_eq!(info.account_id, "123456789012");
        assert_eq!(info.partition, "aws");
        assert!(info.session.is_none());
    }

    #[test]
    fn test_parse_iam_user() {
        let info = parse_principal_arn("arn:aws:iam::123456789012:user/developers/alice").unwrap();
        assert_eq!(info.kind, PrincipalKind::User);
        assert_eq!(info.name, "developers/alice");
    }

    #[test]
    fn test_parse_root() {
        let info = parse_principal_arn("arn:aws:iam::123456789012:root").unwrap();
        assert_eq!(info.kind, PrincipalKind::Root);
        assert!(info.name.is_empty());
    }

    #[test]
    fn test_parse_assumed_role() {
        let info = parse_principal_arn(
            "arn:aws-cn:sts::111122223333:assumed-role/McpReadOnlyRole/platform-aws-context-local-test",
        )
        .unwrap();
        assert_eq!(info.kind, PrincipalKind::AssumedRole);
        assert_eq!(info.partition, "aws-cn");
        assert_eq!(info.name, "McpReadOnlyRole");
        assert_eq!(
            info.session.as_deref(),
            Some("platform-aws-context-local-test")
        );
        assert!(info.is_session_of("111122223333", "McpReadOnlyRole"));
        assert!(!info.is_session_of("222233334444", "McpReadOnlyRole"));
        assert!(!info.is_session_of("111122223333", "AdminRole"));
    }

    #[test]
    fn test_role_is_not_a_session() {
        let info = parse_principal_arn("arn:aws:iam::111122223333:role/McpReadOnlyRole").unwrap();
        assert!(!info.is_session_of("111122223333", "McpReadOnlyRole"));
    }

    #[test]
    fn test_parse_federated_user() {
        let result = parse_principal_arn("arn:aws:sts::123456789012:federated-user/alice/session");
        assert_eq!(result.unwrap_err(), "federated users are not supported");
    }

    #[test]
    fn test_parse_invalid_arns() {
        assert!(parse_principal_arn("not-an-arn").is_err());
        assert!(parse_principal_arn("arn:aws:s3:::my-bucket").is_err());
        assert!(parse_principal_arn("arn:aws:iam::123456789012:group/devs").is_err());
        assert!(parse_principal_arn("arn:aws:iam::123456789012:role/").is_err());
    }

    #[test]
    fn test_principal_serialization() {
        let info = parse_principal_arn("arn:aws:iam::123456789012:role/MyRole").unwrap();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"AccountId\""));
        assert!(json.contains("\"Kind\""));
        assert!(!json.contains("\"Session\""));
    }
}
