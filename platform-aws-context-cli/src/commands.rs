//! Subcommand implementations

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_cloudformation::types::StackStatus;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_sts::config::Region;
use log::{debug, info, warn};
use platform_aws_context::aws::is_authorization_failure;
use platform_aws_context::aws::region::is_valid_region;
use platform_aws_context::aws::services::BUILTIN_SERVICES;
use platform_aws_context::aws::sts::{caller_account_id, caller_identity, CallerIdentity};
use platform_aws_context::{AccountContext, CallerMetadata, Resolver, ResolverConfig};

use crate::output::{format_time, CheckResult, CheckStatus, ResolveReport, SmokeTestReport};

const LIST_STACKS: &str = "cloudformation:ListStacks";
const LIST_CLUSTERS: &str = "ecs:ListClusters";

/// Load the caller's ambient AWS configuration pinned to `region`
async fn load_aws_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

fn ensure_region(region: &str) -> Result<()> {
    if !is_valid_region(region) {
        anyhow::bail!("'{region}' is not a valid AWS region identifier");
    }
    Ok(())
}

pub async fn whoami(region: &str) -> Result<CallerIdentity> {
    ensure_region(region)?;
    let base = load_aws_config(region).await;
    let identity = caller_identity(&aws_sdk_sts::Client::new(&base))
        .await
        .context("Failed to determine the calling identity")?;
    debug!("Caller is {} in account {}", identity.arn, identity.account);
    Ok(identity)
}

/// Resolve a scoped configuration for `service` and describe it
pub async fn resolve(
    config: ResolverConfig,
    service: &str,
    context: AccountContext,
) -> Result<ResolveReport> {
    // Config loading makes no AWS calls.
    let base = load_aws_config(context.region()).await;
    let resolver = Resolver::new(config, base).context("Invalid resolver configuration")?;
    resolver
        .validate_request(service, &context)
        .context("Invalid resolve request")?;
    let account_id = context.account_id().to_string();
    let region = context.region().to_string();

    let scoped = resolver
        .resolve_config(service, context)
        .await
        .with_context(|| {
            format!("Failed to resolve '{service}' for account '{account_id}' in '{region}'")
        })?;
    Ok(ResolveReport::from_scoped(&scoped))
}

/// Inputs to [`smoke_test`]
#[derive(Debug, Clone)]
pub struct SmokeTestOptions {
    /// Target account; the caller's own account when absent
    pub account: Option<String>,
    /// The first region hosts the ECS check
    pub regions: Vec<String>,
    pub metadata: CallerMetadata,
}

/// Exercise scoped CloudFormation and ECS clients against a live account
pub async fn smoke_test(config: ResolverConfig, options: SmokeTestOptions) -> Result<SmokeTestReport> {
    config.validate().context("Invalid resolver configuration")?;
    let Some(first_region) = options.regions.first().cloned() else {
        anyhow::bail!("at least one region is required");
    };
    for region in &options.regions {
        ensure_region(region)?;
    }
    if let Some(account) = &options.account {
        AccountContext::new(account.as_str(), first_region.as_str(), options.metadata.clone())
            .validate()?;
    }

    let base = load_aws_config(&first_region).await;
    let account_id = match options.account {
        Some(account) => account,
        None => {
            let account = caller_account_id(&aws_sdk_sts::Client::new(&base))
                .await
                .context("Failed to determine the caller account")?;
            info!("No account given, testing the caller's own account {account}");
            account
        }
    };

    let role_arn = config.role_arn(&account_id, &first_region);
    let resolver = Resolver::new(config, base).context("Invalid resolver configuration")?;
    let context_for = |region: &str| {
        AccountContext::new(account_id.as_str(), region, options.metadata.clone())
    };

    let mut report = SmokeTestReport {
        account_id: account_id.clone(),
        role_arn,
        actor: options.metadata.actor.clone(),
        repo: options.metadata.repo.clone(),
        assumed_role_arn: None,
        expiration: None,
        checks: Vec::new(),
    };

    let (first, session) = list_stacks(&resolver, context_for(&first_region)).await;
    if let Some((assumed_role_arn, expiration)) = session {
        report.assumed_role_arn = Some(assumed_role_arn);
        report.expiration = Some(expiration);
    }
    report.checks.push(first);
    report
        .checks
        .push(list_clusters(&resolver, context_for(&first_region)).await);
    for region in options.regions.iter().skip(1) {
        report
            .checks
            .push(list_stacks(&resolver, context_for(region)).await.0);
    }

    Ok(report)
}

fn check(name: &str, region: &str, status: CheckStatus) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        region: region.to_string(),
        status,
        count: None,
        items: Vec::new(),
        detail: None,
    }
}

/// Classify a failed service call made with scoped credentials
fn service_failure(name: &str, region: &str, code: Option<&str>, message: String) -> CheckResult {
    let status = if is_authorization_failure(code, &message) {
        CheckStatus::Denied
    } else {
        CheckStatus::Failed
    };
    warn!("{name} in {region}: {message}");
    CheckResult {
        detail: Some(message),
        ..check(name, region, status)
    }
}

/// List completed stacks; also returns the assumed role ARN and credential
/// expiry when the role was assumed
async fn list_stacks(
    resolver: &Resolver,
    context: AccountContext,
) -> (CheckResult, Option<(String, String)>) {
    let region = context.region().to_string();
    let client = match resolver
        .resolve_client::<aws_sdk_cloudformation::Client>(context)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            let result = CheckResult {
                detail: Some(e.to_string()),
                ..check(LIST_STACKS, &region, CheckStatus::Failed)
            };
            return (result, None);
        }
    };
    let session = Some((
        client.identity().assumed_role_arn.clone(),
        format_time(client.expires_at()),
    ));

    let result = match client
        .list_stacks()
        .stack_status_filter(StackStatus::CreateComplete)
        .stack_status_filter(StackStatus::UpdateComplete)
        .send()
        .await
    {
        Ok(output) => {
            let count = output.stack_summaries().len();
            info!("{LIST_STACKS} in {region}: {count} stacks");
            CheckResult {
                count: Some(count),
                ..check(LIST_STACKS, &region, CheckStatus::Passed)
            }
        }
        Err(e) => service_failure(
            LIST_STACKS,
            &region,
            e.code(),
            DisplayErrorContext(&e).to_string(),
        ),
    };
    (result, session)
}

async fn list_clusters(resolver: &Resolver, context: AccountContext) -> CheckResult {
    let region = context.region().to_string();
    let client = match resolver.resolve_client::<aws_sdk_ecs::Client>(context).await {
        Ok(client) => client,
        Err(e) => {
            return CheckResult {
                detail: Some(e.to_string()),
                ..check(LIST_CLUSTERS, &region, CheckStatus::Failed)
            }
        }
    };

    match client.list_clusters().send().await {
        Ok(output) => {
            let items = output.cluster_arns().to_vec();
            info!("{LIST_CLUSTERS} in {region}: {} clusters", items.len());
            CheckResult {
                count: Some(items.len()),
                items,
                ..check(LIST_CLUSTERS, &region, CheckStatus::Passed)
            }
        }
        Err(e) => {
            let mut result = service_failure(
                LIST_CLUSTERS,
                &region,
                e.code(),
                DisplayErrorContext(&e).to_string(),
            );
            if result.status == CheckStatus::Denied {
                result.detail = Some(format!(
                    "role lacks ECS permissions: {}",
                    result.detail.unwrap_or_default()
                ));
            }
            result
        }
    }
}

pub fn print_version_info(verbose: bool) -> Result<()> {
    println!("platform-aws-context {}", env!("CARGO_PKG_VERSION"));
    if verbose {
        let config = ResolverConfig::from_env().context("Invalid resolver environment")?;
        println!("Role: {}{}", config.role_path, config.role_name);
        println!("Default region: {}", config.default_region);
        println!("Built-in services: {}", BUILTIN_SERVICES.join(", "));
    }
    Ok(())
}
