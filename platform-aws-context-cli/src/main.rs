//! Platform AWS Context CLI
//!
//! Operator tool for checking that the calling identity can assume the
//! read-only role in a target account and use the resulting clients.
//!
//! # Exit Codes
//!
//! - `ExitCode::Success` (0): the command completed
//! - `ExitCode::Error` (1): invalid input, role assumption failure or AWS error
//! - `ExitCode::CheckFailed` (2): `smoke-test` ran but the CloudFormation
//!   check did not pass
//!
//! See `types::ExitCode` for the enum definition.

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use platform_aws_context::{AccountContext, CallerMetadata, ResolverConfig};

mod commands;
mod output;
mod types;

use commands::{print_version_info, SmokeTestOptions};
use types::ExitCode;

const DEFAULT_ACTOR: &str = "local-test";
const DEFAULT_REPO: &str = "test-repo";

/// Overrides for the resolver settings otherwise read from
/// `PLATFORM_AWS_CONTEXT_*` environment variables
#[derive(Args, Debug, Clone)]
struct ResolverArgs {
    /// Name of the role to assume in the target account
    #[arg(long = "role-name")]
    role_name: Option<String>,

    /// IAM path of the role, e.g. /platform/
    #[arg(long = "role-path")]
    role_path: Option<String>,

    /// Prefix of the STS role session name
    #[arg(long = "session-prefix")]
    session_prefix: Option<String>,

    /// Lifetime of the temporary credentials
    #[arg(
        long = "session-duration",
        value_name = "SECONDS",
        long_help = "Requested lifetime of the temporary credentials in seconds. \
STS accepts 900 to 43200, capped by the role's maximum session duration."
    )]
    session_duration: Option<u64>,

    /// External id required by the role's trust policy
    #[arg(long = "external-id")]
    external_id: Option<String>,

    /// Attach actor and repo as STS session tags
    #[arg(
        long = "tag-session",
        long_help = "Attach the caller's actor and repo as STS session tags. \
The role's trust policy must allow sts:TagSession."
    )]
    tag_session: bool,
}

impl ResolverArgs {
    /// Environment configuration with command line overrides applied
    fn resolver_config(self) -> Result<ResolverConfig> {
        let mut config =
            ResolverConfig::from_env().context("Invalid resolver environment configuration")?;
        if let Some(role_name) = self.role_name {
            config = config.with_role_name(role_name);
        }
        if let Some(role_path) = self.role_path {
            config = config.with_role_path(role_path);
        }
        if let Some(prefix) = self.session_prefix {
            config = config.with_session_prefix(prefix);
        }
        if let Some(secs) = self.session_duration {
            config = config.with_session_duration(Duration::from_secs(secs));
        }
        if self.external_id.is_some() {
            config = config.with_external_id(self.external_id);
        }
        if self.tag_session {
            config = config.with_tag_session(true);
        }
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }
}

/// Who is asking, recorded in logs and the role session name
#[derive(Args, Debug, Clone)]
struct CallerArgs {
    #[arg(long = "actor", default_value = DEFAULT_ACTOR)]
    actor: String,

    #[arg(long = "repo", default_value = DEFAULT_REPO)]
    repo: String,
}

impl From<CallerArgs> for CallerMetadata {
    fn from(args: CallerArgs) -> Self {
        CallerMetadata::new(args.actor, args.repo)
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct OutputArgs {
    /// Format JSON output with indentation for readability
    #[arg(short = 'p', long = "pretty")]
    pretty: bool,

    /// Enable debug logging output to stderr
    #[arg(
        short = 'd',
        long = "debug",
        long_help = "Enables TRACE, DEBUG, INFO, WARN and ERROR logging on stderr, \
including every role assumption attempt. stdout stays reserved for JSON output."
    )]
    debug: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "platform-aws-context",
    author,
    version,
    disable_version_flag = true,
    about = "Resolve AWS clients scoped to a target account through STS AssumeRole",
    long_about = "Assumes a well-known read-only role in a target AWS account and reports \
what the resulting clients act as. The calling identity comes from the default AWS credential \
chain.\n\n\
platform-aws-context whoami\n  \
platform-aws-context resolve --service cloudformation --account 111122223333 --region us-east-1\n  \
platform-aws-context smoke-test --account 111122223333 --regions us-east-1 us-west-2 --pretty"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the identity of the ambient AWS credentials
    Whoami {
        /// Region for the STS endpoint
        #[arg(short = 'r', long = "region")]
        region: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Assume the role for a service in an account and print the resulting identity
    #[command(
        long_about = "Assumes the configured role in the target account and prints the assumed \
role ARN and credential expiry. Secrets are never printed. Malformed input is rejected before \
any AWS call is made."
    )]
    Resolve {
        /// Service the scoped configuration is for
        #[arg(short = 's', long = "service")]
        service: String,

        /// Target AWS account ID
        #[arg(short = 'a', long = "account")]
        account: String,

        /// Target region; defaults to the configured default region
        #[arg(short = 'r', long = "region")]
        region: Option<String>,

        #[command(flatten)]
        resolver: ResolverArgs,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List stacks and clusters in an account through the assumed role
    #[command(
        long_about = "Resolves scoped CloudFormation and ECS clients and calls ListStacks \
(CREATE_COMPLETE and UPDATE_COMPLETE) and ListClusters in the first region, then ListStacks \
in every other region. Without --account the caller's own account is used. Exits 2 when the \
first CloudFormation check fails."
    )]
    SmokeTest {
        /// Target AWS account ID; defaults to the caller's account
        #[arg(short = 'a', long = "account")]
        account: Option<String>,

        /// Regions to check
        #[arg(long = "regions", num_args = 1.., default_values = ["us-east-1", "us-west-2"])]
        regions: Vec<String>,

        #[command(flatten)]
        resolver: ResolverArgs,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    #[command(
        about = "Print version information.",
        short_flag = 'V',
        long_flag = "version"
    )]
    Version {
        #[arg(long = "verbose", default_value_t = false, hide = true)]
        verbose: bool,
    },
}

/// Initialize logging based on configuration
fn init_logging(debug: bool) -> Result<()> {
    let log_level = if debug {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Error
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_target(false)
        .format_timestamp_secs()
        .try_init()
        .context("Failed to initialize logging")
}

async fn handle_whoami(region: Option<String>, pretty: bool) -> Result<ExitCode> {
    info!("Running whoami command");
    let region = match region {
        Some(region) => region,
        None => {
            ResolverConfig::from_env()
                .context("Invalid resolver environment configuration")?
                .default_region
        }
    };
    let identity = commands::whoami(&region).await?;
    output::write_json(&identity, pretty)?;
    Ok(ExitCode::Success)
}

async fn handle_resolve(
    service: String,
    account: String,
    region: Option<String>,
    resolver: ResolverArgs,
    caller: CallerArgs,
    pretty: bool,
) -> Result<ExitCode> {
    info!("Running resolve command");
    let config = resolver.resolver_config()?;
    let region = region.unwrap_or_else(|| config.default_region.clone());
    let context = AccountContext::new(account, region, caller.into());

    let report = commands::resolve(config, &service, context).await?;
    output::write_json(&report, pretty)?;
    Ok(ExitCode::Success)
}

async fn handle_smoke_test(
    account: Option<String>,
    regions: Vec<String>,
    resolver: ResolverArgs,
    caller: CallerArgs,
    pretty: bool,
) -> Result<ExitCode> {
    info!("Running smoke-test command");
    let config = resolver.resolver_config()?;
    let report = commands::smoke_test(
        config,
        SmokeTestOptions {
            account,
            regions,
            metadata: caller.into(),
        },
    )
    .await?;

    output::write_json(&report, pretty)?;
    if report.cloudformation_passed() {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::CheckFailed)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let debug = match &cli.command {
        Commands::Whoami { output, .. }
        | Commands::Resolve { output, .. }
        | Commands::SmokeTest { output, .. } => output.debug,
        Commands::Version { .. } => false,
    };
    if let Err(e) = init_logging(debug) {
        eprintln!("platform-aws-context: {e}");
        process::exit(ExitCode::Error.into());
    }

    let result = match cli.command {
        Commands::Whoami { region, output } => handle_whoami(region, output.pretty).await,
        Commands::Resolve {
            service,
            account,
            region,
            resolver,
            caller,
            output,
        } => handle_resolve(service, account, region, resolver, caller, output.pretty).await,
        Commands::SmokeTest {
            account,
            regions,
            resolver,
            caller,
            output,
        } => handle_smoke_test(account, regions, resolver, caller, output.pretty).await,
        Commands::Version { verbose } => print_version_info(verbose).map(|()| ExitCode::Success),
    };

    let code = result.unwrap_or_else(|e| {
        print_cli_command_error(&e);
        ExitCode::Error
    });
    process::exit(code.into());
}

fn print_cli_command_error(e: &anyhow::Error) {
    eprintln!("Error: {e}");
    let mut source = e.source();
    while let Some(err) = source {
        eprintln!("  Caused by: {err}");
        source = err.source();
    }
}
