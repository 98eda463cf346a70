//! Account-scoped AWS clients.
//!
//! Given a target account, region and caller metadata, the [`Resolver`]
//! assumes a well-known role in that account through STS and hands back SDK
//! clients that run exclusively as that role.
//!
//! ```no_run
//! use platform_aws_context::{AccountContext, CallerMetadata, Resolver};
//!
//! # async fn run() -> platform_aws_context::Result<()> {
//! let resolver = Resolver::from_env().await?;
//! let context = AccountContext::new(
//!     "111122223333",
//!     "us-east-1",
//!     CallerMetadata::new("local-test", "test-repo"),
//! );
//! let cfn = resolver
//!     .resolve_client::<aws_sdk_cloudformation::Client>(context)
//!     .await?;
//! let _stacks = cfn.list_stacks().send().await;
//! # Ok(())
//! # }
//! ```
//!
//! Callers that accept an optional context pick between scoped and ambient
//! access with [`ClientStrategy`]; the resolver never falls back on its own.

pub mod aws;
pub mod config;
pub mod error;
pub mod resolver;
pub mod strategy;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aws::services::ServiceClient;
pub use aws::sts::{AssumeRoleRequest, CallerIdentity, RoleAssumer, StsRoleAssumer};
pub use config::ResolverConfig;
pub use error::{AccountContextError, Result};
pub use resolver::{Resolver, ScopedClient, ScopedConfig};
pub use strategy::ClientStrategy;
pub use types::{
    AccountContext, AccountContextParams, AssumedIdentity, CallerMetadata, TemporaryCredentials,
};
