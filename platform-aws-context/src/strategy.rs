//! Caller-side choice between scoped and ambient clients
//!
//! Tools that accept an optional account context decide here, explicitly,
//! whether to go through the [`Resolver`] or to use their own ambient
//! identity. The resolver never makes that choice itself.

use crate::aws::region::is_valid_region;
use crate::aws::services::ServiceClient;
use crate::aws::sts::RoleAssumer;
use crate::error::{AccountContextError, Result};
use crate::resolver::Resolver;
use crate::types::{AccountContext, AccountContextParams};
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientStrategy {
    /// No account context was supplied: act as the caller's own identity
    Ambient { region: String },
    /// Act as the configured role in the context's account
    Scoped(AccountContext),
}

impl ClientStrategy {
    /// Pick a strategy from optional upstream parameters.
    ///
    /// A present, non-empty `account_id` selects [`ClientStrategy::Scoped`];
    /// anything else selects [`ClientStrategy::Ambient`] in the supplied
    /// region, falling back to `default_region`.
    pub fn from_params(params: Option<AccountContextParams>, default_region: &str) -> Self {
        let Some(params) = params else {
            return Self::Ambient {
                region: default_region.to_string(),
            };
        };
        let region = params
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| default_region.to_string());
        match params.into_context(default_region) {
            Some(context) => Self::Scoped(context),
            None => Self::Ambient { region },
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Self::Scoped(_))
    }

    pub fn region(&self) -> &str {
        match self {
            Self::Ambient { region } => region,
            Self::Scoped(context) => context.region(),
        }
    }

    /// Build a client for `C` according to the strategy.
    ///
    /// `ambient` is only consulted for [`ClientStrategy::Ambient`]; a scoped
    /// strategy either resolves or fails.
    pub async fn client<C, A>(self, ambient: &SdkConfig, resolver: &Resolver<A>) -> Result<C>
    where
        C: ServiceClient,
        A: RoleAssumer,
    {
        match self {
            Self::Ambient { region } => {
                if !is_valid_region(&region) {
                    return Err(AccountContextError::configuration(format!(
                        "region '{region}' is not a valid AWS region identifier"
                    )));
                }
                debug!("Using ambient credentials for service '{}' in {region}", C::SERVICE);
                let config = ambient.to_builder().region(Region::new(region)).build();
                Ok(C::from_sdk_config(&config))
            }
            Self::Scoped(context) => {
                debug!(
                    "Using assumed role for service '{}' in account {}",
                    C::SERVICE,
                    context.account_id()
                );
                Ok(resolver.resolve_client::<C>(context).await?.into_inner())
            }
        }
    }
}
