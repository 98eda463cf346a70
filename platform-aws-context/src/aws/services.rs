//! Service client registry
//!
//! A service becomes resolvable by implementing [`ServiceClient`] for its SDK
//! client and registering its name in
//! [`ResolverConfig::supported_services`](crate::ResolverConfig). The
//! resolver itself has no per-service branches.

use aws_types::SdkConfig;

/// Names of the services with a built-in [`ServiceClient`] implementation
pub const BUILTIN_SERVICES: &[&str] = &[
    <aws_sdk_cloudformation::Client as ServiceClient>::SERVICE,
    <aws_sdk_cloudtrail::Client as ServiceClient>::SERVICE,
    <aws_sdk_ecs::Client as ServiceClient>::SERVICE,
    <aws_sdk_sts::Client as ServiceClient>::SERVICE,
];

/// An AWS SDK client that can be built from a resolved [`SdkConfig`]
pub trait ServiceClient: Sized {
    /// Service identifier callers use to request this client
    const SERVICE: &'static str;

    fn from_sdk_config(config: &SdkConfig) -> Self;
}

impl ServiceClient for aws_sdk_cloudformation::Client {
    const SERVICE: &'static str = "cloudformation";

    fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl ServiceClient for aws_sdk_cloudtrail::Client {
    const SERVICE: &'static str = "cloudtrail";

    fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl ServiceClient for aws_sdk_ecs::Client {
    const SERVICE: &'static str = "ecs";

    fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}

impl ServiceClient for aws_sdk_sts::Client {
    const SERVICE: &'static str = "sts";

    fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(config)
    }
}
