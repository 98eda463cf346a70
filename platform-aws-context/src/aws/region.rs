//! Region syntax checks and partition derivation

use regex::Regex;
use std::sync::OnceLock;

/// Partition prefixes, most specific first
const PARTITION_PREFIXES: &[(&str, &str)] = &[
    ("us-isob-", "aws-iso-b"),
    ("us-iso-", "aws-iso"),
    ("us-gov-", "aws-us-gov"),
    ("eusc-", "aws-eusc"),
    ("cn-", "aws-cn"),
];

const DEFAULT_PARTITION: &str = "aws";

fn region_regex() -> &'static Regex {
    static REGION_REGEX: OnceLock<Regex> = OnceLock::new();
    // e.g. us-east-1, us-gov-west-1, cn-northwest-1, eusc-de-east-1
    REGION_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z]{2,4}(-[a-z]+)+-[0-9]{1,2}$")
            .expect("Valid regex pattern for region validation")
    })
}

/// Whether `region` is a syntactically valid AWS region identifier.
///
/// This checks shape only; new regions are accepted without a release.
pub fn is_valid_region(region: &str) -> bool {
    region_regex().is_match(region)
}

/// Partition the region belongs to, used when building role ARNs.
///
/// # Examples
/// ```
/// use platform_aws_context::aws::region::partition_for_region;
///
/// assert_eq!(partition_for_region("us-east-1"), "aws");
/// assert_eq!(partition_for_region("cn-north-1"), "aws-cn");
/// assert_eq!(partition_for_region("us-gov-west-1"), "aws-us-gov");
/// ```
pub fn partition_for_region(region: &str) -> &'static str {
    PARTITION_PREFIXES
        .iter()
        .find(|(prefix, _)| region.starts_with(prefix))
        .map_or(DEFAULT_PARTITION, |(_, partition)| partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_regions() {
        for region in [
            "us-east-1",
            "us-west-2",
            "eu-central-1",
            "ap-southeast-1",
            "us-gov-west-1",
            "cn-northwest-1",
            "eusc-de-east-1",
            "us-isob-east-1",
        ] {
            assert!(is_valid_region(region), "{region} should be valid");
        }
    }

    #[test]
    fn test_invalid_regions() {
        for region in [
            "",
            "us-east",
            "US-EAST-1",
            "us_east_1",
            "not-a-region",
            "us-east-1 ",
            "*",
            "us-east-123",
        ] {
            assert!(!is_valid_region(region), "{region:?} should be invalid");
        }
    }

    #[test]
    fn test_partition_derivation() {
        assert_eq!(partition_for_region("us-east-1"), "aws");
        assert_eq!(partition_for_region("eu-west-1"), "aws");
        assert_eq!(partition_for_region("cn-north-1"), "aws-cn");
        assert_eq!(partition_for_region("cn-northwest-1"), "aws-cn");
        assert_eq!(partition_for_region("us-gov-east-1"), "aws-us-gov");
        assert_eq!(partition_for_region("us-iso-east-1"), "aws-iso");
        assert_eq!(partition_for_region("us-isob-east-1"), "aws-iso-b");
        assert_eq!(partition_for_region("eusc-de-east-1"), "aws-eusc");
    }
}
