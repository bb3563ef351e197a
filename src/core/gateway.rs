//! Cloud rule gateway contract
//!
//! The reconciler reaches the provider only through [`RuleGateway`]. Calls use
//! the provider's native shapes from [`crate::core::provider`]; translation to
//! [`crate::core::permission::PermissionRule`] happens on the reconciler side.
//!
//! Region selection belongs to the gateway: a gateway instance is bound to
//! one region through the [`GatewayConfig`] it was constructed with, and
//! reports it through [`RuleGateway::region`] so callers can refuse specs
//! meant for another region.

use crate::core::error::Result;
use crate::core::provider::{IpPermission, SecurityGroupInfo};
use std::path::PathBuf;

/// Region used when neither the spec nor the configuration names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// How to find a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLookup<'a> {
    Id(&'a str),
    /// By name, optionally restricted to one network
    Name {
        name: &'a str,
        network_id: Option<&'a str>,
    },
}

impl<'a> GroupLookup<'a> {
    /// Name lookup; an empty network id means "any network".
    pub fn by_name(name: &'a str, network_id: &'a str) -> Self {
        Self::Name {
            name,
            network_id: (!network_id.is_empty()).then_some(network_id),
        }
    }

    pub fn matches(&self, group: &SecurityGroupInfo) -> bool {
        match *self {
            GroupLookup::Id(id) => group.group_id == id,
            GroupLookup::Name { name, network_id } => {
                group.group_name == name && network_id.is_none_or(|vpc| group.vpc_id == vpc)
            }
        }
    }
}

impl std::fmt::Display for GroupLookup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupLookup::Id(id) => write!(f, "id {id}"),
            GroupLookup::Name {
                name,
                network_id: Some(vpc),
            } => write!(f, "name {name} in {vpc}"),
            GroupLookup::Name { name, .. } => write!(f, "name {name}"),
        }
    }
}

/// Explicit gateway configuration, passed at construction time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub region: String,
    /// Location of the provider state document
    pub state_path: PathBuf,
}

impl GatewayConfig {
    pub fn new(region: impl Into<String>, state_path: impl Into<PathBuf>) -> Self {
        let region = region.into();
        Self {
            region: if region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                region
            },
            state_path: state_path.into(),
        }
    }
}

/// Operations the reconciler needs from a cloud provider.
///
/// `add_rule`/`delete_rule` report an explicit rejection as `Ok(false)`;
/// `Err` covers transport or provider errors. Callers treat both as a
/// failed call.
#[allow(async_fn_in_trait)]
pub trait RuleGateway {
    /// Region every call of this gateway targets.
    fn region(&self) -> &str;

    async fn fetch_group(&self, lookup: GroupLookup<'_>) -> Result<Option<SecurityGroupInfo>>;

    /// Creates an empty group and returns its id, or `None` if the provider
    /// declined the request.
    async fn create_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<Option<String>>;

    async fn add_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool>;

    async fn delete_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, name: &str, vpc: &str) -> SecurityGroupInfo {
        SecurityGroupInfo {
            group_id: id.to_string(),
            group_name: name.to_string(),
            group_description: String::new(),
            vpc_id: vpc.to_string(),
            ip_permissions: vec![],
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let g = group("sg-1", "web", "vpc-1");
        assert!(GroupLookup::Id("sg-1").matches(&g));
        assert!(!GroupLookup::Id("sg-2").matches(&g));
    }

    #[test]
    fn test_lookup_by_name_scoped_to_network() {
        let g = group("sg-1", "web", "vpc-1");
        assert!(GroupLookup::by_name("web", "vpc-1").matches(&g));
        assert!(GroupLookup::by_name("web", "").matches(&g));
        assert!(!GroupLookup::by_name("web", "vpc-2").matches(&g));
        assert!(!GroupLookup::by_name("db", "vpc-1").matches(&g));
    }

    #[test]
    fn test_config_defaults_region() {
        let config = GatewayConfig::new("", "/tmp/state.json");
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_lookup_display() {
        assert_eq!(GroupLookup::by_name("web", "vpc-1").to_string(), "name web in vpc-1");
        assert_eq!(GroupLookup::Id("sg-9").to_string(), "id sg-9");
    }
}
