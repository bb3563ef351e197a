//! Permission rule data structures and the same-type matcher
//!
//! A [`PermissionRule`] is one inbound allow-entry of a security group:
//! a protocol, a port range (or the ICMP wildcard), and the set of CIDR
//! sources it admits. Two rules have the *same type* when protocol and both
//! ports agree; the source set is state that reconciliation adjusts per type.
//!
//! # Example
//!
//! ```
//! use sgsync::core::permission::{PermissionRule, Protocol, matches};
//!
//! let desired = PermissionRule::new(Protocol::Tcp, 22, 22, ["10.0.0.0/8"]);
//! let observed = PermissionRule::new(Protocol::Tcp, 22, 22, ["0.0.0.0/0"]);
//! assert!(matches(&desired, &observed));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Port sentinel meaning "any ICMP type/code".
pub const ICMP_WILDCARD: i32 = -1;

/// Description used when a spec creates a group without one.
pub const DEFAULT_DESCRIPTION: &str = "none";

/// IP protocol of a permission rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "icmp")]
    Icmp,
}

impl Protocol {
    /// Returns `true` if the protocol's ports are a TCP/UDP port range.
    pub const fn has_port_range(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// A single inbound permission: protocol, port range, permitted sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRule {
    pub protocol: Protocol,
    pub from_port: i32,
    pub to_port: i32,
    /// CIDR source strings
    #[serde(default, alias = "ips")]
    pub sources: BTreeSet<String>,
}

impl PermissionRule {
    pub fn new<I, S>(protocol: Protocol, from_port: i32, to_port: i32, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protocol,
            from_port,
            to_port,
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Rule allowing any ICMP type/code from the given sources.
    pub fn icmp_any<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Protocol::Icmp, ICMP_WILDCARD, ICMP_WILDCARD, sources)
    }

    /// Copy of this rule's type carrying a different source set.
    pub fn with_sources(&self, sources: BTreeSet<String>) -> Self {
        Self {
            protocol: self.protocol,
            from_port: self.from_port,
            to_port: self.to_port,
            sources,
        }
    }

    /// Match key: everything except the sources.
    pub fn rule_type(&self) -> (Protocol, i32, i32) {
        (self.protocol, self.from_port, self.to_port)
    }

    /// Human-readable port column ("22", "8000-9000", "any").
    pub fn port_display(&self) -> String {
        if self.from_port == ICMP_WILDCARD && self.to_port == ICMP_WILDCARD {
            "any".to_string()
        } else if self.from_port == self.to_port {
            self.from_port.to_string()
        } else {
            format!("{}-{}", self.from_port, self.to_port)
        }
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(String::as_str).collect();
        write!(
            f,
            "{} {} from [{}]",
            self.protocol,
            self.port_display(),
            sources.join(", ")
        )
    }
}

/// Returns `true` if both rules are of the same type.
///
/// Sources are excluded from the comparison so that two rules of one type
/// can be diffed address by address.
pub fn matches(desired: &PermissionRule, observed: &PermissionRule) -> bool {
    desired.protocol == observed.protocol
        && desired.from_port == observed.from_port
        && desired.to_port == observed.to_port
}

/// Desired state of a security group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupSpec {
    #[serde(alias = "group_name")]
    pub name: String,
    #[serde(default, alias = "group_description")]
    pub description: Option<String>,
    #[serde(default, alias = "vpc_id")]
    pub network_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
}

impl GroupSpec {
    pub fn new(
        name: impl Into<String>,
        network_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            network_id: network_id.into(),
            region: region.into(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, rule: PermissionRule) -> Self {
        self.permissions.push(rule);
        self
    }

    /// Description to create the group with.
    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }
}

/// Live state of a security group as fetched from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub permissions: Vec<PermissionRule>,
}

/// Outcome of every public reconciliation operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub up_to_date: bool,
    pub group_id: Option<String>,
    pub to_add: Vec<PermissionRule>,
    pub to_delete: Vec<PermissionRule>,
}

impl ReconciliationResult {
    /// The hard-failure shape: group missing or could not be created.
    pub fn failure() -> Self {
        Self {
            up_to_date: false,
            group_id: None,
            to_add: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.group_id.is_none()
    }

    /// Returns `true` if nothing needed adding or deleting.
    pub fn is_in_sync(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_ignores_sources() {
        let a = PermissionRule::new(Protocol::Tcp, 80, 80, ["10.0.0.0/8"]);
        let b = PermissionRule::new(Protocol::Tcp, 80, 80, ["192.168.0.0/16"]);
        assert!(matches(&a, &b));
    }

    #[test]
    fn test_matches_requires_same_protocol_and_ports() {
        let tcp = PermissionRule::new(Protocol::Tcp, 53, 53, ["0.0.0.0/0"]);
        let udp = PermissionRule::new(Protocol::Udp, 53, 53, ["0.0.0.0/0"]);
        let range = PermissionRule::new(Protocol::Tcp, 53, 54, ["0.0.0.0/0"]);
        assert!(!matches(&tcp, &udp));
        assert!(!matches(&tcp, &range));
    }

    #[test]
    fn test_icmp_wildcard_matches_only_wildcard() {
        let any = PermissionRule::icmp_any(["10.0.0.0/8"]);
        let echo = PermissionRule::new(Protocol::Icmp, 8, 0, ["10.0.0.0/8"]);
        assert!(matches(&any, &PermissionRule::icmp_any(Vec::<String>::new())));
        assert!(!matches(&any, &echo));
    }

    #[test]
    fn test_port_display() {
        assert_eq!(PermissionRule::new(Protocol::Tcp, 22, 22, ["a"]).port_display(), "22");
        assert_eq!(
            PermissionRule::new(Protocol::Tcp, 8000, 9000, ["a"]).port_display(),
            "8000-9000"
        );
        assert_eq!(PermissionRule::icmp_any(["a"]).port_display(), "any");
    }

    #[test]
    fn test_rule_display() {
        let rule = PermissionRule::new(Protocol::Udp, 53, 53, ["10.0.0.0/8", "1.1.1.1/32"]);
        assert_eq!(rule.to_string(), "udp 53 from [1.1.1.1/32, 10.0.0.0/8]");
    }

    #[test]
    fn test_spec_accepts_legacy_keys() {
        let json = r#"{
            "group_name": "web",
            "group_description": "web tier",
            "vpc_id": "vpc-123",
            "region": "us-east-1",
            "permissions": [
                {"protocol": "tcp", "from_port": 443, "to_port": 443, "ips": ["0.0.0.0/0"]}
            ]
        }"#;
        let spec: GroupSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.network_id, "vpc-123");
        assert_eq!(spec.description.as_deref(), Some("web tier"));
        assert_eq!(spec.permissions[0].sources.len(), 1);
    }

    #[test]
    fn test_description_placeholder() {
        let spec = GroupSpec::new("web", "vpc-1", "us-east-1");
        assert_eq!(spec.description_or_default(), "none");
    }

    #[test]
    fn test_failure_shape() {
        let result = ReconciliationResult::failure();
        assert!(!result.up_to_date);
        assert!(result.is_failure());
        assert!(result.is_in_sync());
    }
}
