//! Provider-native rule shapes and their translation
//!
//! The gateway speaks the cloud provider's vocabulary: a permission carries
//! `ipProtocol`, `fromPort`, `toPort` and a list of `ipRanges` entries rather
//! than a bare source set. This module owns the conversion to and from
//! [`PermissionRule`] so the reconciler never sees the native shape.

use crate::core::error::{Error, Result};
use crate::core::permission::{ObservedGroup, PermissionRule, Protocol};
use serde::{Deserialize, Serialize};

/// One `ipRanges` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpRange {
    pub cidr_ip: String,
}

/// A permission as the provider describes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IpPermission {
    pub ip_protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    #[serde(default)]
    pub ip_ranges: Vec<IpRange>,
}

impl IpPermission {
    pub fn cidrs(&self) -> impl Iterator<Item = &str> {
        self.ip_ranges.iter().map(|r| r.cidr_ip.as_str())
    }

    /// Returns `true` if both permissions have the same protocol and ports.
    pub fn same_type(&self, other: &IpPermission) -> bool {
        self.ip_protocol == other.ip_protocol
            && self.from_port == other.from_port
            && self.to_port == other.to_port
    }
}

/// A security group as the provider describes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupInfo {
    pub group_id: String,
    pub group_name: String,
    #[serde(default)]
    pub group_description: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub ip_permissions: Vec<IpPermission>,
}

impl From<&PermissionRule> for IpPermission {
    fn from(rule: &PermissionRule) -> Self {
        Self {
            ip_protocol: rule.protocol.to_string(),
            from_port: rule.from_port,
            to_port: rule.to_port,
            ip_ranges: rule
                .sources
                .iter()
                .map(|cidr| IpRange {
                    cidr_ip: cidr.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<&IpPermission> for PermissionRule {
    type Error = Error;

    fn try_from(perm: &IpPermission) -> Result<Self> {
        let protocol: Protocol = perm.ip_protocol.parse().map_err(|_| Error::Gateway {
            code: "InvalidPermission.Malformed".to_string(),
            message: format!("unsupported protocol '{}'", perm.ip_protocol),
        })?;
        Ok(PermissionRule::new(
            protocol,
            perm.from_port,
            perm.to_port,
            perm.cidrs(),
        ))
    }
}

impl TryFrom<SecurityGroupInfo> for ObservedGroup {
    type Error = Error;

    fn try_from(info: SecurityGroupInfo) -> Result<Self> {
        let permissions = info
            .ip_permissions
            .iter()
            .map(PermissionRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: info.group_id,
            name: info.group_name,
            description: info.group_description,
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_json_shape() {
        let json = r#"{
            "ipProtocol": "tcp",
            "fromPort": 22,
            "toPort": 22,
            "ipRanges": [{"cidrIp": "10.0.0.0/8"}, {"cidrIp": "10.0.0.0/8"}]
        }"#;
        let perm: IpPermission = serde_json::from_str(json).unwrap();
        let rule = PermissionRule::try_from(&perm).unwrap();

        assert_eq!(rule.protocol, Protocol::Tcp);
        // Repeated ranges collapse into one source
        assert_eq!(rule.sources.len(), 1);
    }

    #[test]
    fn test_rule_to_native() {
        let rule = PermissionRule::icmp_any(["192.168.0.0/16"]);
        let perm = IpPermission::from(&rule);

        assert_eq!(perm.ip_protocol, "icmp");
        assert_eq!(perm.from_port, -1);
        assert_eq!(perm.ip_ranges[0].cidr_ip, "192.168.0.0/16");
        assert_eq!(PermissionRule::try_from(&perm).unwrap(), rule);
    }

    #[test]
    fn test_same_type_ignores_ranges() {
        let ssh = IpPermission::from(&PermissionRule::new(Protocol::Tcp, 22, 22, ["10.0.0.0/8"]));
        let other_source = IpPermission::from(&PermissionRule::new(Protocol::Tcp, 22, 22, ["0.0.0.0/0"]));
        let udp = IpPermission::from(&PermissionRule::new(Protocol::Udp, 22, 22, ["10.0.0.0/8"]));

        assert!(ssh.same_type(&other_source));
        assert!(!ssh.same_type(&udp));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let perm = IpPermission {
            ip_protocol: "-1".to_string(),
            from_port: 0,
            to_port: 0,
            ip_ranges: vec![],
        };
        let err = PermissionRule::try_from(&perm).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol"));
    }

    #[test]
    fn test_group_translation() {
        let info = SecurityGroupInfo {
            group_id: "sg-1".to_string(),
            group_name: "web".to_string(),
            group_description: "web tier".to_string(),
            vpc_id: "vpc-1".to_string(),
            ip_permissions: vec![IpPermission::from(&PermissionRule::new(
                Protocol::Tcp,
                80,
                80,
                ["0.0.0.0/0"],
            ))],
        };
        let observed = ObservedGroup::try_from(info).unwrap();
        assert_eq!(observed.id, "sg-1");
        assert_eq!(observed.permissions.len(), 1);
    }
}
