//! Input validation for group specs
//!
//! The reconciler accepts whatever it is given; these checks run where specs
//! enter the program (CLI, stored spec files) so that mistakes are reported
//! before any provider call is made.
//!
//! Hard problems are returned as `Err`. Suspicious but legal input (duplicate
//! rule types, world-open admin ports) is returned as warnings.

use crate::core::error::Error;
use crate::core::permission::{GroupSpec, ICMP_WILDCARD, PermissionRule, Protocol};
use ipnetwork::IpNetwork;
use std::collections::BTreeSet;

/// Validates a security group name.
///
/// # Errors
///
/// Returns `Err` if the name is empty, longer than 255 characters, or
/// contains control characters.
pub fn validate_group_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Group name cannot be empty".to_string());
    }

    if name.len() > 255 {
        return Err("Group name too long (max 255 characters)".to_string());
    }

    if name.chars().any(char::is_control) {
        return Err("Group name contains control characters".to_string());
    }

    Ok(())
}

/// Validates the port fields for a protocol.
///
/// TCP/UDP ports form an inclusive range within `0..=65535`. ICMP ports hold
/// type and code: either the `-1` wildcard or a value in `0..=255`.
///
/// # Errors
///
/// Returns `Err` if a port is out of range or a TCP/UDP range is reversed.
pub fn validate_ports(protocol: Protocol, from_port: i32, to_port: i32) -> Result<(), String> {
    if protocol.has_port_range() {
        for port in [from_port, to_port] {
            if !(0..=65_535).contains(&port) {
                return Err(format!("Port {port} out of range (0-65535)"));
            }
        }
        if from_port > to_port {
            return Err(format!(
                "Invalid port range: start ({from_port}) must be <= end ({to_port})"
            ));
        }
        return Ok(());
    }

    for value in [from_port, to_port] {
        if value != ICMP_WILDCARD && !(0..=255).contains(&value) {
            return Err(format!("ICMP type/code {value} out of range (-1 or 0-255)"));
        }
    }
    Ok(())
}

/// Validates a CIDR source string.
///
/// # Errors
///
/// Returns `Err` if the source is not an IPv4/IPv6 network with a prefix
/// length. Bare addresses are rejected so that the intent is explicit.
pub fn validate_source(source: &str) -> Result<IpNetwork, String> {
    if !source.contains('/') {
        return Err(format!("Source '{source}' needs a prefix length (e.g. {source}/32)"));
    }
    source
        .parse::<IpNetwork>()
        .map_err(|e| format!("Invalid CIDR '{source}': {e}"))
}

/// Returns a warning for each rule type that appears more than once.
///
/// Only the first occurrence of a type is matched against live state.
pub fn check_duplicate_types(spec: &GroupSpec) -> Vec<String> {
    let mut seen = BTreeSet::new();
    spec.permissions
        .iter()
        .filter(|rule| !seen.insert(rule.rule_type()))
        .map(|rule| {
            format!(
                "Duplicate {} {} rule: only the first one is reconciled",
                rule.protocol,
                rule.port_display()
            )
        })
        .collect()
}

/// Warns when a non-web port is open to the whole internet.
pub fn check_open_world(rule: &PermissionRule) -> Option<String> {
    let web_only = rule.protocol == Protocol::Tcp
        && [80, 443].contains(&rule.from_port)
        && rule.from_port == rule.to_port;
    if web_only {
        return None;
    }

    let open: Vec<&str> = rule
        .sources
        .iter()
        .map(String::as_str)
        .filter(|s| matches!(*s, "0.0.0.0/0" | "::/0"))
        .collect();
    if open.is_empty() {
        return None;
    }

    Some(format!(
        "{} {} is open to {}",
        rule.protocol,
        rule.port_display(),
        open.join(" and ")
    ))
}

/// Validates a whole spec.
///
/// # Errors
///
/// Returns the first hard problem as [`Error::Validation`]; otherwise
/// returns the collected warnings.
pub fn validate_group_spec(spec: &GroupSpec) -> Result<Vec<String>, Error> {
    let invalid = |field: String, message: String| Error::Validation { field, message };

    validate_group_name(&spec.name).map_err(|m| invalid("name".to_string(), m))?;

    let mut warnings = Vec::new();
    for (idx, rule) in spec.permissions.iter().enumerate() {
        let field = format!("permissions[{idx}]");

        validate_ports(rule.protocol, rule.from_port, rule.to_port)
            .map_err(|m| invalid(field.clone(), m))?;

        if rule.sources.is_empty() {
            return Err(invalid(field, "Rule has no sources".to_string()));
        }
        for source in &rule.sources {
            validate_source(source).map_err(|m| invalid(field.clone(), m))?;
        }

        warnings.extend(check_open_world(rule));
    }

    warnings.extend(check_duplicate_types(spec));
    Ok(warnings)
}
