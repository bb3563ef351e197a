//! Core reconciliation functionality
//!
//! This module contains the types and logic for reconciling a declared
//! security group against its live state. It provides:
//!
//! - [`permission`]: Rule, spec and result data structures plus the same-type matcher
//! - [`diff`]: The diff engine splitting differences per source address
//! - [`reconcile`]: Audit/update/create/dump orchestration over a gateway
//! - [`gateway`]: The cloud rule gateway contract
//! - [`provider`]: Provider-native rule shapes and translation
//! - [`file_gateway`]: Local provider backed by a JSON state document
//! - [`specs`]: Stored group spec management
//! - [`error`]: Error types for reconciliation operations

pub mod diff;
pub mod error;
pub mod file_gateway;
pub mod gateway;
pub mod permission;
pub mod provider;
pub mod reconcile;
pub mod specs;

#[cfg(test)]
pub mod test_helpers;
