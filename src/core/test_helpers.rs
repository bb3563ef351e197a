//! Shared test utilities for core module tests
//!
//! Provides an in-memory gateway with call recording and failure injection.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::file_gateway::GroupStore;
use crate::core::gateway::{GroupLookup, RuleGateway};
use crate::core::permission::{GroupSpec, PermissionRule, Protocol};
use crate::core::provider::{IpPermission, SecurityGroupInfo};
use std::sync::Mutex;

pub const TEST_REGION: &str = "us-east-1";
pub const TEST_VPC: &str = "vpc-0a1b2c3d";

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Fetch(String),
    Create(String),
    Add(String, IpPermission),
    Delete(String, IpPermission),
}

impl GatewayCall {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, GatewayCall::Fetch(_))
    }
}

#[derive(Debug, Default)]
struct Failures {
    fetch: bool,
    decline_create: bool,
    error_create: bool,
    /// add/delete calls for these from_ports return `Ok(false)`
    decline_ports: Vec<i32>,
    /// add/delete calls for these from_ports return `Err`
    error_ports: Vec<i32>,
}

/// [`RuleGateway`] over an in-memory [`GroupStore`]
#[derive(Debug, Default)]
pub struct MemoryGateway {
    store: Mutex<GroupStore>,
    calls: Mutex<Vec<GatewayCall>>,
    failures: Mutex<Failures>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a group in the test network holding `rules` and returns its id.
    pub fn with_group(&self, name: &str, rules: &[PermissionRule]) -> String {
        self.with_group_in(name, TEST_VPC, rules)
    }

    pub fn with_group_in(&self, name: &str, network_id: &str, rules: &[PermissionRule]) -> String {
        let mut store = self.store.lock().unwrap();
        let id = store.create(TEST_REGION, name, "seeded", network_id).unwrap();
        for rule in rules {
            store
                .authorize(TEST_REGION, &id, &IpPermission::from(rule))
                .unwrap();
        }
        id
    }

    pub fn fail_fetch(&self) {
        self.failures.lock().unwrap().fetch = true;
    }

    pub fn decline_create(&self) {
        self.failures.lock().unwrap().decline_create = true;
    }

    pub fn error_create(&self) {
        self.failures.lock().unwrap().error_create = true;
    }

    pub fn decline_port(&self, port: i32) {
        self.failures.lock().unwrap().decline_ports.push(port);
    }

    pub fn error_port(&self, port: i32) {
        self.failures.lock().unwrap().error_ports.push(port);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().filter(GatewayCall::is_mutating).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn group(&self, group_id: &str) -> Option<SecurityGroupInfo> {
        self.store
            .lock()
            .unwrap()
            .find(TEST_REGION, GroupLookup::Id(group_id))
            .cloned()
    }

    /// Live rules of a group in core form.
    pub fn rules(&self, group_id: &str) -> Vec<PermissionRule> {
        self.group(group_id)
            .map(|g| {
                g.ip_permissions
                    .iter()
                    .map(|p| PermissionRule::try_from(p).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(&self, permission: &IpPermission) -> Option<Result<bool>> {
        let failures = self.failures.lock().unwrap();
        if failures.error_ports.contains(&permission.from_port) {
            return Some(Err(Error::gateway("RequestLimitExceeded", "injected")));
        }
        if failures.decline_ports.contains(&permission.from_port) {
            return Some(Ok(false));
        }
        None
    }
}

impl RuleGateway for MemoryGateway {
    fn region(&self) -> &str {
        TEST_REGION
    }

    async fn fetch_group(&self, lookup: GroupLookup<'_>) -> Result<Option<SecurityGroupInfo>> {
        self.record(GatewayCall::Fetch(lookup.to_string()));
        if self.failures.lock().unwrap().fetch {
            return Err(Error::gateway("UnauthorizedOperation", "injected"));
        }
        Ok(self.store.lock().unwrap().find(TEST_REGION, lookup).cloned())
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<Option<String>> {
        self.record(GatewayCall::Create(name.to_string()));
        {
            let failures = self.failures.lock().unwrap();
            if failures.error_create {
                return Err(Error::gateway("UnauthorizedOperation", "injected"));
            }
            if failures.decline_create {
                return Ok(None);
            }
        }
        self.store
            .lock()
            .unwrap()
            .create(TEST_REGION, name, description, network_id)
            .map(Some)
    }

    async fn add_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool> {
        self.record(GatewayCall::Add(group_id.to_string(), permission.clone()));
        if let Some(result) = self.injected(permission) {
            return result;
        }
        self.store
            .lock()
            .unwrap()
            .authorize(TEST_REGION, group_id, permission)?;
        Ok(true)
    }

    async fn delete_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool> {
        self.record(GatewayCall::Delete(group_id.to_string(), permission.clone()));
        if let Some(result) = self.injected(permission) {
            return result;
        }
        self.store
            .lock()
            .unwrap()
            .revoke(TEST_REGION, group_id, permission)?;
        Ok(true)
    }
}

/// TCP rule on a single port.
pub fn tcp(port: i32, sources: &[&str]) -> PermissionRule {
    PermissionRule::new(Protocol::Tcp, port, port, sources.iter().copied())
}

/// Spec in the test network with the given rules.
pub fn spec(name: &str, rules: Vec<PermissionRule>) -> GroupSpec {
    let mut spec = GroupSpec::new(name, TEST_VPC, TEST_REGION);
    spec.permissions = rules;
    spec
}
