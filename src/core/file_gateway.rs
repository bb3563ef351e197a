//! Local provider backed by a JSON state document
//!
//! [`JsonFileGateway`] keeps security groups in a JSON file keyed by region and
//! enforces the provider's rules on every call:
//!
//! - group names are unique per network (`InvalidGroup.Duplicate`)
//! - authorizing a source that is already present fails
//!   (`InvalidPermission.Duplicate`)
//! - revoking a source that is not present fails (`InvalidPermission.NotFound`)
//! - sources of one rule type are merged into a single permission, and a
//!   permission whose last source is revoked disappears
//!
//! The state logic lives in [`GroupStore`]; the gateway only loads, mutates
//! and atomically rewrites the document.

use crate::core::error::{Error, Result};
use crate::core::gateway::{GatewayConfig, GroupLookup, RuleGateway};
use crate::core::provider::{IpPermission, IpRange, SecurityGroupInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Every security group known to the local provider, per region
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupStore {
    #[serde(default)]
    pub regions: BTreeMap<String, Vec<SecurityGroupInfo>>,
}

impl GroupStore {
    pub fn find(&self, region: &str, lookup: GroupLookup<'_>) -> Option<&SecurityGroupInfo> {
        self.regions
            .get(region)?
            .iter()
            .find(|group| lookup.matches(group))
    }

    fn find_mut(&mut self, region: &str, group_id: &str) -> Result<&mut SecurityGroupInfo> {
        self.regions
            .get_mut(region)
            .and_then(|groups| groups.iter_mut().find(|g| g.group_id == group_id))
            .ok_or_else(|| Error::gateway("InvalidGroup.NotFound", group_id))
    }

    pub fn create(
        &mut self,
        region: &str,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<String> {
        if self
            .find(region, GroupLookup::Name {
                name,
                network_id: Some(network_id),
            })
            .is_some()
        {
            return Err(Error::gateway(
                "InvalidGroup.Duplicate",
                format!("group '{name}' already exists in {network_id}"),
            ));
        }

        let group_id = format!("sg-{}", &Uuid::new_v4().simple().to_string()[..17]);
        self.regions
            .entry(region.to_string())
            .or_default()
            .push(SecurityGroupInfo {
                group_id: group_id.clone(),
                group_name: name.to_string(),
                group_description: description.to_string(),
                vpc_id: network_id.to_string(),
                ip_permissions: Vec::new(),
            });
        Ok(group_id)
    }

    pub fn authorize(
        &mut self,
        region: &str,
        group_id: &str,
        permission: &IpPermission,
    ) -> Result<()> {
        if permission.ip_ranges.is_empty() {
            return Err(Error::gateway(
                "MissingParameter",
                "authorize requires at least one ipRanges entry",
            ));
        }

        let group = self.find_mut(region, group_id)?;
        let Some(pos) = group
            .ip_permissions
            .iter()
            .position(|p| p.same_type(permission))
        else {
            let mut fresh = permission.clone();
            fresh.ip_ranges = dedup_ranges(permission.cidrs());
            group.ip_permissions.push(fresh);
            return Ok(());
        };

        let existing = &mut group.ip_permissions[pos];
        if let Some(dup) = permission
            .cidrs()
            .find(|cidr| existing.cidrs().any(|c| c == *cidr))
        {
            return Err(Error::gateway(
                "InvalidPermission.Duplicate",
                format!("{dup} is already authorized for {group_id}"),
            ));
        }

        let merged = dedup_ranges(existing.cidrs().chain(permission.cidrs()));
        existing.ip_ranges = merged;
        Ok(())
    }

    pub fn revoke(&mut self, region: &str, group_id: &str, permission: &IpPermission) -> Result<()> {
        let group = self.find_mut(region, group_id)?;
        let Some(pos) = group
            .ip_permissions
            .iter()
            .position(|p| p.same_type(permission))
        else {
            return Err(Error::gateway(
                "InvalidPermission.NotFound",
                format!(
                    "no {} {}-{} rule in {group_id}",
                    permission.ip_protocol, permission.from_port, permission.to_port
                ),
            ));
        };

        let existing = &mut group.ip_permissions[pos];
        if let Some(missing) = permission
            .cidrs()
            .find(|cidr| !existing.cidrs().any(|c| c == *cidr))
        {
            return Err(Error::gateway(
                "InvalidPermission.NotFound",
                format!("{missing} is not authorized for {group_id}"),
            ));
        }

        existing
            .ip_ranges
            .retain(|r| !permission.cidrs().any(|c| c == r.cidr_ip));
        if existing.ip_ranges.is_empty() {
            group.ip_permissions.remove(pos);
        }
        Ok(())
    }
}

fn dedup_ranges<'a>(cidrs: impl Iterator<Item = &'a str>) -> Vec<IpRange> {
    let mut ranges: Vec<IpRange> = Vec::new();
    for cidr in cidrs {
        if !ranges.iter().any(|r| r.cidr_ip == cidr) {
            ranges.push(IpRange {
                cidr_ip: cidr.to_string(),
            });
        }
    }
    ranges
}

/// [`RuleGateway`] persisting provider state to a JSON document
pub struct JsonFileGateway {
    config: GatewayConfig,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonFileGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.config.state_path
    }

    /// Loads the state document; a missing file is an empty provider.
    pub async fn load(&self) -> Result<GroupStore> {
        match tokio::fs::read_to_string(&self.config.state_path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GroupStore::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, store: &GroupStore) -> Result<()> {
        let json = serde_json::to_string_pretty(store)?;
        let path = self.config.state_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, json.as_bytes()))
            .await
            .map_err(|e| Error::Internal(format!("state writer panicked: {e}")))?
    }

    async fn mutate<T>(&self, op: impl FnOnce(&mut GroupStore, &str) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut store = self.load().await?;
        let value = op(&mut store, &self.config.region)?;
        self.save(&store).await?;
        Ok(value)
    }
}

/// Writes `data` to a temp file next to `path`, then renames it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl RuleGateway for JsonFileGateway {
    fn region(&self) -> &str {
        &self.config.region
    }

    async fn fetch_group(&self, lookup: GroupLookup<'_>) -> Result<Option<SecurityGroupInfo>> {
        debug!("Describing security group by {lookup} in {}", self.config.region);
        let store = self.load().await?;
        Ok(store.find(&self.config.region, lookup).cloned())
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<Option<String>> {
        let group_id = self
            .mutate(|store, region| store.create(region, name, description, network_id))
            .await?;
        info!("Created security group {name} ({group_id}) in {network_id}");
        Ok(Some(group_id))
    }

    async fn add_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool> {
        self.mutate(|store, region| store.authorize(region, group_id, permission))
            .await?;
        Ok(true)
    }

    async fn delete_rule(&self, group_id: &str, permission: &IpPermission) -> Result<bool> {
        self.mutate(|store, region| store.revoke(region, group_id, permission))
            .await?;
        Ok(true)
    }
}
