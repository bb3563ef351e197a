//! Reconciliation of a declared group spec against live state
//!
//! One [`Reconciler`] call fetches the group, runs the diff engine, and in
//! enforce mode submits every action to the gateway as it is computed. Calls
//! go out one at a time in diff order and are never rolled back: a failure
//! part way through leaves the group partially reconciled, and the returned
//! lists show exactly what was attempted.
//!
//! Gateway errors never escape. A missing group, a failed create, or a spec
//! naming a region other than the gateway's becomes
//! [`ReconciliationResult::failure`]; a failed add/delete only clears
//! `up_to_date`.
//!
//! Concurrent reconciliations of the same group are not coordinated here;
//! callers must serialize them.

use crate::core::diff::{self, ActionKind, RuleAction};
use crate::core::gateway::{GroupLookup, RuleGateway};
use crate::core::permission::{GroupSpec, ObservedGroup, ReconciliationResult};
use crate::core::provider::IpPermission;
use tracing::{debug, error, info, warn};

/// Drives reconciliation cycles through a [`RuleGateway`]
pub struct Reconciler<G> {
    gateway: G,
}

impl<G: RuleGateway> Reconciler<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Computes the diff without issuing any mutating call.
    pub async fn audit(&self, spec: &GroupSpec) -> ReconciliationResult {
        self.reconcile(spec, true).await
    }

    /// Computes the diff and applies every action.
    pub async fn update(&self, spec: &GroupSpec) -> ReconciliationResult {
        self.reconcile(spec, false).await
    }

    pub async fn reconcile(&self, spec: &GroupSpec, audit_only: bool) -> ReconciliationResult {
        if !self.serves_region(&spec.region) {
            return ReconciliationResult::failure();
        }
        let lookup = GroupLookup::by_name(&spec.name, &spec.network_id);
        let Some(observed) = self.fetch_observed(lookup).await else {
            warn!("Security group {} does not exist", spec.name);
            return ReconciliationResult::failure();
        };
        self.reconcile_observed(spec, observed, audit_only).await
    }

    async fn reconcile_observed(
        &self,
        spec: &GroupSpec,
        observed: ObservedGroup,
        audit_only: bool,
    ) -> ReconciliationResult {
        let group_id = observed.id;
        debug!(
            "Reconciling {} ({group_id}): {} desired, {} live rules, audit_only={audit_only}",
            spec.name,
            spec.permissions.len(),
            observed.permissions.len()
        );

        let outcome = diff::diff(
            &spec.permissions,
            &observed.permissions,
            !audit_only,
            async |action: &RuleAction| self.apply_action(&group_id, action).await,
        )
        .await;

        let up_to_date = if audit_only {
            outcome.to_add.is_empty() && outcome.to_delete.is_empty()
        } else {
            !outcome.any_apply_failed
        };

        info!(
            "{} {} ({group_id}): {} to add, {} to delete, up_to_date={up_to_date}",
            if audit_only { "Audited" } else { "Updated" },
            spec.name,
            outcome.to_add.len(),
            outcome.to_delete.len()
        );

        ReconciliationResult {
            up_to_date,
            group_id: Some(group_id),
            to_add: outcome.to_add,
            to_delete: outcome.to_delete,
        }
    }

    /// Creates the group, then populates it from the spec.
    pub async fn create(&self, spec: &GroupSpec) -> ReconciliationResult {
        if !self.serves_region(&spec.region) {
            return ReconciliationResult::failure();
        }
        let created = self
            .gateway
            .create_group(&spec.name, spec.description_or_default(), &spec.network_id)
            .await;

        match created {
            Ok(Some(group_id)) => {
                debug!("Created {} as {group_id}", spec.name);
                // Populate the group just created, never a namesake in another network
                let Some(observed) = self.fetch_observed(GroupLookup::Id(&group_id)).await else {
                    warn!("Created group {group_id} could not be described");
                    return ReconciliationResult::failure();
                };
                self.reconcile_observed(spec, observed, false).await
            }
            Ok(None) => {
                warn!("Failed to create group {}", spec.name);
                ReconciliationResult::failure()
            }
            Err(e) => {
                error!("Failed to create group {}: {e}", spec.name);
                ReconciliationResult::failure()
            }
        }
    }

    /// Snapshots a live group as a spec whose permissions are its current rules.
    pub async fn dump(&self, group_id: &str, network_id: &str, region: &str) -> Option<GroupSpec> {
        if !self.serves_region(region) {
            return None;
        }
        let region = if region.is_empty() {
            self.gateway.region()
        } else {
            region
        };
        let Some(observed) = self.fetch_observed(GroupLookup::Id(group_id)).await else {
            warn!("Security group {group_id} does not exist");
            return None;
        };

        let mut spec = GroupSpec::new(observed.name.clone(), network_id, region);
        spec.description = Some(observed.description.clone());

        // An empty spec audits every live rule as a deletion
        let result = self.reconcile_observed(&spec, observed, true).await;
        spec.permissions = result.to_delete;
        Some(spec)
    }

    /// An empty region means the gateway's own; any other must match it.
    fn serves_region(&self, region: &str) -> bool {
        if region.is_empty() || region == self.gateway.region() {
            return true;
        }
        warn!(
            "Region {region} does not match the gateway region {}",
            self.gateway.region()
        );
        false
    }

    async fn fetch_observed(&self, lookup: GroupLookup<'_>) -> Option<ObservedGroup> {
        match self.gateway.fetch_group(lookup).await {
            Ok(Some(info)) => match ObservedGroup::try_from(info) {
                Ok(observed) => Some(observed),
                Err(e) => {
                    error!("Security group {lookup} has unusable rules: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Failed to describe security group {lookup}: {e}");
                None
            }
        }
    }

    async fn apply_action(&self, group_id: &str, action: &RuleAction) -> bool {
        let permission = IpPermission::from(&action.rule);
        let response = match action.kind {
            ActionKind::Add => self.gateway.add_rule(group_id, &permission).await,
            ActionKind::Delete => self.gateway.delete_rule(group_id, &permission).await,
        };

        match response {
            Ok(true) => {
                info!("{} {} on {group_id}", action.kind, action.rule);
                true
            }
            Ok(false) => {
                warn!("Provider declined {} {} on {group_id}", action.kind, action.rule);
                false
            }
            Err(e) => {
                warn!("Failed to {} {} on {group_id}: {e}", action.kind, action.rule);
                false
            }
        }
    }
}
