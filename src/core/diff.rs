//! Diff engine: desired vs observed permission sets
//!
//! Rules are matched by type (see [`matches`]). For a matched pair the
//! difference is split per source address: desired sources missing from the
//! live rule become an add entry, live sources not desired become a delete
//! entry. Unmatched desired rules are added whole, and observed rules no
//! desired rule consumed are deleted whole.
//!
//! Actions are produced lazily by [`DiffActions`] in a fixed order: spec
//! order first (add before delete for each rule), then leftover observed
//! rules in observed order. [`diff`] walks that sequence and, when applying,
//! submits each action before the next one is computed. The observed slice is
//! never mutated; consumed entries are tracked by position.

use crate::core::permission::{PermissionRule, matches};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Whether an action authorizes or revokes sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "delete")]
    Delete,
}

/// A single add or delete to submit to the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleAction {
    pub kind: ActionKind,
    pub rule: PermissionRule,
}

impl RuleAction {
    pub fn add(rule: PermissionRule) -> Self {
        Self {
            kind: ActionKind::Add,
            rule,
        }
    }

    pub fn delete(rule: PermissionRule) -> Self {
        Self {
            kind: ActionKind::Delete,
            rule,
        }
    }
}

/// Lazy, ordered sequence of the actions reconciling `observed` to `spec`.
pub struct DiffActions<'a> {
    spec: std::slice::Iter<'a, PermissionRule>,
    observed: &'a [PermissionRule],
    consumed: BTreeSet<usize>,
    pending: VecDeque<RuleAction>,
    leftover: usize,
}

impl<'a> DiffActions<'a> {
    pub fn new(spec: &'a [PermissionRule], observed: &'a [PermissionRule]) -> Self {
        Self {
            spec: spec.iter(),
            observed,
            consumed: BTreeSet::new(),
            pending: VecDeque::with_capacity(2),
            leftover: 0,
        }
    }

    /// Queues the actions for one desired rule and consumes its match.
    fn compare(&mut self, desired: &PermissionRule) {
        let observed = self.observed;
        let found = observed
            .iter()
            .enumerate()
            .find(|(idx, candidate)| !self.consumed.contains(idx) && matches(desired, candidate));

        let Some((idx, observed)) = found else {
            self.pending.push_back(RuleAction::add(desired.clone()));
            return;
        };

        let missing: BTreeSet<String> = desired
            .sources
            .difference(&observed.sources)
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.pending
                .push_back(RuleAction::add(desired.with_sources(missing)));
        }

        let extra: BTreeSet<String> = observed
            .sources
            .difference(&desired.sources)
            .cloned()
            .collect();
        if !extra.is_empty() {
            self.pending
                .push_back(RuleAction::delete(desired.with_sources(extra)));
        }

        self.consumed.insert(idx);
    }
}

impl Iterator for DiffActions<'_> {
    type Item = RuleAction;

    fn next(&mut self) -> Option<RuleAction> {
        loop {
            if let Some(action) = self.pending.pop_front() {
                return Some(action);
            }

            if let Some(desired) = self.spec.next() {
                self.compare(desired);
                continue;
            }

            while self.leftover < self.observed.len() {
                let idx = self.leftover;
                self.leftover += 1;
                if !self.consumed.contains(&idx) {
                    return Some(RuleAction::delete(self.observed[idx].clone()));
                }
            }

            return None;
        }
    }
}

/// Result of one diff pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    pub to_add: Vec<PermissionRule>,
    pub to_delete: Vec<PermissionRule>,
    /// Number of apply calls issued
    pub applied: usize,
    pub any_apply_failed: bool,
}

impl DiffOutcome {
    fn record(&mut self, action: RuleAction) {
        match action.kind {
            ActionKind::Add => self.to_add.push(action.rule),
            ActionKind::Delete => self.to_delete.push(action.rule),
        }
    }
}

/// Computes the diff without applying anything.
pub fn plan(spec: &[PermissionRule], observed: &[PermissionRule]) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();
    for action in DiffActions::new(spec, observed) {
        outcome.record(action);
    }
    outcome
}

/// Computes the diff and, when `apply` is set, submits every action through
/// `apply_fn` as soon as it is computed.
///
/// A failed apply does not stop the pass; it only sets `any_apply_failed`.
/// Every action stays recorded in `to_add`/`to_delete` whatever its outcome.
pub async fn diff<F>(
    spec: &[PermissionRule],
    observed: &[PermissionRule],
    apply: bool,
    mut apply_fn: F,
) -> DiffOutcome
where
    F: AsyncFnMut(&RuleAction) -> bool,
{
    let mut outcome = DiffOutcome::default();
    for action in DiffActions::new(spec, observed) {
        if apply {
            outcome.applied += 1;
            if !apply_fn(&action).await {
                outcome.any_apply_failed = true;
            }
        }
        outcome.record(action);
    }
    outcome
}
