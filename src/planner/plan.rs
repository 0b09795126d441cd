//! The plan artifact.

use super::change::{Action, ChangeRecord};
use crate::addrs::ResourceAddress;
use crate::state::State;
use crate::value::{Diagnostics, MarkedValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Plan file format version.
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// What a plan is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Converge infrastructure on the configuration.
    #[default]
    Normal,
    /// Destroy everything in state.
    Destroy,
    /// Only update state from reality.
    RefreshOnly,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Destroy => write!(f, "destroy"),
            Self::RefreshOnly => write!(f, "refresh-only"),
        }
    }
}

/// An immutable set of changes computed against one state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// File format version.
    pub format_version: u32,
    /// Unique plan ID.
    pub id: Uuid,
    /// When the plan was made.
    pub created_at: DateTime<Utc>,
    /// Plan mode.
    pub mode: PlanMode,
    /// Changes, by graph level and then address.
    pub changes: Vec<ChangeRecord>,
    /// Graph nodes grouped by level.
    pub levels: Vec<Vec<String>>,
    /// Everything reported while planning.
    pub diagnostics: Diagnostics,
    /// Fingerprint of the stored state the plan was made against.
    pub prior_state_fingerprint: String,
    /// That state after refresh; apply starts from it.
    pub prior_state: Option<State>,
    /// Hash of the configuration.
    pub config_hash: String,
    /// Root variable values used.
    pub variables: BTreeMap<String, MarkedValue>,
    /// Planned root outputs.
    pub outputs: BTreeMap<String, MarkedValue>,
}

/// Action counts of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Objects imported.
    pub import: usize,
    /// Objects created, replacements included.
    pub add: usize,
    /// Objects updated in place.
    pub change: usize,
    /// Objects destroyed, replacements included.
    pub destroy: usize,
}

impl PlanSummary {
    /// True when apply would do nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.import == 0 && self.add == 0 && self.change == 0 && self.destroy == 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan: ")?;
        if self.import > 0 {
            write!(f, "{} to import, ", self.import)?;
        }
        write!(
            f,
            "{} to add, {} to change, {} to destroy.",
            self.add, self.change, self.destroy
        )
    }
}

impl Plan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(mode: PlanMode, config_hash: impl Into<String>, prior_state_fingerprint: impl Into<String>) -> Self {
        Self {
            format_version: PLAN_FORMAT_VERSION,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            mode,
            changes: Vec::new(),
            levels: Vec::new(),
            diagnostics: Diagnostics::new(),
            prior_state_fingerprint: prior_state_fingerprint.into(),
            prior_state: None,
            config_hash: config_hash.into(),
            variables: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// True if any diagnostic is an error; such a plan cannot be applied.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// True if applying would change anything.
    ///
    /// A refresh-only plan changes state whenever refresh saw drift.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(ChangeRecord::is_change)
            || (self.mode == PlanMode::RefreshOnly && self.refresh_drifted())
    }

    fn refresh_drifted(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == crate::value::DiagnosticKind::Drift)
    }

    /// The change for `address`.
    #[must_use]
    pub fn change(&self, address: &ResourceAddress) -> Option<&ChangeRecord> {
        self.changes.iter().find(|c| &c.address == address)
    }

    /// Counts changes by action.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            if change.import_id.is_some() {
                summary.import += 1;
            }
            match change.action {
                Action::NoOp => {}
                Action::Create => summary.add += 1,
                Action::Update => summary.change += 1,
                Action::Replace => {
                    summary.add += 1;
                    summary.destroy += 1;
                }
                Action::Destroy => summary.destroy += 1,
            }
        }
        summary
    }

    /// Orders changes by graph level, then address.
    pub fn sort_changes(&mut self, level: impl Fn(&ResourceAddress) -> usize) {
        self.changes
            .sort_by(|a, b| level(&a.address).cmp(&level(&b.address)).then_with(|| a.address.cmp(&b.address)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChangeReason;

    fn change(name: &str, action: Action) -> ChangeRecord {
        ChangeRecord::new(ResourceAddress::new("null_resource", name), action, ChangeReason::Unchanged)
    }

    #[test]
    fn test_summary() {
        let mut plan = Plan::new(PlanMode::Normal, "h", "f");
        plan.changes = vec![
            change("a", Action::Create),
            change("b", Action::Replace),
            change("c", Action::Update),
            change("d", Action::NoOp).with_import("x"),
            change("e", Action::NoOp),
        ];
        let summary = plan.summary();
        assert_eq!(
            summary,
            PlanSummary {
                import: 1,
                add: 2,
                change: 1,
                destroy: 1
            }
        );
        assert_eq!(summary.to_string(), "Plan: 1 to import, 2 to add, 1 to change, 1 to destroy.");
        assert!(plan.has_changes());
    }

    #[test]
    fn test_no_changes() {
        let mut plan = Plan::new(PlanMode::Normal, "h", "f");
        plan.changes = vec![change("a", Action::NoOp)];
        assert!(!plan.has_changes());
        assert!(plan.summary().is_empty());
        assert_eq!(plan.summary().to_string(), "Plan: 0 to add, 0 to change, 0 to destroy.");
    }

    #[test]
    fn test_sort_changes_by_level_then_address() {
        let mut plan = Plan::new(PlanMode::Normal, "h", "f");
        plan.changes = vec![change("z", Action::Create), change("b", Action::Create), change("a", Action::Create)];
        plan.sort_changes(|a| usize::from(a.name != "z"));
        let order: Vec<&str> = plan.changes.iter().map(|c| c.address.name.as_str()).collect();
        assert_eq!(order, vec!["z", "a", "b"]);
    }
}
