//! State types for tracking managed resources.
//!
//! A [`State`] is the snapshot of every object Strata manages, keyed by
//! resource instance address. Snapshots are immutable once committed; each
//! commit that changes anything bumps `serial` and keeps `lineage`.

use crate::addrs::ResourceAddress;
use crate::value::MarkedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Current version of the state format.
pub const STATE_VERSION: u32 = 1;

/// Maximum number of history entries kept in a snapshot.
const MAX_HISTORY: usize = 100;

/// A complete state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// State format version.
    pub version: u32,
    /// Identity of this state's history; never changes once created.
    pub lineage: String,
    /// Incremented by every commit that changes resources or outputs.
    pub serial: u64,
    /// Managed resource instances.
    #[serde(default)]
    pub resources: BTreeMap<ResourceAddress, ResourceRecord>,
    /// Root module outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputRecord>,
    /// When the state was last written.
    pub last_updated: DateTime<Utc>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// The recorded object behind one resource instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRecord {
    /// Instance address.
    pub address: ResourceAddress,
    /// Provider that manages the object.
    pub provider: String,
    /// Attributes as last observed, without marks.
    pub attributes: MarkedValue,
    /// Attribute paths that were sensitive in configuration.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sensitive_paths: BTreeSet<String>,
    /// Resources this one referenced when it was last applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ResourceAddress>,
}

/// A recorded root output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputRecord {
    /// The value, without marks.
    pub value: MarkedValue,
    /// Whether the value is redacted on display.
    #[serde(default)]
    pub sensitive: bool,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Serial written by the operation.
    pub serial: u64,
    /// Addresses whose records changed.
    pub changed: Vec<String>,
    /// Whether every node succeeded.
    pub success: bool,
    /// Optional error summary.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of state-writing operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// An apply of a normal plan.
    Apply,
    /// An apply of a destroy plan.
    Destroy,
    /// A refresh-only walk.
    Refresh,
    /// Manual removal of a record.
    StateRm,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Creates a new empty state with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: Uuid::new_v4().to_string(),
            serial: 0,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by address.
    #[must_use]
    pub fn get(&self, address: &ResourceAddress) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Adds or replaces a record.
    pub fn set(&mut self, record: ResourceRecord) {
        self.resources.insert(record.address.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record by address.
    pub fn remove(&mut self, address: &ResourceAddress) -> Option<ResourceRecord> {
        let result = self.resources.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// All recorded addresses, in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<&ResourceAddress> {
        self.resources.keys().collect()
    }

    /// Adds a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// True when resources and outputs are identical to `other`'s.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.resources == other.resources && self.outputs == other.outputs
    }
}

/// Fingerprint of a stored state, used to detect drift between plan and apply.
///
/// SHA-256 over the canonical JSON of lineage, serial and resources. An
/// absent state has a fixed fingerprint of its own.
#[must_use]
pub fn fingerprint(state: Option<&State>) -> String {
    #[derive(Serialize)]
    struct Canonical<'a> {
        lineage: &'a str,
        serial: u64,
        resources: &'a BTreeMap<ResourceAddress, ResourceRecord>,
    }

    let bytes = state.map_or_else(Vec::new, |s| {
        serde_json::to_vec(&Canonical {
            lineage: &s.lineage,
            serial: s.serial,
            resources: &s.resources,
        })
        .unwrap_or_default()
    });
    hex::encode(Sha256::digest(&bytes))
}

impl ResourceRecord {
    /// Creates a record from attributes that may carry sensitive marks.
    ///
    /// Marks are stripped for storage and remembered by path.
    #[must_use]
    pub fn new(address: ResourceAddress, provider: impl Into<String>, attributes: &MarkedValue) -> Self {
        let (attributes, sensitive_paths) = attributes.unmark_deep();
        Self {
            address,
            provider: provider.into(),
            attributes: attributes.clear_marks(),
            sensitive_paths,
            dependencies: Vec::new(),
        }
    }

    /// Sets the recorded dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// The attributes with their sensitive marks re-applied.
    #[must_use]
    pub fn value(&self) -> MarkedValue {
        self.attributes.clone().mark_paths(&self.sensitive_paths)
    }

    /// The `id` attribute, if the object has one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attributes
            .as_object()
            .and_then(|attrs| attrs.get("id"))
            .and_then(MarkedValue::as_str)
    }
}

impl OutputRecord {
    /// Creates an output record, stripping marks.
    #[must_use]
    pub fn new(value: &MarkedValue, sensitive: bool) -> Self {
        Self {
            sensitive: sensitive || value.contains_sensitive(),
            value: value.clear_marks(),
        }
    }
}

impl HistoryEntry {
    /// Creates a new history entry.
    #[must_use]
    pub fn new(operation: Operation, serial: u64, changed: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            serial,
            changed,
            success: true,
            error: None,
        }
    }

    /// Marks the entry as failed.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Refresh => "refresh",
            Self::StateRm => "state rm",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::value::Mark;

    fn record(name: &str, x: f64) -> ResourceRecord {
        ResourceRecord::new(
            ResourceAddress::new("null_resource", name),
            "null",
            &MarkedValue::object_from([("x", MarkedValue::number(x))]),
        )
    }

    #[test]
    fn test_record_keeps_sensitive_paths() {
        let attrs = MarkedValue::object_from([
            ("id", MarkedValue::string("abc")),
            ("password", MarkedValue::string("pw").mark(Mark::Sensitive)),
        ]);
        let rec = ResourceRecord::new(ResourceAddress::new("t_x", "a"), "t", &attrs);
        assert!(!rec.attributes.contains_sensitive());
        assert!(rec.sensitive_paths.contains("password"));
        assert_eq!(rec.value(), attrs);
        assert_eq!(rec.id(), Some("abc"));
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = State::new();
        state.set(record("a", 1.0));
        state.outputs.insert(
            "out".to_string(),
            OutputRecord::new(&MarkedValue::string("v").mark(Mark::Sensitive), false),
        );
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"null_resource.a\""));
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(back.outputs["out"].sensitive);
    }

    #[test]
    fn test_fingerprint_tracks_resources_and_serial() {
        let mut state = State::new();
        let empty = fingerprint(Some(&state));
        assert_ne!(empty, fingerprint(None));

        state.set(record("a", 1.0));
        let with_a = fingerprint(Some(&state));
        assert_ne!(empty, with_a);

        state.history.push(HistoryEntry::new(Operation::Apply, 1, vec![]));
        assert_eq!(with_a, fingerprint(Some(&state)));

        state.serial += 1;
        assert_ne!(with_a, fingerprint(Some(&state)));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = State::new();
        for serial in 0..150 {
            state.add_history(HistoryEntry::new(Operation::Refresh, serial, vec![]));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].serial, 50);
    }
}
