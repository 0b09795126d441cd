//! Planned changes to single resource instances.

use crate::addrs::ResourceAddress;
use crate::value::MarkedValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What apply will do to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing.
    NoOp,
    /// Create a new object.
    Create,
    /// Update the object in place.
    Update,
    /// Destroy the object and create a new one.
    Replace,
    /// Destroy the object.
    Destroy,
}

impl Action {
    /// Relative weight, used to check that apply never escalates a plan.
    #[must_use]
    pub const fn weight(self) -> u8 {
        match self {
            Self::NoOp => 0,
            Self::Update => 1,
            Self::Create | Self::Replace | Self::Destroy => 2,
        }
    }

    /// The one or three character marker used when rendering a plan.
    #[must_use]
    pub const fn symbol(self, create_before_destroy: bool) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace if create_before_destroy => "+/-",
            Self::Replace => "-/+",
            Self::Destroy => "-",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

/// Why an action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Configuration and state agree.
    Unchanged,
    /// The instance has no state yet.
    NotInState,
    /// One or more attributes differ.
    AttributesChanged,
    /// Some attributes are only known after apply.
    DeferredValues,
    /// A changed attribute cannot be updated in place.
    ReplaceRequired,
    /// The instance is no longer in configuration.
    NotInConfiguration,
    /// A destroy was requested.
    DestroyRequested,
    /// An existing object is adopted.
    Import,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "no changes",
            Self::NotInState => "not in state",
            Self::AttributesChanged => "attributes changed",
            Self::DeferredValues => "some values are known only after apply",
            Self::ReplaceRequired => "a changed attribute forces replacement",
            Self::NotInConfiguration => "not in configuration",
            Self::DestroyRequested => "destroy requested",
            Self::Import => "will be imported",
        };
        write!(f, "{s}")
    }
}

/// The planned change for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Instance address.
    pub address: ResourceAddress,
    /// Action to take.
    pub action: Action,
    /// Object before the change, from state.
    pub before: Option<MarkedValue>,
    /// Object after the change; unknown where the provider decides.
    pub after: Option<MarkedValue>,
    /// Why the action was chosen.
    pub reason: ChangeReason,
    /// Attributes whose value changes.
    #[serde(default)]
    pub changed_paths: Vec<String>,
    /// Changed attributes that force replacement.
    #[serde(default)]
    pub replace_paths: Vec<String>,
    /// Attributes only known after apply.
    #[serde(default)]
    pub unknown_paths: Vec<String>,
    /// Identifier of the object being imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
    /// Replacement order.
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Owning provider.
    pub provider: String,
    /// Instances this one references.
    #[serde(default)]
    pub dependencies: Vec<ResourceAddress>,
}

impl ChangeRecord {
    /// Creates a record with no values.
    #[must_use]
    pub fn new(address: ResourceAddress, action: Action, reason: ChangeReason) -> Self {
        Self {
            address,
            action,
            before: None,
            after: None,
            reason,
            changed_paths: Vec::new(),
            replace_paths: Vec::new(),
            unknown_paths: Vec::new(),
            import_id: None,
            create_before_destroy: false,
            provider: String::new(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the owning provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Sets the referenced instances.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Marks the change as adopting the object `id`.
    #[must_use]
    pub fn with_import(mut self, id: impl Into<String>) -> Self {
        self.import_id = Some(id.into());
        self.reason = ChangeReason::Import;
        self
    }

    /// True unless the action is [`Action::NoOp`] and nothing is imported.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self.action, Action::NoOp) || self.import_id.is_some()
    }
}
