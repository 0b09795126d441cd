//! Error types for the Strata engine.
//!
//! Two channels exist side by side. Anything that stops a command outright
//! (unreadable configuration, a locked or corrupted state file, a plan that no
//! longer matches the stored state) is a [`StrataError`]. Problems found while
//! evaluating or walking the graph are collected as
//! [`Diagnostics`](crate::value::Diagnostics) instead, so that one bad resource
//! does not hide the others.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Strata engine.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Planning and plan-file errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Apply errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Provider errors that escape a single node.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file or directory was not found.
    #[error("Configuration not found: {path}")]
    FileNotFound {
        /// Path to the missing file or directory.
        path: PathBuf,
    },

    /// The configuration directory holds no configuration files.
    #[error("No configuration files found in {path}")]
    EmptyDirectory {
        /// Directory that was searched.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An expression inside the configuration is malformed.
    #[error("Invalid expression at {location}: {message}")]
    InvalidExpression {
        /// Description of the problem.
        message: String,
        /// File and attribute path of the expression.
        location: String,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate definition.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of block (resource, variable, output, ...).
        kind: String,
        /// The duplicated name.
        name: String,
    },

    /// A variable was given a value on the command line in the wrong form.
    #[error("Invalid variable assignment '{input}': expected NAME=VALUE")]
    InvalidVariableAssignment {
        /// The raw input.
        input: String,
    },

    /// The configuration uses a feature this build does not provide.
    #[error("{feature} is not available: {message}")]
    Unsupported {
        /// Name of the feature.
        feature: String,
        /// Why it is not available.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by {holder} for {operation} (since {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// The command holding the lock.
        operation: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Reading or writing the state backend failed.
    #[error("State storage error: {message}")]
    Storage {
        /// Description of the IO failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: u32,
        /// Found state version.
        found: u32,
    },

    /// No record exists at the given address.
    #[error("No resource in state at {address}")]
    ResourceNotFound {
        /// The address that was looked up.
        address: String,
    },
}

/// Planning and plan-file errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan carries error diagnostics and cannot be applied.
    #[error("Plan has {count} error(s) and cannot be applied")]
    HasErrors {
        /// Number of error diagnostics.
        count: usize,
    },

    /// The stored state changed after the plan was computed.
    #[error(
        "Saved plan is stale: state fingerprint was {expected} when planned, but is now {found}"
    )]
    StateDrift {
        /// Fingerprint recorded in the plan.
        expected: String,
        /// Fingerprint of the current state.
        found: String,
    },

    /// The configuration changed after the plan was computed.
    #[error("Saved plan is stale: configuration hash was {expected} when planned, but is now {found}")]
    ConfigChanged {
        /// Hash recorded in the plan.
        expected: String,
        /// Hash of the current configuration.
        found: String,
    },

    /// The graph built for apply does not line up with the plan's changes.
    #[error("Plan is inconsistent with the configuration: {message}")]
    Inconsistent {
        /// Description of the mismatch.
        message: String,
    },

    /// The plan file could not be read or written.
    #[error("Plan file error at {path}: {message}")]
    PlanFile {
        /// Path of the plan file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Apply errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Some nodes failed or were skipped; successful ones were persisted.
    #[error("Apply finished with {failed} failed and {skipped} skipped node(s)")]
    Incomplete {
        /// Number of failed nodes.
        failed: usize,
        /// Number of skipped nodes.
        skipped: usize,
    },

    /// The walk was cancelled before all nodes ran.
    #[error("Apply cancelled: {reason}")]
    Cancelled {
        /// Reason for the cancellation.
        reason: String,
    },

    /// The operator declined the confirmation prompt.
    #[error("Apply declined by operator")]
    Declined,
}

/// Errors returned by providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider does not manage this resource type.
    #[error("Provider {provider} does not support resource type {resource_type}")]
    UnsupportedResource {
        /// Provider name.
        provider: String,
        /// Requested resource type.
        resource_type: String,
    },

    /// The provider configuration was rejected.
    #[error("Invalid provider configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A resource value handed to the provider is malformed.
    #[error("Invalid value for {resource_type}: {message}")]
    InvalidValue {
        /// Resource type.
        resource_type: String,
        /// Description of the problem.
        message: String,
    },

    /// The remote object does not exist.
    #[error("Object {id} not found")]
    NotFound {
        /// Identifier of the missing object.
        id: String,
    },

    /// The remote action failed.
    #[error("{operation} {resource_type} failed: {message}")]
    ActionFailed {
        /// Resource type.
        resource_type: String,
        /// Operation that failed (create, update, ...).
        operation: String,
        /// Error message.
        message: String,
    },
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is transient and the command may be re-run as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::LockFailed { .. } | StateError::LockedByOther { .. })
        )
    }

    /// Process exit code for this error.
    ///
    /// Declining the confirmation prompt is not a failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Apply(ApplyError::Declined) => 0,
            _ => 1,
        }
    }

    /// Returns true if the error means a saved plan can no longer be applied.
    #[must_use]
    pub const fn is_stale_plan(&self) -> bool {
        matches!(
            self,
            Self::Plan(PlanError::StateDrift { .. } | PlanError::ConfigChanged { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a parse error with an optional location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location,
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl PlanError {
    /// Creates a plan-file error.
    #[must_use]
    pub fn plan_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PlanFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an action failure.
    #[must_use]
    pub fn action(
        resource_type: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ActionFailed {
            resource_type: resource_type.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-resource error.
    #[must_use]
    pub fn unsupported(provider: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::UnsupportedResource {
            provider: provider.into(),
            resource_type: resource_type.into(),
        }
    }
}
