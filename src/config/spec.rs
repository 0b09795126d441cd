//! Configuration file types.
//!
//! These structs map one-to-one to `*.strata.yaml` files. Argument values are
//! kept as raw YAML here; [`Module::compile`](super::Module::compile) turns
//! them into expressions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The contents of one configuration file, or the merge of several.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Input variables.
    #[serde(default)]
    pub variables: BTreeMap<String, VariableSpec>,
    /// Local values.
    #[serde(default)]
    pub locals: BTreeMap<String, serde_yaml::Value>,
    /// Provider configurations, keyed by provider name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSpec>,
    /// Managed resources.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Import blocks. Only valid in the root module.
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    /// Output values.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
    /// Child module calls.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleCallSpec>,
    /// State backend. Only valid in the root module.
    #[serde(default)]
    pub backend: Option<BackendSpec>,
    /// Remote workspace integration. Only valid in the root module.
    #[serde(default)]
    pub cloud: Option<CloudSpec>,
}

/// An input variable declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    /// Value used when none is supplied.
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    /// Whether the value must be redacted.
    #[serde(default)]
    pub sensitive: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A provider configuration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderSpec {
    /// Provider arguments.
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

/// A managed resource block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    /// Resource type, e.g. `local_file`.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource name, unique per type within the module.
    pub name: String,
    /// Provider name; defaults to the type prefix before the first `_`.
    #[serde(default)]
    pub provider: Option<String>,
    /// Number of instances.
    #[serde(default)]
    pub count: Option<serde_yaml::Value>,
    /// Explicit dependencies, as reference strings like `null_resource.a`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Resource arguments.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleSpec,
}

/// Lifecycle settings of a resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LifecycleSpec {
    /// Create the replacement before destroying the old object.
    #[serde(default)]
    pub create_before_destroy: Option<bool>,
    /// Refuse any plan that destroys this resource.
    #[serde(default)]
    pub prevent_destroy: bool,
}

/// An import block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImportSpec {
    /// Address of the resource instance to import into.
    pub to: String,
    /// Identifier of the existing object.
    #[serde(default)]
    pub id: Option<serde_yaml::Value>,
}

/// An output value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    /// The value expression.
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
    /// Whether the value must be redacted.
    #[serde(default)]
    pub sensitive: bool,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A child module call with its configuration inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleCallSpec {
    /// Values for the child module's input variables.
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_yaml::Value>,
    /// The child module's configuration.
    #[serde(default)]
    pub source: Box<ConfigFile>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Local file-based state storage.
    #[default]
    Local,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendSpec {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub backend_type: BackendType,
    /// State file path, relative to the configuration directory.
    #[serde(default)]
    pub path: Option<String>,
}

/// Remote workspace integration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CloudSpec {
    /// Organization owning the workspaces.
    #[serde(default)]
    pub organization: Option<String>,
    /// Service hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Workspace selection.
    #[serde(default)]
    pub workspaces: CloudWorkspaces,
}

/// Workspace selection inside a `cloud` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CloudWorkspaces {
    /// Select one workspace by name.
    #[serde(default)]
    pub name: Option<String>,
    /// Select workspaces carrying all of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConfigFile {
    /// Sorts order-insensitive collections so equal configurations compare equal.
    pub fn normalize(&mut self) {
        self.resources
            .sort_by(|a, b| (&a.resource_type, &a.name).cmp(&(&b.resource_type, &b.name)));
        self.imports.sort_by(|a, b| a.to.cmp(&b.to));
        for call in self.modules.values_mut() {
            call.source.normalize();
        }
    }
}
