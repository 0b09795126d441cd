//! Compiled configuration: modules whose arguments are expressions.

use super::spec::{BackendSpec, CloudSpec, ConfigFile};
use crate::addrs::{ModulePath, ResourceAddress};
use crate::error::{ConfigError, Result, StrataError};
use crate::eval::{parse_expression, parse_template, ExprKind, Expression};
use crate::value::{yaml_key, MarkedValue, SourceRange};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// An input variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Default value.
    pub default: Option<MarkedValue>,
    /// Whether the value is redacted.
    pub sensitive: bool,
    /// Description.
    pub description: Option<String>,
    /// Declaration location.
    pub range: SourceRange,
}

/// Resource lifecycle settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    /// Explicit create-before-destroy setting; `None` defers to the provider schema.
    pub create_before_destroy: Option<bool>,
    /// Refuse plans that destroy this resource.
    pub prevent_destroy: bool,
}

/// A managed resource block.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Resource type.
    pub resource_type: String,
    /// Resource name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Instance count expression.
    pub count: Option<Expression>,
    /// Explicit dependencies; each is a traversal.
    pub depends_on: Vec<Expression>,
    /// Argument expressions.
    pub attributes: BTreeMap<String, Expression>,
    /// Lifecycle settings.
    pub lifecycle: Lifecycle,
    /// Declaration location.
    pub range: SourceRange,
}

impl Resource {
    /// `TYPE.NAME`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }

    /// All arguments as one object expression.
    #[must_use]
    pub fn attributes_expression(&self) -> Expression {
        Expression::new(
            ExprKind::Object(self.attributes.clone()),
            self.range.child("attributes"),
        )
    }
}

/// A provider configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Provider name.
    pub name: String,
    /// Argument expressions.
    pub config: BTreeMap<String, Expression>,
    /// Declaration location.
    pub range: SourceRange,
}

impl ProviderConfig {
    /// An empty configuration for a provider used without a block.
    #[must_use]
    pub fn implicit(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: BTreeMap::new(),
            range: SourceRange::default(),
        }
    }

    /// All arguments as one object expression.
    #[must_use]
    pub fn config_expression(&self) -> Expression {
        Expression::new(ExprKind::Object(self.config.clone()), self.range.clone())
    }
}

/// An output value.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// Output name.
    pub name: String,
    /// Value expression.
    pub value: Option<Expression>,
    /// Whether the value is redacted.
    pub sensitive: bool,
    /// Description.
    pub description: Option<String>,
    /// Declaration location.
    pub range: SourceRange,
}

/// An import block.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Target instance.
    pub to: ResourceAddress,
    /// Identifier expression.
    pub id: Option<Expression>,
    /// Declaration location.
    pub range: SourceRange,
}

/// A child module call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
    /// Call name.
    pub name: String,
    /// Input expressions, evaluated in the calling module.
    pub inputs: BTreeMap<String, Expression>,
    /// The child module.
    pub module: Module,
    /// Declaration location.
    pub range: SourceRange,
}

/// One module of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Path of this module.
    pub path: ModulePath,
    /// Input variables.
    pub variables: BTreeMap<String, Variable>,
    /// Local value expressions.
    pub locals: BTreeMap<String, Expression>,
    /// Provider configurations (root module only).
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Resources keyed by `TYPE.NAME`.
    pub resources: BTreeMap<String, Arc<Resource>>,
    /// Outputs.
    pub outputs: BTreeMap<String, Output>,
    /// Child module calls.
    pub calls: BTreeMap<String, ModuleCall>,
    /// Import blocks (root module only).
    pub imports: Vec<Import>,
}

fn invalid(err: impl ToString, range: &SourceRange) -> StrataError {
    StrataError::Config(ConfigError::InvalidExpression {
        message: err.to_string(),
        location: range.to_string(),
    })
}

/// Compiles a raw YAML argument into an expression.
///
/// # Errors
///
/// Returns an error when a string contains a malformed template.
pub fn compile_expression(yaml: &serde_yaml::Value, range: &SourceRange) -> Result<Expression> {
    let kind = match yaml {
        serde_yaml::Value::String(text) => {
            return parse_template(text, range).map_err(|e| invalid(e, range));
        }
        serde_yaml::Value::Sequence(items) => ExprKind::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| compile_expression(item, &range.child(&format!("[{i}]"))))
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(map) => ExprKind::Object(
            map.iter()
                .map(|(k, v)| {
                    let key = yaml_key(k);
                    let expr = compile_expression(v, &range.child(&key))?;
                    Ok((key, expr))
                })
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        serde_yaml::Value::Tagged(tagged) => return compile_expression(&tagged.value, range),
        scalar => ExprKind::Literal(MarkedValue::from_yaml(scalar)),
    };
    Ok(Expression::new(kind, range.clone()))
}

fn compile_map(
    raw: &BTreeMap<String, serde_yaml::Value>,
    range: &SourceRange,
) -> Result<BTreeMap<String, Expression>> {
    raw.iter()
        .map(|(k, v)| Ok((k.clone(), compile_expression(v, &range.child(k))?)))
        .collect()
}

/// Default provider for a resource type: the prefix before the first `_`.
#[must_use]
pub fn default_provider(resource_type: &str) -> String {
    resource_type
        .split_once('_')
        .map_or(resource_type, |(prefix, _)| prefix)
        .to_string()
}

impl Module {
    /// Compiles one configuration file for the module at `path`.
    ///
    /// `prefix` is prepended to source paths so nested modules point at
    /// their location inside the file.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed expressions, addresses, or root-only
    /// blocks used in a child module.
    pub fn compile(raw: &ConfigFile, path: ModulePath, file: &str, prefix: &str) -> Result<Self> {
        let at = |p: String| SourceRange::new(file, format!("{prefix}{p}"));
        let mut module = Self {
            path: path.clone(),
            ..Self::default()
        };

        if !path.is_root() {
            let root_only = [
                ("backend", raw.backend.is_some()),
                ("cloud", raw.cloud.is_some()),
                ("imports", !raw.imports.is_empty()),
                ("providers", !raw.providers.is_empty()),
            ];
            if let Some((block, _)) = root_only.iter().find(|(_, present)| *present) {
                return Err(ConfigError::validation(
                    format!("\"{block}\" blocks are only allowed in the root module"),
                    format!("{prefix}{block}"),
                )
                .into());
            }
        }

        for (name, spec) in &raw.variables {
            module.variables.insert(
                name.clone(),
                Variable {
                    name: name.clone(),
                    default: spec.default.as_ref().map(MarkedValue::from_yaml),
                    sensitive: spec.sensitive,
                    description: spec.description.clone(),
                    range: at(format!("variables.{name}")),
                },
            );
        }

        module.locals = compile_map(&raw.locals, &at("locals".to_string()))?;

        for (name, spec) in &raw.providers {
            let range = at(format!("providers.{name}"));
            module.providers.insert(
                name.clone(),
                ProviderConfig {
                    name: name.clone(),
                    config: compile_map(&spec.config, &range.child("config"))?,
                    range,
                },
            );
        }

        for spec in &raw.resources {
            let range = at(format!("resources.{}.{}", spec.resource_type, spec.name));
            let depends_on = spec
                .depends_on
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let dep_range = range.child(&format!("depends_on[{i}]"));
                    let expr = parse_expression(text, 0, &dep_range).map_err(|e| invalid(e, &dep_range))?;
                    if matches!(expr.kind, ExprKind::Traversal(_)) {
                        Ok(expr)
                    } else {
                        Err(invalid("depends_on entries must be plain references", &dep_range))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            let resource = Resource {
                resource_type: spec.resource_type.clone(),
                name: spec.name.clone(),
                provider: spec
                    .provider
                    .clone()
                    .unwrap_or_else(|| default_provider(&spec.resource_type)),
                count: spec
                    .count
                    .as_ref()
                    .map(|c| compile_expression(c, &range.child("count")))
                    .transpose()?,
                depends_on,
                attributes: compile_map(&spec.attributes, &range.child("attributes"))?,
                lifecycle: Lifecycle {
                    create_before_destroy: spec.lifecycle.create_before_destroy,
                    prevent_destroy: spec.lifecycle.prevent_destroy,
                },
                range,
            };
            let key = resource.key();
            if module.resources.insert(key.clone(), Arc::new(resource)).is_some() {
                return Err(ConfigError::DuplicateName {
                    kind: "resource".to_string(),
                    name: format!("{}{key}", path.prefix()),
                }
                .into());
            }
        }

        for (i, spec) in raw.imports.iter().enumerate() {
            let range = at(format!("imports[{i}]"));
            let to: ResourceAddress = spec.to.parse().map_err(|e| {
                StrataError::Config(ConfigError::validation(format!("{e}"), range.path.clone()))
            })?;
            module.imports.push(Import {
                to,
                id: spec
                    .id
                    .as_ref()
                    .map(|id| compile_expression(id, &range.child("id")))
                    .transpose()?,
                range,
            });
        }

        for (name, spec) in &raw.outputs {
            let range = at(format!("outputs.{name}"));
            module.outputs.insert(
                name.clone(),
                Output {
                    name: name.clone(),
                    value: spec
                        .value
                        .as_ref()
                        .map(|v| compile_expression(v, &range.child("value")))
                        .transpose()?,
                    sensitive: spec.sensitive,
                    description: spec.description.clone(),
                    range,
                },
            );
        }

        for (name, call) in &raw.modules {
            let call_prefix = format!("{prefix}modules.{name}.");
            let range = at(format!("modules.{name}"));
            let child = Self::compile(
                &call.source,
                path.child(name),
                file,
                &format!("{call_prefix}source."),
            )?;
            module.calls.insert(
                name.clone(),
                ModuleCall {
                    name: name.clone(),
                    inputs: compile_map(&call.inputs, &range.child("inputs"))?,
                    module: child,
                    range,
                },
            );
        }

        Ok(module)
    }

    /// Adds every block of `other` to `self`. Names must not collide.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names.
    pub fn merge(&mut self, other: Self) -> Result<()> {
        fn absorb<V>(
            into: &mut BTreeMap<String, V>,
            from: BTreeMap<String, V>,
            kind: &str,
        ) -> Result<()> {
            for (name, value) in from {
                if into.contains_key(&name) {
                    return Err(ConfigError::DuplicateName {
                        kind: kind.to_string(),
                        name,
                    }
                    .into());
                }
                into.insert(name, value);
            }
            Ok(())
        }
        absorb(&mut self.variables, other.variables, "variable")?;
        absorb(&mut self.locals, other.locals, "local")?;
        absorb(&mut self.providers, other.providers, "provider")?;
        absorb(&mut self.resources, other.resources, "resource")?;
        absorb(&mut self.outputs, other.outputs, "output")?;
        absorb(&mut self.calls, other.calls, "module")?;
        self.imports.extend(other.imports);
        self.imports.sort_by(|a, b| a.to.cmp(&b.to));
        Ok(())
    }

    /// This module followed by all descendants, depth first in name order.
    #[must_use]
    pub fn walk(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for call in self.calls.values() {
            out.extend(call.module.walk());
        }
        out
    }

    /// Finds a descendant module by path.
    #[must_use]
    pub fn descendant(&self, path: &ModulePath) -> Option<&Self> {
        let mut current = self;
        for segment in path.segments() {
            current = &current.calls.get(segment)?.module;
        }
        Some(current)
    }
}

/// A fully loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// The root module and its descendants.
    pub root: Module,
    /// State backend block.
    pub backend: Option<BackendSpec>,
    /// Remote workspace block.
    pub cloud: Option<CloudSpec>,
    /// Merged raw configuration, normalized.
    pub source: ConfigFile,
    /// Directory the configuration was loaded from.
    pub dir: PathBuf,
    /// Files that were loaded, in load order.
    pub files: Vec<PathBuf>,
}

impl Configuration {
    /// Builds a configuration from one in-memory file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not compile.
    pub fn from_file(file: ConfigFile, file_name: &str) -> Result<Self> {
        let root = Module::compile(&file, ModulePath::root(), file_name, "")?;
        let mut source = file;
        source.normalize();
        Ok(Self {
            root,
            backend: source.backend.clone(),
            cloud: source.cloud.clone(),
            source,
            dir: PathBuf::from("."),
            files: vec![PathBuf::from(file_name)],
        })
    }

    /// Parses one YAML document into a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML or an expression is malformed.
    pub fn from_yaml(yaml: &str, file_name: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::parse(format!("YAML parse error: {e}"), Some(file_name.to_string()))
        })?;
        Self::from_file(file, file_name)
    }

    /// All modules, root first.
    #[must_use]
    pub fn modules(&self) -> Vec<&Module> {
        self.root.walk()
    }

    /// Finds a module by path.
    #[must_use]
    pub fn module(&self, path: &ModulePath) -> Option<&Module> {
        self.root.descendant(path)
    }

    /// Finds the resource block an instance address belongs to.
    #[must_use]
    pub fn resource(&self, address: &ResourceAddress) -> Option<&Arc<Resource>> {
        self.module(&address.module)?
            .resources
            .get(&format!("{}.{}", address.resource_type, address.name))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const YAML: &str = r#"
variables:
  env:
    default: dev
locals:
  prefix: "app-${var.env}"
resources:
  - type: null_resource
    name: a
    depends_on: ["null_resource.b"]
    attributes:
      triggers:
        name: "${local.prefix}"
  - type: null_resource
    name: b
imports:
  - to: null_resource.b
    id: "abc"
modules:
  net:
    inputs:
      cidr: "10.0.0.0/16"
    source:
      variables:
        cidr: {}
      resources:
        - type: local_file
          name: cfg
          attributes:
            filename: "net.txt"
            content: "${var.cidr}"
"#;

    #[test]
    fn test_compile_configuration() {
        let config = Configuration::from_yaml(YAML, "main.strata.yaml").unwrap();
        let root = &config.root;
        assert_eq!(root.resources.len(), 2);
        let a = &root.resources["null_resource.a"];
        assert_eq!(a.provider, "null");
        assert_eq!(a.depends_on.len(), 1);
        assert_eq!(
            a.range.child("attributes").path,
            "resources.null_resource.a.attributes"
        );
        assert_eq!(root.imports[0].to.to_string(), "null_resource.b");

        let net = config.module(&ModulePath::root().child("net")).unwrap();
        let cfg = &net.resources["local_file.cfg"];
        assert_eq!(cfg.provider, "local");
        assert_eq!(
            cfg.attributes["content"].range.path,
            "modules.net.source.resources.local_file.cfg.attributes.content"
        );
        assert_eq!(config.modules().len(), 2);
    }

    #[test]
    fn test_root_only_blocks_in_child_module() {
        let yaml = r"
modules:
  child:
    source:
      backend:
        type: local
";
        let err = Configuration::from_yaml(yaml, "main.strata.yaml").unwrap_err();
        assert!(err.to_string().contains("only allowed in the root module"));
    }

    #[test]
    fn test_duplicate_resources_in_one_file() {
        let yaml = r"
resources:
  - type: null_resource
    name: a
  - type: null_resource
    name: a
";
        assert!(Configuration::from_yaml(yaml, "main.strata.yaml").is_err());
    }

    #[test]
    fn test_merge_rejects_duplicates() {
        let a = Configuration::from_yaml("variables: {x: {}}", "a.strata.yaml").unwrap();
        let b = Configuration::from_yaml("variables: {x: {}}", "b.strata.yaml").unwrap();
        let mut root = a.root;
        assert!(root.merge(b.root).is_err());
    }

    #[test]
    fn test_bad_depends_on() {
        let yaml = r#"
resources:
  - type: null_resource
    name: a
    depends_on: ["upper(var.x)"]
"#;
        assert!(Configuration::from_yaml(yaml, "main.strata.yaml").is_err());
    }

    #[test]
    fn test_default_provider() {
        assert_eq!(default_provider("local_file"), "local");
        assert_eq!(default_provider("null_resource"), "null");
        assert_eq!(default_provider("thing"), "thing");
    }
}
