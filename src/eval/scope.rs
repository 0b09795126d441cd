//! Evaluation scopes and the table of resolved named values.

use super::expr::Reference;
use crate::addrs::{ModulePath, ResourceAddress};
use crate::value::MarkedValue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Key of one resolved value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// An input variable of a module.
    Variable(ModulePath, String),
    /// A local value of a module.
    Local(ModulePath, String),
    /// An output of a module.
    Output(ModulePath, String),
    /// A resource instance.
    Resource(ResourceAddress),
}

/// Values resolved so far during a walk.
///
/// Nodes write their result once they finish; the graph ordering guarantees
/// a reader only looks up values its node depends on. A value that has not
/// been written yet reads as unknown.
#[derive(Debug, Default)]
pub struct NamedValues {
    values: RwLock<HashMap<ValueKey, MarkedValue>>,
    counts: RwLock<HashMap<(ModulePath, String, String), Option<usize>>>,
}

impl NamedValues {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a resolved value.
    pub fn set(&self, key: ValueKey, value: MarkedValue) {
        self.values.write().insert(key, value);
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &ValueKey) -> Option<MarkedValue> {
        self.values.read().get(key).cloned()
    }

    /// Records the expansion of a resource block: `None` without `count`,
    /// otherwise the number of instances.
    pub fn register_resource(
        &self,
        module: &ModulePath,
        resource_type: &str,
        name: &str,
        count: Option<usize>,
    ) {
        self.counts.write().insert(
            (module.clone(), resource_type.to_string(), name.to_string()),
            count,
        );
    }

    /// Returns the expansion of a resource block, or `None` if it is not declared.
    #[must_use]
    pub fn resource_count(
        &self,
        module: &ModulePath,
        resource_type: &str,
        name: &str,
    ) -> Option<Option<usize>> {
        self.counts
            .read()
            .get(&(module.clone(), resource_type.to_string(), name.to_string()))
            .copied()
    }
}

/// An immutable evaluation scope.
#[derive(Debug, Clone)]
pub struct EvalContext {
    path: ModulePath,
    count_index: Option<usize>,
    values: Arc<NamedValues>,
}

impl EvalContext {
    /// Creates a root-module scope over `values`.
    #[must_use]
    pub const fn new(values: Arc<NamedValues>) -> Self {
        Self {
            path: ModulePath::root(),
            count_index: None,
            values,
        }
    }

    /// Returns a scope for `path`, sharing the same value table.
    #[must_use]
    pub fn with_path(&self, path: ModulePath) -> Self {
        Self {
            path,
            count_index: None,
            values: Arc::clone(&self.values),
        }
    }

    /// Returns a scope where `count.index` is `index`.
    #[must_use]
    pub fn with_count_index(&self, index: Option<usize>) -> Self {
        Self {
            path: self.path.clone(),
            count_index: index,
            values: Arc::clone(&self.values),
        }
    }

    /// The module this scope evaluates in.
    #[must_use]
    pub const fn path(&self) -> &ModulePath {
        &self.path
    }

    /// The shared value table.
    #[must_use]
    pub const fn values(&self) -> &Arc<NamedValues> {
        &self.values
    }

    /// Resolves a reference to its current value.
    ///
    /// # Errors
    ///
    /// Returns a message when the reference cannot be valid in this scope.
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(&self, reference: &Reference) -> Result<MarkedValue, String> {
        let lookup = |key: ValueKey| self.values.get(&key).unwrap_or_else(MarkedValue::unknown);
        match reference {
            Reference::Variable(name) => Ok(lookup(ValueKey::Variable(self.path.clone(), name.clone()))),
            Reference::Local(name) => Ok(lookup(ValueKey::Local(self.path.clone(), name.clone()))),
            Reference::ModuleOutput { call, output } => Ok(lookup(ValueKey::Output(
                self.path.child(call),
                output.clone(),
            ))),
            Reference::CountIndex => self
                .count_index
                .map(|i| MarkedValue::number(i as f64))
                .ok_or_else(|| {
                    "The \"count\" object can only be used in resource blocks that set \"count\"."
                        .to_string()
                }),
            Reference::Resource {
                resource_type,
                name,
                index,
            } => {
                let address = ResourceAddress::new(resource_type.clone(), name.clone())
                    .in_module(self.path.clone());
                match (self.values.resource_count(&self.path, resource_type, name), index) {
                    (None, _) => Err(format!(
                        "A managed resource \"{resource_type}\" \"{name}\" has not been declared in {}.",
                        module_label(&self.path)
                    )),
                    (Some(None), None) => Ok(lookup(ValueKey::Resource(address))),
                    (Some(None), Some(_)) => Err(format!(
                        "Resource {address} does not have \"count\" set, so it cannot be indexed."
                    )),
                    (Some(Some(count)), None) => Ok(MarkedValue::list(
                        (0..count)
                            .map(|i| lookup(ValueKey::Resource(address.clone().with_index(Some(i)))))
                            .collect(),
                    )),
                    (Some(Some(count)), Some(i)) if *i < count => {
                        Ok(lookup(ValueKey::Resource(address.with_index(Some(*i)))))
                    }
                    (Some(Some(count)), Some(i)) => Err(format!(
                        "The given index {i} is out of range for {address}, which has {count} instance(s)."
                    )),
                }
            }
        }
    }
}

fn module_label(path: &ModulePath) -> String {
    if path.is_root() {
        "the root module".to_string()
    } else {
        path.to_string()
    }
}
