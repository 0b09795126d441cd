//! Builds the dependency graph from configuration and state.

use super::cycle::find_cycles;
use super::node::{NodeKey, NodeKind};
use super::{Graph, NodeId};
use crate::addrs::{ModulePath, ResourceAddress};
use crate::config::{Configuration, Import, Module, ProviderConfig, Resource};
use crate::eval::{evaluate, evaluate_import_id, EvalContext, Expression, NamedValues, Reference, ValueKey, COUNT_FIELD};
use crate::state::State;
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics, Mark, SourceRange};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Which walk the graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Configuration nodes plus orphans for state-only instances.
    Plan,
    /// One orphan per state record, dependents first.
    Destroy,
    /// One orphan per state record, read independently.
    Refresh,
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Destroy => write!(f, "destroy"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Builds a [`Graph`] for one walk.
///
/// The value table must already hold the root variables: `count` and
/// import identifiers are evaluated here, before any node runs, against
/// those variables and every local that can be resolved from them. Resource
/// expansions are registered in the same table for the walk to use.
pub struct GraphBuilder<'a> {
    config: &'a Configuration,
    values: Arc<NamedValues>,
    mode: GraphMode,
    nodes: BTreeMap<NodeKey, NodeKind>,
    edges: BTreeSet<(NodeKey, NodeKey)>,
    instances: BTreeMap<(ModulePath, String), Vec<ResourceAddress>>,
    diags: Diagnostics,
}

fn module_label(path: &ModulePath) -> String {
    if path.is_root() {
        "the root module".to_string()
    } else {
        path.to_string()
    }
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder over `config`.
    #[must_use]
    pub fn new(config: &'a Configuration, values: Arc<NamedValues>) -> Self {
        Self {
            config,
            values,
            mode: GraphMode::Plan,
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
            instances: BTreeMap::new(),
            diags: Diagnostics::new(),
        }
    }

    /// Builds the graph.
    ///
    /// Cycles are reported as one error per strongly connected component;
    /// callers must not walk a graph whose diagnostics contain errors.
    #[must_use]
    pub fn build(mut self, state: &State, mode: GraphMode) -> (Graph, Diagnostics) {
        self.mode = mode;
        match mode {
            GraphMode::Plan => {
                self.add_config_nodes();
                self.add_orphans(state);
            }
            GraphMode::Destroy | GraphMode::Refresh => {
                self.add_root_variables();
                self.add_orphans(state);
            }
        }
        self.add_reference_edges();

        let mut graph = Graph::from_parts(self.nodes, self.edges);
        let mut diags = self.diags;

        let cycles = find_cycles(&graph);
        for cycle in &cycles {
            let names: Vec<String> = cycle.iter().map(|&id| graph.node(id).key.to_string()).collect();
            diags.push(Diagnostic::error(
                DiagnosticKind::Cycle,
                "Cycle detected",
                format!("Cycle: {}", names.join(", ")),
            ));
        }
        if cycles.is_empty() {
            record_dependencies(&mut graph);
        }

        info!(
            "Built {mode} graph: {} nodes, {} edges",
            graph.len(),
            graph.edge_count()
        );
        (graph, diags)
    }

    fn ensure_provider(&mut self, name: &str) {
        let key = NodeKey::Provider(name.to_string());
        if !self.nodes.contains_key(&key) {
            let config = self
                .config
                .root
                .providers
                .get(name)
                .cloned()
                .unwrap_or_else(|| ProviderConfig::implicit(name));
            self.nodes.insert(key, NodeKind::Provider { config });
        }
    }

    fn add_root_variables(&mut self) {
        for (name, variable) in &self.config.root.variables {
            self.nodes.insert(
                NodeKey::Variable(ModulePath::root(), name.clone()),
                NodeKind::Variable {
                    variable: variable.clone(),
                    input: None,
                },
            );
        }
    }

    fn add_config_nodes(&mut self) {
        let config = self.config;
        self.seed_known_values(&config.root);

        for name in config.root.providers.keys() {
            self.ensure_provider(name);
        }
        let imports: BTreeMap<&ResourceAddress, &Import> =
            config.root.imports.iter().map(|i| (&i.to, i)).collect();

        for module in config.modules() {
            let path = &module.path;
            let call = path.parent().and_then(|parent| {
                config
                    .module(&parent)?
                    .calls
                    .get(path.last().unwrap_or_default())
            });

            for (name, variable) in &module.variables {
                self.nodes.insert(
                    NodeKey::Variable(path.clone(), name.clone()),
                    NodeKind::Variable {
                        variable: variable.clone(),
                        input: call.and_then(|c| c.inputs.get(name).cloned()),
                    },
                );
            }
            for (name, expr) in &module.locals {
                self.nodes.insert(
                    NodeKey::Local(path.clone(), name.clone()),
                    NodeKind::Local { expr: expr.clone() },
                );
            }
            for (name, output) in &module.outputs {
                self.nodes.insert(
                    NodeKey::Output(path.clone(), name.clone()),
                    NodeKind::Output {
                        output: output.clone(),
                    },
                );
            }
            for resource in module.resources.values() {
                self.add_resource(module, resource, &imports);
            }
        }

        for import in &config.root.imports {
            if !self.nodes.contains_key(&NodeKey::Resource(import.to.clone())) {
                self.diags.push(
                    Diagnostic::error(
                        DiagnosticKind::Config,
                        "Import block target does not exist",
                        format!(
                            "The configuration does not declare an instance {}, so nothing can be imported into it.",
                            import.to
                        ),
                    )
                    .with_subject(Some(import.range.child("to"))),
                );
            }
        }
    }

    /// Publishes locals and module inputs that are already known, so
    /// `count` and import identifiers can use them before any node runs.
    fn seed_known_values(&self, module: &Module) {
        self.seed_static_locals(module);
        let ctx = EvalContext::new(Arc::clone(&self.values)).with_path(module.path.clone());
        for call in module.calls.values() {
            let child = &call.module;
            for (name, variable) in &child.variables {
                let (value, diags) = match call.inputs.get(name) {
                    Some(expr) => evaluate(expr, &ctx),
                    None => (variable.default.clone().unwrap_or_default(), Diagnostics::new()),
                };
                if diags.has_errors() || value.contains_unknown() {
                    continue;
                }
                let value = if variable.sensitive {
                    value.mark(Mark::Sensitive)
                } else {
                    value
                };
                self.values
                    .set(ValueKey::Variable(child.path.clone(), name.clone()), value);
            }
            self.seed_known_values(child);
        }
    }

    /// Evaluates the locals of `module` that refer only to variables and
    /// other locals, in reference order. Locals on a cycle, or whose value
    /// is not known yet, are left for the walk.
    fn seed_static_locals(&self, module: &Module) {
        let ctx = EvalContext::new(Arc::clone(&self.values)).with_path(module.path.clone());
        let mut pending: Vec<(&String, &Expression, Vec<String>)> = module
            .locals
            .iter()
            .filter_map(|(name, expr)| {
                let mut locals = Vec::new();
                for (reference, _) in expr.references() {
                    match reference {
                        Ok(Reference::Variable(_)) => {}
                        Ok(Reference::Local(local)) => locals.push(local),
                        _ => return None,
                    }
                }
                Some((name, expr, locals))
            })
            .collect();

        let is_set = |name: &String| {
            self.values
                .get(&ValueKey::Local(module.path.clone(), name.clone()))
                .is_some()
        };
        while let Some(ready) = pending.iter().position(|(_, _, deps)| deps.iter().all(is_set)) {
            let (name, expr, _) = pending.swap_remove(ready);
            let (value, diags) = evaluate(expr, &ctx);
            if diags.has_errors() || value.contains_unknown() {
                continue;
            }
            debug!("Resolved {}local.{name} before the walk", module.path.prefix());
            self.values
                .set(ValueKey::Local(module.path.clone(), name.clone()), value);
        }
    }

    fn add_resource(
        &mut self,
        module: &Module,
        resource: &Arc<Resource>,
        imports: &BTreeMap<&ResourceAddress, &Import>,
    ) {
        let path = &module.path;
        let Some(count) = self.expand_count(resource, path) else {
            self.values
                .register_resource(path, &resource.resource_type, &resource.name, None);
            return;
        };
        self.values
            .register_resource(path, &resource.resource_type, &resource.name, count);
        self.ensure_provider(&resource.provider);

        let indices: Vec<Option<usize>> = count.map_or_else(|| vec![None], |n| (0..n).map(Some).collect());
        debug!("Expanding {}{} into {} instance(s)", path.prefix(), resource.key(), indices.len());

        for index in indices {
            let address = ResourceAddress::new(&resource.resource_type, &resource.name)
                .in_module(path.clone())
                .with_index(index);
            let import = imports.get(&address).map(|i| (*i).clone());
            let import_id = import.as_ref().and_then(|i| self.import_id(i, &address));
            let key = NodeKey::Resource(address.clone());

            self.edges
                .insert((NodeKey::Provider(resource.provider.clone()), key.clone()));
            self.nodes.insert(
                key,
                NodeKind::Resource {
                    resource: Arc::clone(resource),
                    import,
                    import_id,
                    dependencies: Vec::new(),
                },
            );
            self.instances
                .entry((path.clone(), resource.key()))
                .or_default()
                .push(address);
        }
    }

    /// `None` on error, `Some(None)` without `count`.
    fn expand_count(&mut self, resource: &Resource, path: &ModulePath) -> Option<Option<usize>> {
        let Some(expr) = &resource.count else {
            return Some(None);
        };
        let ctx = EvalContext::new(Arc::clone(&self.values)).with_path(path.clone());
        let (count, diags) = COUNT_FIELD.evaluate::<usize>(Some(expr), &ctx);
        self.diags
            .extend(diags.for_address(&format!("{}{}", path.prefix(), resource.key())));
        count.map(Some)
    }

    fn import_id(&mut self, import: &Import, address: &ResourceAddress) -> Option<String> {
        let ctx = EvalContext::new(Arc::clone(&self.values));
        let (id, diags) = evaluate_import_id(import.id.as_ref(), &ctx);
        let failed = diags.has_errors();
        self.diags.extend(diags.for_address(&address.to_string()));
        (!failed).then_some(id)
    }

    fn add_orphans(&mut self, state: &State) {
        let mut orphans = BTreeSet::new();
        for record in state.resources.values() {
            if self.mode == GraphMode::Plan
                && self.nodes.contains_key(&NodeKey::Resource(record.address.clone()))
            {
                continue;
            }
            self.ensure_provider(&record.provider);
            let key = NodeKey::Orphan(record.address.clone());
            self.edges
                .insert((NodeKey::Provider(record.provider.clone()), key.clone()));
            self.nodes.insert(
                key,
                NodeKind::Orphan {
                    provider: record.provider.clone(),
                    resource: self.config.resource(&record.address).cloned(),
                },
            );
            orphans.insert(record.address.clone());
        }

        if self.mode == GraphMode::Refresh {
            return;
        }
        // Whatever an orphan depended on must outlive it.
        for address in &orphans {
            let Some(record) = state.get(address) else {
                continue;
            };
            for dep in &record.dependencies {
                let target = if orphans.contains(dep) {
                    NodeKey::Orphan(dep.clone())
                } else {
                    NodeKey::Resource(dep.clone())
                };
                if self.nodes.contains_key(&target) {
                    self.edges.insert((NodeKey::Orphan(address.clone()), target));
                }
            }
        }
    }

    fn add_reference_edges(&mut self) {
        let jobs: Vec<(NodeKey, ModulePath, Vec<Expression>, Vec<Expression>)> = self
            .nodes
            .iter()
            .filter_map(|(key, kind)| {
                let (scope, exprs, depends_on) = match (key, kind) {
                    (NodeKey::Variable(path, _), NodeKind::Variable { input, .. }) => (
                        path.parent().unwrap_or_default(),
                        input.iter().cloned().collect(),
                        Vec::new(),
                    ),
                    (NodeKey::Local(path, _), NodeKind::Local { expr }) => {
                        (path.clone(), vec![expr.clone()], Vec::new())
                    }
                    (NodeKey::Output(path, _), NodeKind::Output { output }) => {
                        (path.clone(), output.value.iter().cloned().collect(), Vec::new())
                    }
                    (_, NodeKind::Provider { config }) => {
                        (ModulePath::root(), vec![config.config_expression()], Vec::new())
                    }
                    (NodeKey::Resource(address), NodeKind::Resource { resource, .. }) => {
                        let mut exprs = vec![resource.attributes_expression()];
                        exprs.extend(resource.count.iter().cloned());
                        (address.module.clone(), exprs, resource.depends_on.clone())
                    }
                    _ => return None,
                };
                Some((key.clone(), scope, exprs, depends_on))
            })
            .collect();

        for (key, scope, exprs, depends_on) in jobs {
            for expr in &exprs {
                self.link(&key, &scope, expr, false);
            }
            for expr in &depends_on {
                self.link(&key, &scope, expr, true);
            }
        }
    }

    fn report(&mut self, to: &NodeKey, summary: &str, detail: String, range: &SourceRange) {
        if self.mode != GraphMode::Plan {
            return;
        }
        self.diags.push(
            Diagnostic::error(DiagnosticKind::Config, summary, detail)
                .with_subject(Some(range.clone()))
                .for_address(to.to_string()),
        );
    }

    /// Adds one edge per reference in `expr` to the node `to`.
    fn link(&mut self, to: &NodeKey, scope: &ModulePath, expr: &Expression, depends_on: bool) {
        let Some(module) = self.config.module(scope) else {
            return;
        };
        for (reference, range) in expr.references() {
            let reference = match reference {
                Ok(reference) => reference,
                Err(message) => {
                    self.report(to, "Invalid reference", message, range);
                    continue;
                }
            };
            if depends_on && !matches!(reference, Reference::Resource { .. }) {
                self.report(
                    to,
                    "Invalid depends_on reference",
                    format!("\"{reference}\" is not a resource; depends_on may only refer to resources."),
                    range,
                );
                continue;
            }

            let sources: Vec<NodeKey> = match &reference {
                Reference::CountIndex => Vec::new(),
                Reference::Variable(name) => {
                    if !module.variables.contains_key(name) {
                        self.report(
                            to,
                            "Reference to undeclared input variable",
                            format!("An input variable with the name \"{name}\" has not been declared."),
                            range,
                        );
                        continue;
                    }
                    vec![NodeKey::Variable(scope.clone(), name.clone())]
                }
                Reference::Local(name) => {
                    if !module.locals.contains_key(name) {
                        self.report(
                            to,
                            "Reference to undeclared local value",
                            format!("A local value with the name \"{name}\" has not been declared."),
                            range,
                        );
                        continue;
                    }
                    vec![NodeKey::Local(scope.clone(), name.clone())]
                }
                Reference::ModuleOutput { call, output } => match module.calls.get(call) {
                    None => {
                        self.report(
                            to,
                            "Reference to undeclared module",
                            format!(
                                "No module call named \"{call}\" is declared in {}.",
                                module_label(scope)
                            ),
                            range,
                        );
                        continue;
                    }
                    Some(c) if !c.module.outputs.contains_key(output) => {
                        self.report(
                            to,
                            "Unsupported attribute",
                            format!(
                                "This object does not have an attribute named \"{output}\"; module.{call} declares no such output."
                            ),
                            range,
                        );
                        continue;
                    }
                    Some(_) => vec![NodeKey::Output(scope.child(call), output.clone())],
                },
                Reference::Resource {
                    resource_type,
                    name,
                    index,
                } => {
                    let block = format!("{resource_type}.{name}");
                    if !module.resources.contains_key(&block) {
                        self.report(
                            to,
                            "Reference to undeclared resource",
                            format!(
                                "A managed resource \"{resource_type}\" \"{name}\" has not been declared in {}.",
                                module_label(scope)
                            ),
                            range,
                        );
                        continue;
                    }
                    let all = self
                        .instances
                        .get(&(scope.clone(), block))
                        .cloned()
                        .unwrap_or_default();
                    let exact: Vec<ResourceAddress> = all
                        .iter()
                        .filter(|a| index.is_some() && a.index == *index)
                        .cloned()
                        .collect();
                    let chosen = if exact.is_empty() { all } else { exact };
                    chosen.into_iter().map(NodeKey::Resource).collect()
                }
            };

            for source in sources {
                self.edges.insert((source, to.clone()));
            }
        }
    }
}

/// Fills in the resource instances each resource node reads, looking
/// through variables, locals, and outputs.
fn record_dependencies(graph: &mut Graph) {
    for id in 0..graph.len() {
        if !matches!(graph.node(id).kind, NodeKind::Resource { .. }) {
            continue;
        }
        let mut found = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = graph.dependencies(id);
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep) {
                continue;
            }
            match &graph.node(dep).key {
                NodeKey::Resource(address) => {
                    found.insert(address.clone());
                }
                NodeKey::Provider(_) | NodeKey::Orphan(_) => {}
                _ => stack.extend(graph.dependencies(dep)),
            }
        }
        if let NodeKind::Resource { dependencies, .. } = &mut graph.node_mut(id).kind {
            *dependencies = found.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::state::ResourceRecord;
    use crate::value::MarkedValue;

    fn values_with(vars: &[(&str, MarkedValue)]) -> Arc<NamedValues> {
        let values = Arc::new(NamedValues::new());
        for (name, value) in vars {
            values.set(ValueKey::Variable(ModulePath::root(), (*name).to_string()), value.clone());
        }
        values
    }

    fn build(yaml: &str, state: &State, mode: GraphMode) -> (Graph, Diagnostics) {
        let config = Configuration::from_yaml(yaml, "main.strata.yaml").unwrap();
        let values = values_with(&[("n", MarkedValue::number(2.0))]);
        GraphBuilder::new(&config, values).build(state, mode)
    }

    fn record(name: &str, deps: &[&str]) -> ResourceRecord {
        ResourceRecord::new(
            ResourceAddress::new("null_resource", name),
            "null",
            &MarkedValue::object_from([("id", MarkedValue::string(name))]),
        )
        .with_dependencies(deps.iter().map(|d| ResourceAddress::new("null_resource", *d)).collect())
    }

    const CHAIN: &str = r#"
variables:
  n: {}
locals:
  first: "${null_resource.a.id}"
resources:
  - type: null_resource
    name: b
    count: "${var.n}"
    attributes:
      triggers:
        upstream: "${local.first}-${count.index}"
  - type: null_resource
    name: a
  - type: null_resource
    name: c
    depends_on: ["null_resource.b[1]"]
outputs:
  ids:
    value: "${null_resource.b}"
"#;

    #[test]
    fn test_expands_count_and_links_references() {
        let (graph, diags) = build(CHAIN, &State::new(), GraphMode::Plan);
        assert!(diags.is_empty(), "{diags:?}");
        let sig = graph.signature();
        let has = |a: &str, b: &str| sig.contains(&(a.to_string(), b.to_string()));

        assert!(has("null_resource.a", "local.first"));
        assert!(has("local.first", "null_resource.b[0]"));
        assert!(has("local.first", "null_resource.b[1]"));
        assert!(has("var.n", "null_resource.b[0]"));
        assert!(has("null_resource.b[1]", "null_resource.c"));
        assert!(!has("null_resource.b[0]", "null_resource.c"));
        assert!(has("null_resource.b[0]", "output.ids"));
        assert!(has("provider.null", "null_resource.a"));

        let b0 = graph
            .id_of(&NodeKey::Resource(ResourceAddress::new("null_resource", "b").with_index(Some(0))))
            .unwrap();
        match &graph.node(b0).kind {
            NodeKind::Resource { dependencies, .. } => {
                assert_eq!(dependencies, &vec![ResourceAddress::new("null_resource", "a")]);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_count_from_locals() {
        let yaml = r#"
variables:
  n: {}
locals:
  total: "${local.base}"
  base: "${var.n}"
  pending: "${null_resource.a.id}"
modules:
  workers:
    inputs:
      size: "${local.total}"
    source:
      variables:
        size: {}
      locals:
        size_copy: "${var.size}"
      resources:
        - type: null_resource
          name: w
          count: "${local.size_copy}"
resources:
  - type: null_resource
    name: a
  - type: null_resource
    name: b
    count: "${local.total}"
"#;
        let (graph, diags) = build(yaml, &State::new(), GraphMode::Plan);
        assert!(diags.is_empty(), "{diags:?}");

        let instance = |module: ModulePath, name: &str, index: usize| {
            NodeKey::Resource(
                ResourceAddress::new("null_resource", name)
                    .in_module(module)
                    .with_index(Some(index)),
            )
        };
        let workers = ModulePath::root().child("workers");
        assert!(graph.id_of(&instance(ModulePath::root(), "b", 1)).is_some());
        assert!(graph.id_of(&instance(ModulePath::root(), "b", 2)).is_none());
        assert!(graph.id_of(&instance(workers.clone(), "w", 1)).is_some());
        assert!(graph.id_of(&instance(workers, "w", 2)).is_none());
    }

    #[test]
    fn test_count_from_unknown_local_is_deferred_error() {
        let yaml = r#"
locals:
  pending: "${null_resource.a.id}"
resources:
  - type: null_resource
    name: a
  - type: null_resource
    name: b
    count: "${local.pending}"
"#;
        let (_, diags) = build(yaml, &State::new(), GraphMode::Plan);
        let errors: Vec<_> = diags.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].caused_by_unknown);
        assert_eq!(errors[0].summary, "Invalid count argument");
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let reordered = r#"
outputs:
  ids:
    value: "${null_resource.b}"
resources:
  - type: null_resource
    name: c
    depends_on: ["null_resource.b[1]"]
  - type: null_resource
    name: a
  - type: null_resource
    name: b
    count: "${var.n}"
    attributes:
      triggers:
        upstream: "${local.first}-${count.index}"
locals:
  first: "${null_resource.a.id}"
variables:
  n: {}
"#;
        let (a, _) = build(CHAIN, &State::new(), GraphMode::Plan);
        let (b, _) = build(reordered, &State::new(), GraphMode::Plan);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.levels(), b.levels());
    }

    #[test]
    fn test_undeclared_references() {
        let yaml = r#"
resources:
  - type: null_resource
    name: a
    attributes:
      triggers:
        x: "${null_resource.missing.id}"
        y: "${var.nope}"
        z: "${module.net.out}"
"#;
        let (_, diags) = build(yaml, &State::new(), GraphMode::Plan);
        let summaries: Vec<&str> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec![
                "Reference to undeclared resource",
                "Reference to undeclared input variable",
                "Reference to undeclared module",
            ]
        );
        assert!(diags.iter().all(|d| d.address.as_deref() == Some("null_resource.a")));
    }

    #[test]
    fn test_cycle_reported_once() {
        let yaml = r#"
resources:
  - type: null_resource
    name: a
    attributes:
      triggers:
        x: "${null_resource.b.id}"
  - type: null_resource
    name: b
    attributes:
      triggers:
        x: "${null_resource.a.id}"
"#;
        let (_, diags) = build(yaml, &State::new(), GraphMode::Plan);
        let cycles: Vec<_> = diags.iter().filter(|d| d.kind == DiagnosticKind::Cycle).collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].detail, "Cycle: null_resource.a, null_resource.b");
    }

    #[test]
    fn test_orphans_in_plan_mode() {
        let mut state = State::new();
        state.set(record("a", &[]));
        state.set(record("gone", &["a"]));
        let yaml = "resources:\n  - type: null_resource\n    name: a\n";
        let (graph, diags) = build(yaml, &state, GraphMode::Plan);
        assert!(diags.is_empty());
        let orphan = NodeKey::Orphan(ResourceAddress::new("null_resource", "gone"));
        assert!(graph.id_of(&orphan).is_some());
        assert!(graph
            .id_of(&NodeKey::Orphan(ResourceAddress::new("null_resource", "a")))
            .is_none());
        assert!(graph
            .signature()
            .contains(&("null_resource.gone (orphan)".to_string(), "null_resource.a".to_string())));
    }

    #[test]
    fn test_destroy_mode_reverses_recorded_dependencies() {
        let mut state = State::new();
        state.set(record("a", &[]));
        state.set(record("b", &["a"]));
        let (graph, diags) = build(CHAIN, &state, GraphMode::Destroy);
        assert!(diags.is_empty());
        let kinds: Vec<&str> = graph.nodes().map(|(_, n)| n.type_label()).collect();
        assert_eq!(kinds, vec!["provider", "variable", "orphan", "orphan"]);
        assert!(graph.signature().contains(&(
            "null_resource.b (orphan)".to_string(),
            "null_resource.a (orphan)".to_string()
        )));
    }

    #[test]
    fn test_refresh_mode_has_no_orphan_edges() {
        let mut state = State::new();
        state.set(record("a", &[]));
        state.set(record("b", &["a"]));
        let (graph, _) = build(CHAIN, &state, GraphMode::Refresh);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_count_must_be_known() {
        let yaml = r#"
resources:
  - type: null_resource
    name: a
  - type: null_resource
    name: b
    count: "${length(null_resource.a.id)}"
"#;
        let (_, diags) = build(yaml, &State::new(), GraphMode::Plan);
        let err = diags.errors().next().unwrap();
        assert_eq!(err.summary, "Invalid count argument");
        assert!(err.caused_by_unknown);
    }

    #[test]
    fn test_import_id_evaluated_up_front() {
        let yaml = r#"
variables:
  n: {}
resources:
  - type: null_resource
    name: a
imports:
  - to: null_resource.a
    id: "id-${var.n}"
"#;
        let (graph, diags) = build(yaml, &State::new(), GraphMode::Plan);
        assert!(diags.is_empty());
        let id = graph.id_of(&NodeKey::Resource(ResourceAddress::new("null_resource", "a"))).unwrap();
        match &graph.node(id).kind {
            NodeKind::Resource { import_id, .. } => assert_eq!(import_id.as_deref(), Some("id-2")),
            other => panic!("unexpected node {other:?}"),
        }
    }
}
