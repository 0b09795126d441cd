//! The engine: plan, apply, refresh, and validate one configuration
//! against one state store.
//!
//! Each operation builds a fresh graph and value table, walks it, and
//! (for mutating operations) commits the working state exactly once,
//! under the state lock.

use crate::addrs::{ModulePath, ResourceAddress};
use crate::config::{ConfigHasher, ConfigValidator, Configuration};
use crate::error::{ApplyError, ConfigError, PlanError, Result, StateError};
use crate::eval::{NamedValues, ValueKey};
use crate::graph::{Graph, GraphBuilder, GraphMode, NodeKind};
use crate::planner::{Plan, PlanMode, PlanSummary};
use crate::provider::ProviderRegistry;
use crate::state::{
    fingerprint, generate_holder_id, Operation, ResourceRecord, State, StateStore, WorkingState,
};
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics, Mark, MarkedValue};
use crate::walk::{
    retain_configured_outputs, ApplyVisitor, NodeState, PlanVisitor, RefreshVisitor, WalkContext,
    WalkReport, Walker, DEFAULT_PARALLELISM,
};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Options for [`Engine::plan`].
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    /// What the plan is for.
    pub mode: PlanMode,
    /// Read recorded objects back before diffing.
    pub refresh: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            mode: PlanMode::Normal,
            refresh: true,
        }
    }
}

/// Result of a walk that wrote state.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// The snapshot that was saved.
    pub state: State,
    /// Per-node results and diagnostics.
    pub report: WalkReport,
    /// What the walk was asked to do.
    pub summary: PlanSummary,
}

impl WalkOutcome {
    /// Turns an unsuccessful walk into an error. Successful nodes have
    /// been persisted either way.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Cancelled`] if the walk was interrupted and
    /// [`ApplyError::Incomplete`] if any node failed or was skipped.
    pub fn check(&self) -> Result<()> {
        if self.report.was_cancelled() {
            return Err(ApplyError::Cancelled {
                reason: format!(
                    "{} node(s) were not visited",
                    self.report.count(NodeState::Cancelled)
                ),
            }
            .into());
        }
        let failed = self.report.count(NodeState::Failed);
        let skipped = self.report.count(NodeState::Skipped);
        if failed > 0 || skipped > 0 || self.report.diagnostics.has_errors() {
            return Err(ApplyError::Incomplete { failed, skipped }.into());
        }
        Ok(())
    }
}

/// Plans and applies one configuration.
pub struct Engine {
    config: Arc<Configuration>,
    store: Arc<dyn StateStore>,
    providers: ProviderRegistry,
    parallelism: usize,
    cli_variables: BTreeMap<String, String>,
    env_variables: BTreeMap<String, String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.config.dir)
            .field("store", &self.store.location())
            .field("providers", &self.providers)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

/// Parses a raw variable value: YAML scalars and collections are typed,
/// anything else is a string.
fn parse_raw_value(raw: &str) -> MarkedValue {
    match serde_yaml::from_str::<serde_yaml::Value>(raw) {
        Ok(serde_yaml::Value::Null) if !matches!(raw.trim(), "" | "null" | "~") => MarkedValue::string(raw),
        Ok(serde_yaml::Value::Tagged(_)) | Err(_) => MarkedValue::string(raw),
        Ok(yaml) => MarkedValue::from_yaml(&yaml),
    }
}

/// Working state that starts from `snapshot` but commits relative to
/// `stored`, so the serial only moves when the stored content changes.
fn working_from(stored: State, snapshot: &State) -> WorkingState {
    let working = WorkingState::new(stored);
    for address in working.addresses() {
        if !snapshot.resources.contains_key(&address) {
            working.remove(&address);
        }
    }
    for record in snapshot.resources.values() {
        working.put(record.clone());
    }
    let outputs = &snapshot.outputs;
    working.retain_outputs(|name| outputs.contains_key(name));
    for (name, output) in outputs {
        working.set_output(name.clone(), output.clone());
    }
    working
}

impl Engine {
    /// Creates an engine with the built-in providers.
    #[must_use]
    pub fn new(config: Configuration, store: Arc<dyn StateStore>) -> Self {
        let providers = ProviderRegistry::with_builtins(&config.dir);
        Self {
            config: Arc::new(config),
            store,
            providers,
            parallelism: DEFAULT_PARALLELISM,
            cli_variables: BTreeMap::new(),
            env_variables: BTreeMap::new(),
        }
    }

    /// Replaces the provider registry.
    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Sets how many nodes run at once.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Sets variable values given on the command line.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.cli_variables = variables;
        self
    }

    /// Sets variable values taken from the environment.
    #[must_use]
    pub fn with_env_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.env_variables = variables;
        self
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The state store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    fn config_hash(&self) -> String {
        ConfigHasher::new().hash_config(&self.config.source)
    }

    /// Resolves root variables: command line, then environment, then
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for a value given for an undeclared variable, or a
    /// required variable without a value.
    pub fn resolve_variables(&self) -> Result<BTreeMap<String, MarkedValue>> {
        if let Some(name) = self
            .cli_variables
            .keys()
            .find(|name| !self.config.root.variables.contains_key(*name))
        {
            return Err(ConfigError::validation(
                format!("A value was given for undeclared variable \"{name}\""),
                format!("var.{name}"),
            )
            .into());
        }

        let mut resolved = BTreeMap::new();
        for (name, variable) in &self.config.root.variables {
            let value = if let Some(raw) = self.cli_variables.get(name) {
                parse_raw_value(raw)
            } else if let Some(raw) = self.env_variables.get(name) {
                debug!("Variable {name} set from the environment");
                parse_raw_value(raw)
            } else if let Some(default) = &variable.default {
                default.clone()
            } else {
                return Err(ConfigError::validation(
                    format!(
                        "No value for required variable \"{name}\"; set it with --var {name}=VALUE or the STRATA_VAR_{name} environment variable"
                    ),
                    format!("var.{name}"),
                )
                .into());
            };
            let value = if variable.sensitive {
                value.mark(Mark::Sensitive)
            } else {
                value
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    fn seed(variables: &BTreeMap<String, MarkedValue>) -> Arc<NamedValues> {
        let values = Arc::new(NamedValues::new());
        for (name, value) in variables {
            values.set(ValueKey::Variable(ModulePath::root(), name.clone()), value.clone());
        }
        values
    }

    fn context(&self, values: Arc<NamedValues>, working: Arc<WorkingState>) -> WalkContext {
        WalkContext {
            config: Arc::clone(&self.config),
            providers: self.providers.clone(),
            values,
            working,
        }
    }

    /// Runs `operation` while holding the state lock.
    async fn locked<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let holder = generate_holder_id();
        let lock = self.store.acquire_lock(&holder, operation).await?;
        debug!("Acquired state lock {} for {operation}", lock.lock_id);
        let result = f.await;
        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
        result
    }

    /// Computes a plan.
    ///
    /// Graph construction errors (undeclared references, cycles, unknown
    /// `count`) stop before any node is visited; the returned plan then
    /// carries those diagnostics and no changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, variables cannot
    /// be resolved, or state cannot be read.
    pub async fn plan(&self, options: PlanOptions, cancel: &CancellationToken) -> Result<Plan> {
        ConfigValidator::new().validate(&self.config)?;
        let stored = self.store.load().await?;
        let variables = self.resolve_variables()?;
        let mut plan = Plan::new(options.mode, self.config_hash(), fingerprint(stored.as_ref()));
        plan.variables.clone_from(&variables);
        let state = stored.unwrap_or_default();

        info!("Planning ({} mode)", options.mode);
        let values = Self::seed(&variables);
        let graph_mode = match options.mode {
            PlanMode::Destroy => GraphMode::Destroy,
            PlanMode::Normal | PlanMode::RefreshOnly => GraphMode::Plan,
        };
        let (graph, build_diags) = GraphBuilder::new(&self.config, Arc::clone(&values)).build(&state, graph_mode);
        plan.levels = graph
            .levels()
            .iter()
            .map(|level| level.iter().map(|&id| graph.node(id).key.to_string()).collect())
            .collect();
        if build_diags.has_errors() {
            warn!("Graph construction failed with {} error(s)", build_diags.error_count());
            plan.diagnostics = build_diags;
            return Ok(plan);
        }

        let working = Arc::new(WorkingState::new(state));
        let visitor = Arc::new(PlanVisitor::new(
            self.context(values, Arc::clone(&working)),
            options.mode,
            options.refresh,
        ));
        let level_of = address_levels(&graph);
        let report = Walker::new(self.parallelism)
            .walk(Arc::new(graph), Arc::clone(&visitor), cancel)
            .await;

        plan.changes = visitor.take_changes();
        plan.outputs = visitor.take_outputs();
        plan.sort_changes(|address| level_of.get(address).copied().unwrap_or(usize::MAX));
        plan.prior_state = Some(working.snapshot());
        plan.diagnostics = build_diags;
        plan.diagnostics.extend(report.diagnostics.clone());
        if report.was_cancelled() {
            plan.diagnostics.push(Diagnostic::error(
                DiagnosticKind::Cancelled,
                "Plan interrupted",
                "The plan is incomplete and cannot be applied.",
            ));
        }

        info!("{} ({} error(s))", plan.summary(), plan.diagnostics.error_count());
        Ok(plan)
    }

    /// Applies a plan.
    ///
    /// The stored state must still be the one the plan was computed
    /// against, and the configuration must hash the same. The new state is
    /// saved even when some nodes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan has errors or is stale, the lock cannot
    /// be taken, or state cannot be read or written.
    pub async fn apply(&self, plan: &Plan, cancel: &CancellationToken) -> Result<WalkOutcome> {
        if plan.has_errors() {
            return Err(PlanError::HasErrors {
                count: plan.diagnostics.error_count(),
            }
            .into());
        }
        let operation = if plan.mode == PlanMode::Destroy { "destroy" } else { "apply" };
        self.locked(operation, self.apply_locked(plan, cancel)).await
    }

    async fn apply_locked(&self, plan: &Plan, cancel: &CancellationToken) -> Result<WalkOutcome> {
        let stored = self.store.load().await?;
        let found = fingerprint(stored.as_ref());
        if found != plan.prior_state_fingerprint {
            return Err(PlanError::StateDrift {
                expected: plan.prior_state_fingerprint.clone(),
                found,
            }
            .into());
        }
        let hash = self.config_hash();
        if !ConfigHasher::hashes_match(&hash, &plan.config_hash) {
            return Err(PlanError::ConfigChanged {
                expected: plan.config_hash.clone(),
                found: hash,
            }
            .into());
        }

        let stored = stored.unwrap_or_default();
        let snapshot = plan.prior_state.clone().unwrap_or_else(|| stored.clone());
        let working = Arc::new(working_from(stored, &snapshot));

        if plan.mode == PlanMode::RefreshOnly {
            let state = working.commit(Operation::Refresh, None);
            self.store.save(&state).await?;
            info!("Saved refreshed state (serial {})", state.serial);
            return Ok(WalkOutcome {
                state,
                report: WalkReport::default(),
                summary: plan.summary(),
            });
        }

        let values = Self::seed(&plan.variables);
        let graph_mode = if plan.mode == PlanMode::Destroy {
            GraphMode::Destroy
        } else {
            GraphMode::Plan
        };
        let (graph, diags) = GraphBuilder::new(&self.config, Arc::clone(&values)).build(&snapshot, graph_mode);
        if let Some(first) = diags.errors().next() {
            return Err(PlanError::Inconsistent {
                message: first.to_string(),
            }
            .into());
        }
        check_plan_matches_graph(plan, &graph)?;

        info!("Executing plan {} with {} changes", plan.id, plan.changes.len());
        let ctx = self.context(values, Arc::clone(&working));
        let visitor = Arc::new(ApplyVisitor::new(ctx.clone(), plan.changes.iter().cloned()));
        let report = Walker::new(self.parallelism)
            .walk(Arc::new(graph), visitor, cancel)
            .await;
        retain_configured_outputs(&ctx, plan.mode == PlanMode::Destroy);

        let errors = report.diagnostics.error_count();
        let error = (errors > 0 || report.was_cancelled()).then(|| {
            format!(
                "{errors} error(s), {} skipped, {} cancelled",
                report.count(NodeState::Skipped),
                report.count(NodeState::Cancelled)
            )
        });
        let op = if plan.mode == PlanMode::Destroy {
            Operation::Destroy
        } else {
            Operation::Apply
        };
        let state = working.commit(op, error);
        self.store.save(&state).await?;
        info!(
            "Apply finished: {} succeeded, {} failed, {} skipped (state serial {})",
            report.count(NodeState::Succeeded),
            report.count(NodeState::Failed),
            report.count(NodeState::Skipped),
            state.serial
        );

        Ok(WalkOutcome {
            state,
            report,
            summary: plan.summary(),
        })
    }

    /// Reads every recorded object back and saves the result.
    ///
    /// # Errors
    ///
    /// Returns an error if variables cannot be resolved, the lock cannot be
    /// taken, or state cannot be read or written.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<WalkOutcome> {
        ConfigValidator::new().validate(&self.config)?;
        let variables = self.resolve_variables()?;
        self.locked("refresh", async {
            let state = self.store.load().await?.unwrap_or_default();
            let values = Self::seed(&variables);
            let (graph, diags) =
                GraphBuilder::new(&self.config, Arc::clone(&values)).build(&state, GraphMode::Refresh);
            if diags.has_errors() {
                return Ok(WalkOutcome {
                    state,
                    report: WalkReport {
                        diagnostics: diags,
                        states: BTreeMap::new(),
                    },
                    summary: PlanSummary::default(),
                });
            }
            let working = Arc::new(WorkingState::new(state));
            let visitor = Arc::new(RefreshVisitor::new(self.context(values, Arc::clone(&working))));
            let report = Walker::new(self.parallelism)
                .walk(Arc::new(graph), visitor, cancel)
                .await;
            let error = report
                .diagnostics
                .has_errors()
                .then(|| format!("{} error(s)", report.diagnostics.error_count()));
            let state = working.commit(Operation::Refresh, error);
            self.store.save(&state).await?;
            info!("Refreshed {} resource(s)", state.resources.len());
            Ok(WalkOutcome {
                state,
                report,
                summary: PlanSummary::default(),
            })
        })
        .await
    }

    /// Values for a walk that does not need real variable values: given
    /// values and defaults, with the rest unknown.
    fn placeholder_values(&self) -> Arc<NamedValues> {
        let values = Arc::new(NamedValues::new());
        for (name, variable) in &self.config.root.variables {
            let value = self
                .cli_variables
                .get(name)
                .or_else(|| self.env_variables.get(name))
                .map(|raw| parse_raw_value(raw))
                .or_else(|| variable.default.clone())
                .unwrap_or_else(MarkedValue::unknown);
            values.set(ValueKey::Variable(ModulePath::root(), name.clone()), value);
        }
        values
    }

    /// Validates the configuration and builds its graph.
    ///
    /// Problems that stem only from unset variables are not reported.
    ///
    /// # Errors
    ///
    /// Returns an error if static validation fails.
    pub fn validate(&self) -> Result<Diagnostics> {
        let result = ConfigValidator::new().validate(&self.config)?;
        let (_, diags) =
            GraphBuilder::new(&self.config, self.placeholder_values()).build(&State::new(), GraphMode::Plan);
        let mut diags: Diagnostics = diags.into_iter().filter(|d| !d.caused_by_unknown).collect();
        for warning in result.warnings {
            diags.push(Diagnostic::warning(DiagnosticKind::Config, "Configuration warning", warning));
        }
        Ok(diags)
    }

    /// Builds the plan graph against the stored state.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be read.
    pub async fn graph(&self, mode: GraphMode) -> Result<(Graph, Diagnostics)> {
        let state = self.store.load().await?.unwrap_or_default();
        Ok(GraphBuilder::new(&self.config, self.placeholder_values()).build(&state, mode))
    }

    /// Removes a record from state without touching the real object.
    ///
    /// # Errors
    ///
    /// Returns an error if no record exists at `address`, or state cannot be
    /// read, locked, or written.
    pub async fn state_rm(&self, address: &ResourceAddress) -> Result<ResourceRecord> {
        state_rm(self.store.as_ref(), address).await
    }
}

/// Removes a record from the stored state, under the lock.
///
/// # Errors
///
/// Returns an error if no record exists at `address`, or state cannot be
/// read, locked, or written.
pub async fn state_rm(store: &dyn StateStore, address: &ResourceAddress) -> Result<ResourceRecord> {
    let holder = generate_holder_id();
    let lock = store.acquire_lock(&holder, "state rm").await?;
    let result = async {
        let state = store.load().await?.unwrap_or_default();
        let working = WorkingState::new(state);
        let removed = working.remove(address).ok_or_else(|| StateError::ResourceNotFound {
            address: address.to_string(),
        })?;
        let state = working.commit(Operation::StateRm, None);
        store.save(&state).await?;
        info!("Removed {address} from state");
        Ok(removed)
    }
    .await;
    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    result
}

fn address_levels(graph: &Graph) -> BTreeMap<ResourceAddress, usize> {
    let levels = graph.level_of();
    graph
        .nodes()
        .filter_map(|(id, node)| node.key.address().map(|a| (a.clone(), levels[id])))
        .collect()
}

/// Every change must belong to a node of the apply graph, and every
/// configured instance must have a change.
fn check_plan_matches_graph(plan: &Plan, graph: &Graph) -> Result<()> {
    let changed: BTreeSet<&ResourceAddress> = plan.changes.iter().map(|c| &c.address).collect();
    let mut nodes = BTreeSet::new();
    for (_, node) in graph.nodes() {
        let Some(address) = node.key.address() else {
            continue;
        };
        nodes.insert(address);
        if matches!(node.kind, NodeKind::Resource { .. }) && !changed.contains(address) {
            return Err(PlanError::Inconsistent {
                message: format!("{address} is in the configuration but not in the plan"),
            }
            .into());
        }
    }
    if let Some(missing) = changed.iter().find(|a| !nodes.contains(*a)) {
        return Err(PlanError::Inconsistent {
            message: format!("the plan changes {missing}, which is neither configured nor in state"),
        }
        .into());
    }
    debug!("Plan matches graph: {} instance(s)", nodes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::state::MemoryStateStore;

    fn engine(yaml: &str) -> Engine {
        let config = Configuration::from_yaml(yaml, "main.strata.yaml").unwrap();
        Engine::new(config, Arc::new(MemoryStateStore::new()))
    }

    const VARS: &str = r#"
variables:
  region:
    default: us-east-1
  size: {}
  token:
    sensitive: true
    default: abc
"#;

    #[test]
    fn test_variable_precedence() {
        let engine = engine(VARS)
            .with_variables(BTreeMap::from([("size".to_string(), "3".to_string())]))
            .with_env_variables(BTreeMap::from([
                ("size".to_string(), "9".to_string()),
                ("region".to_string(), "eu-west-1".to_string()),
            ]));
        let vars = engine.resolve_variables().unwrap();
        assert_eq!(vars["size"], MarkedValue::number(3.0));
        assert_eq!(vars["region"], MarkedValue::string("eu-west-1"));
        assert!(vars["token"].is_sensitive());
    }

    #[test]
    fn test_missing_required_variable() {
        let err = engine(VARS).resolve_variables().unwrap_err();
        assert!(err.to_string().contains("No value for required variable \"size\""));
    }

    #[test]
    fn test_undeclared_variable() {
        let engine = engine(VARS).with_variables(BTreeMap::from([("nope".to_string(), "1".to_string())]));
        assert!(engine.resolve_variables().is_err());
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(parse_raw_value("3"), MarkedValue::number(3.0));
        assert_eq!(parse_raw_value("true"), MarkedValue::bool(true));
        assert_eq!(parse_raw_value("hello world"), MarkedValue::string("hello world"));
        assert_eq!(parse_raw_value(""), MarkedValue::null());
    }

    #[test]
    fn test_validate_ignores_unset_variables() {
        let yaml = r#"
variables:
  n: {}
resources:
  - type: null_resource
    name: a
    count: "${var.n}"
"#;
        let diags = engine(yaml).validate().unwrap();
        assert!(!diags.has_errors(), "{diags:?}");
    }

    #[tokio::test]
    async fn test_state_rm() {
        let mut state = State::new();
        let address = ResourceAddress::new("null_resource", "a");
        state.set(ResourceRecord::new(address.clone(), "null", &MarkedValue::object_from([("id", MarkedValue::string("1"))])));
        let store = MemoryStateStore::with_state(state);

        let removed = state_rm(&store, &address).await.unwrap();
        assert_eq!(removed.id(), Some("1"));
        let saved = store.snapshot().unwrap();
        assert!(saved.resources.is_empty());
        assert_eq!(saved.serial, 1);
        assert!(state_rm(&store, &address).await.is_err());
        assert!(!store.is_locked().await.unwrap());
    }
}
