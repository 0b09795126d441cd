//! The plan walk: refresh, evaluate, and diff each instance.

use super::context::{mark_sensitive, prevent_destroy_error, provider_error, WalkContext};
use super::walker::NodeVisitor;
use crate::addrs::ResourceAddress;
use crate::config::Resource;
use crate::eval::ValueKey;
use crate::graph::{Node, NodeKind};
use crate::planner::{Action, ChangeReason, ChangeRecord, DiffEngine, PlanMode};
use crate::provider::ResourceSchema;
use crate::state::ResourceRecord;
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics, MarkedValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Computes a change per instance without touching infrastructure.
///
/// Refreshed records are written to the working state, which the engine
/// stores in the plan as the state apply starts from.
pub struct PlanVisitor {
    ctx: WalkContext,
    mode: PlanMode,
    refresh: bool,
    changes: Mutex<Vec<ChangeRecord>>,
    outputs: Mutex<BTreeMap<String, MarkedValue>>,
}

impl PlanVisitor {
    /// Creates a visitor. A refresh-only plan always refreshes.
    #[must_use]
    pub fn new(ctx: WalkContext, mode: PlanMode, refresh: bool) -> Self {
        Self {
            ctx,
            mode,
            refresh: refresh || mode == PlanMode::RefreshOnly,
            changes: Mutex::new(Vec::new()),
            outputs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Takes the collected changes.
    pub fn take_changes(&self) -> Vec<ChangeRecord> {
        std::mem::take(&mut *self.changes.lock())
    }

    /// Takes the planned root outputs.
    pub fn take_outputs(&self) -> BTreeMap<String, MarkedValue> {
        std::mem::take(&mut *self.outputs.lock())
    }

    /// Refreshes the record at `address`, if any. Drift is only worth
    /// reporting when refreshing is the point of the plan.
    async fn refreshed_prior(
        &self,
        address: &ResourceAddress,
        diags: &mut Diagnostics,
    ) -> Result<Option<ResourceRecord>, Diagnostics> {
        let Some(prior) = self.ctx.working.get(address) else {
            return Ok(None);
        };
        if !self.refresh {
            return Ok(Some(prior));
        }
        let (current, drift) = self.ctx.refresh_into_working(prior).await?;
        if self.mode == PlanMode::RefreshOnly
            && let Some(drift) = drift
        {
            diags.push(drift);
        }
        Ok(current)
    }

    async fn import(
        &self,
        address: &ResourceAddress,
        resource: &Resource,
        schema: &ResourceSchema,
        id: &str,
    ) -> Result<ResourceRecord, Diagnostic> {
        let provider = self
            .ctx
            .providers
            .require(&resource.provider)
            .map_err(|err| provider_error(address, "import", &err))?;
        info!("Importing {address} from {id}");
        let value = provider
            .import(&resource.resource_type, id)
            .await
            .map_err(|err| provider_error(address, "import", &err))?;
        let value = mark_sensitive(value, schema, None);
        Ok(ResourceRecord::new(address.clone(), resource.provider.clone(), &value))
    }

    async fn plan_resource(
        &self,
        address: &ResourceAddress,
        resource: &Resource,
        import_id: Option<&str>,
        dependencies: &[ResourceAddress],
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let schema = match self.ctx.schema(&resource.provider, &resource.resource_type) {
            Ok(schema) => schema,
            Err(err) => return err,
        };
        let prior = match self.refreshed_prior(address, &mut diags).await {
            Ok(prior) => prior,
            Err(err) => return err,
        };

        if self.mode == PlanMode::RefreshOnly {
            let value = prior.as_ref().map_or_else(MarkedValue::unknown, ResourceRecord::value);
            self.ctx.values.set(ValueKey::Resource(address.clone()), value);
            return diags;
        }

        let (desired, eval_diags) = self.ctx.evaluate_desired(address, resource, &schema);
        diags.extend(eval_diags);
        let Some(desired) = desired else {
            return diags;
        };
        if let Some(deferred) = deferred_attributes(&desired) {
            diags.push(
                Diagnostic::warning(
                    DiagnosticKind::UnknownValue,
                    "Configuration depends on values not yet known",
                    format!(
                        "{} will be decided during apply, once upstream objects exist.",
                        deferred.join(", ")
                    ),
                )
                .with_subject(Some(resource.range.child("attributes")))
                .caused_by_unknown(),
            );
        }

        let mut imported = None;
        if prior.is_none()
            && let Some(id) = import_id
        {
            match self.import(address, resource, &schema, id).await {
                Ok(record) => imported = Some(record),
                Err(err) => return diags.with(err),
            }
        }

        let mut change = DiffEngine::new(&resource.provider)
            .with_create_before_destroy(resource.lifecycle.create_before_destroy)
            .diff(address, Some(&desired), prior.as_ref().or(imported.as_ref()), &schema)
            .with_dependencies(dependencies.to_vec());
        if imported.is_some()
            && let Some(id) = import_id
        {
            change = change.with_import(id);
        }

        if change.action == Action::Replace && resource.lifecycle.prevent_destroy {
            return diags.with(prevent_destroy_error(address, resource));
        }
        if !change.unknown_paths.is_empty() {
            debug!("{address}: {} known after apply", change.unknown_paths.join(", "));
        }

        let after = change.after.clone().unwrap_or_default();
        self.ctx.values.set(ValueKey::Resource(address.clone()), after);
        debug!("Planned {} for {address} ({})", change.action, change.reason);
        self.changes.lock().push(change);
        diags
    }

    async fn plan_orphan(
        &self,
        address: &ResourceAddress,
        provider: &str,
        resource: Option<&Arc<Resource>>,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let prior = match self.refreshed_prior(address, &mut diags).await {
            Ok(Some(prior)) => prior,
            Ok(None) => return diags,
            Err(err) => return err,
        };
        if self.mode == PlanMode::RefreshOnly {
            return diags;
        }

        if let Some(resource) = resource
            && resource.lifecycle.prevent_destroy
        {
            return diags.with(prevent_destroy_error(address, resource));
        }
        let mut change = DiffEngine::new(provider)
            .destroy(address, &prior)
            .with_dependencies(prior.dependencies.clone());
        if self.mode == PlanMode::Normal {
            change.reason = ChangeReason::NotInConfiguration;
        }
        debug!("Planned destroy for {address} ({})", change.reason);
        self.changes.lock().push(change);
        diags
    }
}

/// Configured attributes that hold unknown values, or `None` if all are known.
fn deferred_attributes(desired: &MarkedValue) -> Option<Vec<String>> {
    let names: Vec<String> = desired
        .as_object()?
        .iter()
        .filter(|(_, value)| value.contains_unknown())
        .map(|(name, _)| name.clone())
        .collect();
    (!names.is_empty()).then_some(names)
}

#[async_trait]
impl NodeVisitor for PlanVisitor {
    async fn visit(&self, node: &Node) -> Diagnostics {
        match (&node.kind, node.key.address()) {
            (
                NodeKind::Resource {
                    resource,
                    import_id,
                    dependencies,
                    ..
                },
                Some(address),
            ) => {
                self.plan_resource(address, resource, import_id.as_deref(), dependencies)
                    .await
            }
            (NodeKind::Orphan { provider, resource }, Some(address)) => {
                self.plan_orphan(address, provider, resource.as_ref()).await
            }
            (NodeKind::Output { output }, _) => {
                let (value, diags) = self.ctx.visit_output(&node.module(), output);
                if let Some(value) = value {
                    self.outputs.lock().insert(output.name.clone(), value);
                }
                diags
            }
            _ => self.ctx.visit_common(node).await.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::walk::tests::{address, build, fixture, walk};
    use crate::graph::GraphMode;
    use crate::state::State;

    const CONFIG: &str = r#"
variables:
  name:
    default: one
resources:
  - type: null_resource
    name: first
    attributes:
      triggers:
        name: "${var.name}"
  - type: null_resource
    name: second
    attributes:
      triggers:
        upstream: "${null_resource.first.id}"
outputs:
  first_id:
    value: "${null_resource.first.id}"
"#;

    #[tokio::test]
    async fn test_unknowns_propagate_to_dependents() {
        let ctx = fixture(CONFIG, State::new());
        let graph = build(&ctx, GraphMode::Plan);
        let visitor = Arc::new(PlanVisitor::new(ctx, PlanMode::Normal, true));
        let report = walk(graph, Arc::clone(&visitor)).await;
        assert!(!report.diagnostics.has_errors(), "{:?}", report.diagnostics);

        let changes = visitor.take_changes();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.action == Action::Create));
        let second = changes.iter().find(|c| c.address == address("second")).unwrap();
        let triggers = second.after.as_ref().unwrap().get_attr("triggers").unwrap();
        assert!(!triggers.get_attr("upstream").unwrap().is_known());

        let deferred: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.caused_by_unknown)
            .collect();
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].address.as_deref(), Some("null_resource.second"));
        assert_eq!(deferred[0].kind, DiagnosticKind::UnknownValue);

        let outputs = visitor.take_outputs();
        assert!(!outputs["first_id"].is_known());
    }

    #[tokio::test]
    async fn test_orphan_in_normal_mode() {
        let mut state = State::new();
        state.set(ResourceRecord::new(
            address("gone"),
            "null",
            &MarkedValue::object_from([("id", MarkedValue::string("1"))]),
        ));
        let ctx = fixture("resources: []", state);
        let graph = build(&ctx, GraphMode::Plan);
        let visitor = Arc::new(PlanVisitor::new(ctx, PlanMode::Normal, false));
        walk(graph, Arc::clone(&visitor)).await;

        let changes = visitor.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Destroy);
        assert_eq!(changes[0].reason, ChangeReason::NotInConfiguration);
    }

    #[tokio::test]
    async fn test_refresh_only_records_nothing() {
        let mut state = State::new();
        state.set(ResourceRecord::new(
            address("first"),
            "null",
            &MarkedValue::object_from([("id", MarkedValue::string("1"))]),
        ));
        let ctx = fixture(CONFIG, state);
        let graph = build(&ctx, GraphMode::Plan);
        let visitor = Arc::new(PlanVisitor::new(ctx, PlanMode::RefreshOnly, false));
        let report = walk(graph, Arc::clone(&visitor)).await;
        assert!(!report.diagnostics.has_errors());
        assert!(visitor.take_changes().is_empty());
    }

    #[tokio::test]
    async fn test_prevent_destroy_blocks_replace() {
        let config = r#"
resources:
  - type: null_resource
    name: first
    lifecycle:
      prevent_destroy: true
    attributes:
      triggers:
        v: "2"
"#;
        let mut state = State::new();
        state.set(ResourceRecord::new(
            address("first"),
            "null",
            &MarkedValue::object_from([
                ("id", MarkedValue::string("1")),
                ("triggers", MarkedValue::object_from([("v", MarkedValue::string("1"))])),
            ]),
        ));
        let ctx = fixture(config, state);
        let graph = build(&ctx, GraphMode::Plan);
        let visitor = Arc::new(PlanVisitor::new(ctx, PlanMode::Normal, false));
        let report = walk(graph, Arc::clone(&visitor)).await;
        let errors: Vec<_> = report.diagnostics.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].summary, "Instance cannot be destroyed");
        assert!(visitor.take_changes().is_empty());
    }
}
