//! The apply walk: carry out planned changes.

use super::context::{mark_sensitive, provider_error, WalkContext};
use super::walker::NodeVisitor;
use crate::addrs::ResourceAddress;
use crate::config::Resource;
use crate::eval::ValueKey;
use crate::graph::{Node, NodeKind};
use crate::planner::{Action, ChangeRecord, DiffEngine};
use crate::provider::{Provider, ResourceSchema};
use crate::state::ResourceRecord;
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics, MarkedValue};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Applies the change planned for each instance and records the result.
///
/// A node writes the working state only once its provider calls
/// succeeded; a failed node leaves its prior record untouched.
pub struct ApplyVisitor {
    ctx: WalkContext,
    changes: BTreeMap<ResourceAddress, ChangeRecord>,
}

fn inconsistent(address: &ResourceAddress, detail: String) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Evaluation,
        "Inconsistent final plan",
        format!("When expanding the plan for {address} to include new values learned so far during apply, {detail}"),
    )
}

/// Checks that a change recomputed during apply keeps every promise of
/// the planned one.
fn check_consistent(planned: &ChangeRecord, final_change: &ChangeRecord) -> Result<(), Diagnostic> {
    let address = &planned.address;
    if final_change.action.weight() > planned.action.weight() {
        return Err(inconsistent(
            address,
            format!(
                "the action changed from {} to {}.",
                planned.action, final_change.action
            ),
        ));
    }
    let (Some(planned_after), Some(final_after)) = (
        planned.after.as_ref().and_then(MarkedValue::as_object),
        final_change.after.as_ref().and_then(MarkedValue::as_object),
    ) else {
        return Ok(());
    };
    for (name, value) in planned_after {
        if value.contains_unknown() {
            continue;
        }
        let now = final_after.get(name).cloned().unwrap_or_default();
        if !(value.is_null() && now.is_null()) && !value.equals_ignoring_marks(&now) {
            return Err(inconsistent(
                address,
                format!("the planned value for \"{name}\" changed from {value} to {now}."),
            ));
        }
    }
    Ok(())
}

impl ApplyVisitor {
    /// Creates a visitor for `changes`.
    #[must_use]
    pub fn new(ctx: WalkContext, changes: impl IntoIterator<Item = ChangeRecord>) -> Self {
        Self {
            ctx,
            changes: changes.into_iter().map(|c| (c.address.clone(), c)).collect(),
        }
    }

    /// The planned change, made final with values learned during apply.
    fn finalize(
        &self,
        planned: &ChangeRecord,
        resource: &Resource,
        schema: &ResourceSchema,
        prior: Option<&ResourceRecord>,
    ) -> Result<ChangeRecord, Diagnostics> {
        let deferred = planned.after.as_ref().is_some_and(|after| {
            after.as_object().is_some_and(|attrs| {
                attrs
                    .iter()
                    .any(|(k, v)| v.contains_unknown() && schema.get(k).is_none_or(|a| a.configurable()))
            })
        });
        if !deferred {
            return Ok(planned.clone());
        }
        let (desired, diags) = self.ctx.evaluate_desired(&planned.address, resource, schema);
        let Some(desired) = desired else {
            return Err(diags);
        };
        let mut final_change = DiffEngine::new(&planned.provider)
            .with_create_before_destroy(resource.lifecycle.create_before_destroy)
            .diff(&planned.address, Some(&desired), prior, schema)
            .with_dependencies(planned.dependencies.clone());
        final_change.import_id.clone_from(&planned.import_id);
        check_consistent(planned, &final_change).map_err(Diagnostics::from)?;
        debug!("{}: final action {}", planned.address, final_change.action);
        Ok(final_change)
    }

    async fn apply_resource(&self, address: &ResourceAddress, resource: &Resource) -> Diagnostics {
        let Some(planned) = self.changes.get(address) else {
            return Diagnostics::from(Diagnostic::error(
                DiagnosticKind::Evaluation,
                "Missing planned change",
                format!("The plan has no change for {address}."),
            ));
        };
        let schema = match self.ctx.schema(&planned.provider, &address.resource_type) {
            Ok(schema) => schema,
            Err(err) => return err,
        };
        let prior = self.ctx.working.get(address).or_else(|| {
            planned.import_id.as_ref().and_then(|_| {
                planned
                    .before
                    .as_ref()
                    .map(|before| ResourceRecord::new(address.clone(), planned.provider.clone(), before))
            })
        });
        let change = match self.finalize(planned, resource, &schema, prior.as_ref()) {
            Ok(change) => change,
            Err(err) => return err,
        };
        self.execute(&change, prior, &schema).await
    }

    async fn apply_orphan(&self, address: &ResourceAddress) -> Diagnostics {
        let Some(change) = self.changes.get(address) else {
            debug!("No change for {address}; nothing to do");
            return Diagnostics::new();
        };
        let Some(prior) = self.ctx.working.get(address) else {
            return Diagnostics::new();
        };
        let schema = self
            .ctx
            .schema(&change.provider, &address.resource_type)
            .unwrap_or_else(|_| ResourceSchema::new(&address.resource_type));
        self.execute(change, Some(prior), &schema).await
    }

    async fn execute(&self, change: &ChangeRecord, prior: Option<ResourceRecord>, schema: &ResourceSchema) -> Diagnostics {
        let address = &change.address;
        let provider = match self.ctx.providers.require(&change.provider) {
            Ok(provider) => provider,
            Err(err) => return Diagnostics::from(provider_error(address, "apply", &err)),
        };
        let planned = change.after.clone().unwrap_or_default();

        match (change.action, prior) {
            (Action::NoOp, Some(prior)) => {
                if change.import_id.is_some() || prior.dependencies != change.dependencies {
                    self.ctx
                        .working
                        .put(prior.clone().with_dependencies(change.dependencies.clone()));
                }
                self.publish(address, prior.value());
                Diagnostics::new()
            }
            (Action::NoOp, None) => Diagnostics::new(),
            (Action::Create, _) => self.create(provider.as_ref(), change, &planned, schema).await,
            (Action::Update, Some(prior)) => {
                info!("Updating {address}");
                match provider
                    .update(&address.resource_type, &prior.attributes, &planned.clear_marks())
                    .await
                {
                    Ok(value) => {
                        self.record(change, value, &planned, schema);
                        Diagnostics::new()
                    }
                    Err(err) => Diagnostics::from(provider_error(address, "update", &err)),
                }
            }
            (Action::Replace, Some(prior)) if change.create_before_destroy => {
                let diags = self.create(provider.as_ref(), change, &planned, schema).await;
                if diags.has_errors() {
                    return diags;
                }
                self.delete(provider.as_ref(), &prior, false).await
            }
            (Action::Replace, Some(prior)) => {
                let diags = self.delete(provider.as_ref(), &prior, true).await;
                if diags.has_errors() {
                    return diags;
                }
                self.create(provider.as_ref(), change, &planned, schema).await
            }
            (Action::Destroy, Some(prior)) => self.delete(provider.as_ref(), &prior, true).await,
            (Action::Update | Action::Replace, None) => self.create(provider.as_ref(), change, &planned, schema).await,
            (Action::Destroy, None) => Diagnostics::new(),
        }
    }

    async fn create(
        &self,
        provider: &dyn Provider,
        change: &ChangeRecord,
        planned: &MarkedValue,
        schema: &ResourceSchema,
    ) -> Diagnostics {
        let address = &change.address;
        info!("Creating {address}");
        match provider.create(&address.resource_type, &planned.clear_marks()).await {
            Ok(value) => {
                self.record(change, value, planned, schema);
                Diagnostics::new()
            }
            Err(err) => Diagnostics::from(provider_error(address, "create", &err)),
        }
    }

    /// Deletes the object behind `prior`. The record is removed from state
    /// only when `forget` is set; a create-before-destroy replacement has
    /// already written its new record.
    async fn delete(&self, provider: &dyn Provider, prior: &ResourceRecord, forget: bool) -> Diagnostics {
        let address = &prior.address;
        info!("Destroying {address}");
        match provider.delete(&address.resource_type, &prior.attributes).await {
            Ok(()) => {
                if forget {
                    self.ctx.working.remove(address);
                }
                Diagnostics::new()
            }
            Err(err) => {
                if !forget {
                    warn!("{address}: replacement created but the old object could not be deleted");
                }
                Diagnostics::from(provider_error(address, "destroy", &err))
            }
        }
    }

    fn record(&self, change: &ChangeRecord, value: MarkedValue, planned: &MarkedValue, schema: &ResourceSchema) {
        let value = mark_sensitive(value, schema, Some(planned));
        let record = ResourceRecord::new(change.address.clone(), change.provider.clone(), &value)
            .with_dependencies(change.dependencies.clone());
        self.ctx.working.put(record);
        self.publish(&change.address, value);
    }

    fn publish(&self, address: &ResourceAddress, value: MarkedValue) {
        self.ctx.values.set(ValueKey::Resource(address.clone()), value);
    }
}

#[async_trait]
impl NodeVisitor for ApplyVisitor {
    async fn visit(&self, node: &Node) -> Diagnostics {
        match (&node.kind, node.key.address()) {
            (NodeKind::Resource { resource, .. }, Some(address)) => self.apply_resource(address, resource).await,
            (NodeKind::Orphan { .. }, Some(address)) => self.apply_orphan(address).await,
            (NodeKind::Output { output }, _) => {
                let (value, diags) = self.ctx.visit_output(&node.module(), output);
                if let Some(value) = value {
                    self.ctx.record_output(&output.name, &value, output.sensitive);
                }
                diags
            }
            _ => self.ctx.visit_common(node).await.unwrap_or_default(),
        }
    }
}

/// Keeps the working state's outputs in line with the configuration.
pub(crate) fn retain_configured_outputs(ctx: &WalkContext, destroy: bool) {
    let outputs = &ctx.config.root.outputs;
    ctx.working
        .retain_outputs(|name| !destroy && outputs.contains_key(name));
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::graph::GraphMode;
    use crate::planner::{ChangeReason, PlanMode};
    use crate::state::State;
    use crate::walk::tests::{address, build, fixture, walk};
    use crate::walk::PlanVisitor;
    use std::sync::Arc;

    async fn plan_and_apply(config: &str, state: State) -> (State, Diagnostics) {
        let ctx = fixture(config, state);
        let graph = build(&ctx, GraphMode::Plan);
        let planner = Arc::new(PlanVisitor::new(ctx.clone(), PlanMode::Normal, false));
        let report = walk(Arc::clone(&graph), Arc::clone(&planner)).await;
        assert!(!report.diagnostics.has_errors(), "{:?}", report.diagnostics);

        let prior = ctx.working.snapshot();
        let apply_ctx = fixture(config, prior);
        let graph = build(&apply_ctx, GraphMode::Plan);
        let visitor = Arc::new(ApplyVisitor::new(apply_ctx.clone(), planner.take_changes()));
        let report = walk(graph, visitor).await;
        retain_configured_outputs(&apply_ctx, false);
        (apply_ctx.working.commit(crate::state::Operation::Apply, None), report.diagnostics)
    }

    const CONFIG: &str = r#"
resources:
  - type: null_resource
    name: first
    attributes:
      triggers:
        v: "1"
  - type: null_resource
    name: second
    attributes:
      triggers:
        upstream: "${null_resource.first.id}"
outputs:
  second_id:
    value: "${null_resource.second.id}"
"#;

    #[tokio::test]
    async fn test_apply_resolves_deferred_values() {
        let (state, diags) = plan_and_apply(CONFIG, State::new()).await;
        assert!(!diags.has_errors(), "{diags:?}");
        assert_eq!(state.resources.len(), 2);

        let first_id = state.get(&address("first")).unwrap().id().unwrap().to_string();
        let second = state.get(&address("second")).unwrap();
        let upstream = second.value().get_attr("triggers").unwrap().get_attr("upstream").unwrap();
        assert_eq!(upstream, MarkedValue::string(first_id));
        assert_eq!(second.dependencies, vec![address("first")]);
        assert_eq!(state.outputs["second_id"].value.as_str(), second.id());
        assert_eq!(state.serial, 1);
    }

    #[tokio::test]
    async fn test_orphan_destroy_removes_record() {
        let (state, _) = plan_and_apply(CONFIG, State::new()).await;
        let (state, diags) = plan_and_apply("resources: []", state).await;
        assert!(!diags.has_errors());
        assert!(state.resources.is_empty());
        assert!(state.outputs.is_empty());
    }

    #[test]
    fn test_consistency_check() {
        let addr = address("a");
        let mut planned = ChangeRecord::new(addr.clone(), Action::Update, ChangeReason::DeferredValues);
        planned.after = Some(MarkedValue::object_from([
            ("x", MarkedValue::string("1")),
            ("y", MarkedValue::unknown()),
        ]));

        let mut same = planned.clone();
        same.after = Some(MarkedValue::object_from([
            ("x", MarkedValue::string("1")),
            ("y", MarkedValue::string("resolved")),
        ]));
        assert!(check_consistent(&planned, &same).is_ok());

        let mut escalated = same.clone();
        escalated.action = Action::Replace;
        assert!(check_consistent(&planned, &escalated).is_err());

        let mut changed = same;
        changed.after = Some(MarkedValue::object_from([
            ("x", MarkedValue::string("2")),
            ("y", MarkedValue::string("resolved")),
        ]));
        let err = check_consistent(&planned, &changed).unwrap_err();
        assert_eq!(err.summary, "Inconsistent final plan");
    }
}
