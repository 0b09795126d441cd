//! End-to-end tests: plan and apply real configurations against an
//! in-memory state store and a provider that keeps its objects in memory.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use strata::addrs::ResourceAddress;
use strata::config::Configuration;
use strata::engine::{Engine, PlanOptions};
use strata::error::{ApplyError, PlanError, ProviderError, StrataError};
use strata::graph::{GraphMode, NodeKey};
use strata::planner::{Action, ChangeReason, Plan, PlanMode};
use strata::provider::{AttributeSchema, Provider, ProviderRegistry, ProviderResult, ResourceSchema};
use strata::state::{MemoryStateStore, StateStore};
use strata::value::{DiagnosticKind, MarkedValue, ValueType};
use strata::walk::NodeState;

const THING: &str = "fake_thing";

/// Keeps objects in memory so refresh sees what apply did.
#[derive(Default)]
struct FakeProvider {
    objects: Mutex<BTreeMap<String, MarkedValue>>,
    next_id: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    fn forget(&self, id: &str) {
        self.objects.lock().remove(id);
    }

    fn put(&self, id: &str, attrs: MarkedValue) {
        self.objects.lock().insert(id.to_string(), with_id(attrs, id));
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock())
    }
}

fn with_id(value: MarkedValue, id: &str) -> MarkedValue {
    let mut attrs = value.as_object().cloned().unwrap_or_default();
    attrs.insert("id".to_string(), MarkedValue::string(id));
    MarkedValue::object(attrs)
}

fn id_of(value: &MarkedValue) -> String {
    value
        .get_attr("id")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn resource_types(&self) -> Vec<String> {
        vec![THING.to_string()]
    }

    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        (resource_type == THING).then(|| {
            ResourceSchema::new(THING)
                .attribute(AttributeSchema::optional("name", ValueType::String).force_new())
                .attribute(AttributeSchema::optional("x", ValueType::Any))
                .attribute(AttributeSchema::optional("input", ValueType::Any))
                .attribute(AttributeSchema::optional("fail", ValueType::Bool))
                .attribute(AttributeSchema::computed("id", ValueType::String))
        })
    }

    async fn configure(&self, _config: &MarkedValue) -> ProviderResult<()> {
        Ok(())
    }

    async fn read(&self, _resource_type: &str, current: &MarkedValue) -> ProviderResult<Option<MarkedValue>> {
        Ok(self.objects.lock().get(&id_of(current)).cloned())
    }

    async fn create(&self, resource_type: &str, planned: &MarkedValue) -> ProviderResult<MarkedValue> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if planned.get_attr("fail") == Some(MarkedValue::bool(true)) {
            return Err(ProviderError::action(resource_type, "create", "boom"));
        }
        let id = format!("thing-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.calls.lock().push(format!("create {id}"));
        let object = with_id(planned.clone(), &id);
        self.objects.lock().insert(id, object.clone());
        Ok(object)
    }

    async fn update(&self, _resource_type: &str, prior: &MarkedValue, planned: &MarkedValue) -> ProviderResult<MarkedValue> {
        let id = id_of(prior);
        let object = with_id(planned.clone(), &id);
        self.objects.lock().insert(id, object.clone());
        Ok(object)
    }

    async fn delete(&self, _resource_type: &str, prior: &MarkedValue) -> ProviderResult<()> {
        self.calls.lock().push(format!("delete {}", id_of(prior)));
        self.objects.lock().remove(&id_of(prior));
        Ok(())
    }

    async fn import(&self, _resource_type: &str, id: &str) -> ProviderResult<MarkedValue> {
        self.objects
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })
    }
}

struct Harness {
    store: Arc<MemoryStateStore>,
    provider: Arc<FakeProvider>,
    parallelism: usize,
}

impl Harness {
    fn new() -> Self {
        Self::with_provider(FakeProvider::default())
    }

    fn with_provider(provider: FakeProvider) -> Self {
        Self {
            store: Arc::new(MemoryStateStore::new()),
            provider: Arc::new(provider),
            parallelism: 10,
        }
    }

    fn engine(&self, yaml: &str) -> Engine {
        let config = Configuration::from_yaml(yaml, "main.strata.yaml").unwrap();
        let providers = ProviderRegistry::with_builtins(&config.dir).with(self.provider.clone());
        Engine::new(config, self.store.clone())
            .with_providers(providers)
            .with_parallelism(self.parallelism)
    }

    async fn plan(&self, yaml: &str) -> Plan {
        self.engine(yaml)
            .plan(PlanOptions::default(), &CancellationToken::new())
            .await
            .unwrap()
    }

    async fn apply(&self, yaml: &str) -> strata::engine::WalkOutcome {
        let engine = self.engine(yaml);
        let plan = engine.plan(PlanOptions::default(), &CancellationToken::new()).await.unwrap();
        assert!(!plan.has_errors(), "{:?}", plan.diagnostics);
        engine.apply(&plan, &CancellationToken::new()).await.unwrap()
    }
}

fn thing(name: &str) -> ResourceAddress {
    ResourceAddress::new(THING, name)
}

fn attr(value: Option<&MarkedValue>, name: &str) -> MarkedValue {
    value.unwrap().get_attr(name).unwrap()
}

const ONE: &str = r#"
resources:
  - type: fake_thing
    name: a
    attributes:
      x: 1
"#;

const TWO: &str = r#"
resources:
  - type: fake_thing
    name: a
    attributes:
      x: 2
"#;

#[tokio::test]
async fn test_in_place_update() {
    let h = Harness::new();
    h.apply(ONE).await.check().unwrap();

    let plan = h.plan(TWO).await;
    let change = plan.change(&thing("a")).unwrap();
    assert_eq!(change.action, Action::Update);
    assert_eq!(change.reason, ChangeReason::AttributesChanged);
    assert_eq!(attr(change.before.as_ref(), "x"), MarkedValue::number(1.0));
    assert_eq!(attr(change.after.as_ref(), "x"), MarkedValue::number(2.0));
    assert_eq!(change.changed_paths, vec!["x"]);

    let outcome = h.engine(TWO).apply(&plan, &CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    let record = outcome.state.get(&thing("a")).unwrap();
    assert_eq!(record.value().get_attr("x"), Some(MarkedValue::number(2.0)));
    assert_eq!(record.id(), Some("thing-1"));
}

#[tokio::test]
async fn test_removed_resource_is_destroyed_from_state() {
    let both = r#"
resources:
  - type: fake_thing
    name: a
  - type: fake_thing
    name: b
"#;
    let only_a = r#"
resources:
  - type: fake_thing
    name: a
"#;
    let h = Harness::new();
    h.apply(both).await.check().unwrap();
    assert_eq!(h.provider.object_count(), 2);

    let engine = h.engine(only_a);
    let (graph, diags) = engine.graph(GraphMode::Plan).await.unwrap();
    assert!(!diags.has_errors());
    assert!(graph.id_of(&NodeKey::Resource(thing("b"))).is_none());
    assert!(graph.id_of(&NodeKey::Orphan(thing("b"))).is_some());

    let plan = h.plan(only_a).await;
    let change = plan.change(&thing("b")).unwrap();
    assert_eq!(change.action, Action::Destroy);
    assert_eq!(change.reason, ChangeReason::NotInConfiguration);
    assert_eq!(plan.change(&thing("a")).unwrap().action, Action::NoOp);

    let outcome = engine.apply(&plan, &CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    assert!(outcome.state.get(&thing("b")).is_none());
    assert_eq!(h.provider.object_count(), 1);
}

#[tokio::test]
async fn test_null_import_id() {
    let yaml = r#"
resources:
  - type: fake_thing
    name: a
imports:
  - to: fake_thing.a
    id: ~
"#;
    let plan = Harness::new().plan(yaml).await;
    let errors: Vec<_> = plan.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].detail, "The import ID cannot be null.");
    assert!(plan.changes.is_empty());
}

#[tokio::test]
async fn test_sensitive_import_id_is_rejected() {
    let yaml = r#"
variables:
  object_id:
    default: thing-9
    sensitive: true
resources:
  - type: fake_thing
    name: a
imports:
  - to: fake_thing.a
    id: "${var.object_id}"
"#;
    let plan = Harness::new().plan(yaml).await;
    let error = plan.diagnostics.errors().next().unwrap();
    assert_eq!(error.kind, DiagnosticKind::SensitivityViolation);
    assert_eq!(error.detail, "The import ID cannot be sensitive.");
    assert!(!plan.diagnostics.iter().any(|d| d.detail.contains("thing-9")));
}

#[tokio::test]
async fn test_import_adopts_existing_object() {
    let yaml = r#"
resources:
  - type: fake_thing
    name: a
    attributes:
      x: 5
imports:
  - to: fake_thing.a
    id: thing-9
"#;
    let h = Harness::new();
    h.provider.put("thing-9", MarkedValue::object_from([("x", MarkedValue::number(5.0))]));

    let plan = h.plan(yaml).await;
    let change = plan.change(&thing("a")).unwrap();
    assert_eq!(change.action, Action::NoOp);
    assert_eq!(change.import_id.as_deref(), Some("thing-9"));
    assert_eq!(plan.summary().import, 1);

    let outcome = h.engine(yaml).apply(&plan, &CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    assert_eq!(outcome.state.get(&thing("a")).unwrap().id(), Some("thing-9"));
    assert_eq!(h.provider.object_count(), 1);
}

const CHAIN: &str = r#"
resources:
  - type: fake_thing
    name: r1
    attributes:
      name: first
  - type: fake_thing
    name: r2
    attributes:
      input: "${fake_thing.r1.id}"
outputs:
  r2_input:
    value: "${fake_thing.r2.input}"
"#;

#[tokio::test]
async fn test_unknown_values_resolve_after_apply() {
    let h = Harness::new();
    let plan = h.plan(CHAIN).await;
    assert!(!plan.has_errors(), "{:?}", plan.diagnostics);

    let r2 = plan.change(&thing("r2")).unwrap();
    assert!(r2.action.weight() >= Action::Update.weight());
    assert!(!attr(r2.after.as_ref(), "input").is_known());
    assert!(
        plan.diagnostics
            .iter()
            .any(|d| d.caused_by_unknown && d.address.as_deref() == Some("fake_thing.r2"))
    );
    assert!(!plan.outputs["r2_input"].is_known());

    let outcome = h.engine(CHAIN).apply(&plan, &CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    let r1_id = outcome.state.get(&thing("r1")).unwrap().id().unwrap().to_string();
    let r2 = outcome.state.get(&thing("r2")).unwrap();
    assert_eq!(r2.value().get_attr("input"), Some(MarkedValue::string(&r1_id)));
    assert_eq!(r2.dependencies, vec![thing("r1")]);
    assert_eq!(outcome.state.outputs["r2_input"].value, MarkedValue::string(&r1_id));

    let replan = h.plan(CHAIN).await;
    let r2 = replan.change(&thing("r2")).unwrap();
    assert_eq!(r2.action, Action::NoOp);
    assert_eq!(attr(r2.after.as_ref(), "input"), MarkedValue::string(r1_id));
    assert!(!replan.diagnostics.iter().any(|d| d.caused_by_unknown));
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let h = Harness::new();
    let first = h.apply(CHAIN).await;
    first.check().unwrap();

    let plan = h.plan(CHAIN).await;
    assert!(!plan.has_changes());
    assert!(plan.changes.iter().all(|c| c.action == Action::NoOp));

    let second = h.engine(CHAIN).apply(&plan, &CancellationToken::new()).await.unwrap();
    second.check().unwrap();
    assert_eq!(second.state.serial, first.state.serial);
    assert_eq!(second.state.resources, first.state.resources);
}

#[tokio::test]
async fn test_failure_skips_dependents_only() {
    let yaml = r#"
resources:
  - type: fake_thing
    name: broken
    attributes:
      fail: true
  - type: fake_thing
    name: downstream
    attributes:
      input: "${fake_thing.broken.id}"
  - type: fake_thing
    name: independent
"#;
    let h = Harness::new();
    let engine = h.engine(yaml);
    let plan = engine.plan(PlanOptions::default(), &CancellationToken::new()).await.unwrap();
    let outcome = engine.apply(&plan, &CancellationToken::new()).await.unwrap();

    let report = &outcome.report;
    assert_eq!(report.state_of(&NodeKey::Resource(thing("broken"))), Some(NodeState::Failed));
    assert_eq!(report.state_of(&NodeKey::Resource(thing("downstream"))), Some(NodeState::Skipped));
    assert_eq!(report.state_of(&NodeKey::Resource(thing("independent"))), Some(NodeState::Succeeded));

    assert!(outcome.state.get(&thing("independent")).is_some());
    assert!(outcome.state.get(&thing("broken")).is_none());
    assert_eq!(h.store.snapshot().unwrap(), outcome.state);

    match outcome.check() {
        Err(StrataError::Apply(ApplyError::Incomplete { failed, skipped })) => {
            assert_eq!(failed, 1);
            assert_eq!(skipped, 1);
        }
        other => panic!("expected incomplete apply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_apply_saves_partial_state() {
    let h = Harness::new();
    let engine = h.engine(CHAIN);
    let plan = engine.plan(PlanOptions::default(), &CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = engine.apply(&plan, &cancel).await.unwrap();
    assert!(outcome.report.was_cancelled());
    assert!(matches!(outcome.check(), Err(StrataError::Apply(ApplyError::Cancelled { .. }))));
    assert!(outcome.state.resources.is_empty());
    assert!(!h.store.is_locked().await.unwrap());
}

#[tokio::test]
async fn test_cancelled_plan_cannot_be_applied() {
    let h = Harness::new();
    let engine = h.engine(CHAIN);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let plan = engine.plan(PlanOptions::default(), &cancel).await.unwrap();
    assert!(plan.has_errors());

    let err = engine.apply(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, StrataError::Plan(PlanError::HasErrors { .. })));
}

#[tokio::test]
async fn test_stale_plan_is_refused() {
    let h = Harness::new();
    let stale = h.plan(ONE).await;
    h.apply(ONE).await.check().unwrap();

    let err = h.engine(ONE).apply(&stale, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, StrataError::Plan(PlanError::StateDrift { .. })));
    assert!(err.is_stale_plan());
    assert!(!h.store.is_locked().await.unwrap());
}

#[tokio::test]
async fn test_changed_configuration_is_refused() {
    let h = Harness::new();
    let plan = h.plan(ONE).await;
    let err = h.engine(TWO).apply(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, StrataError::Plan(PlanError::ConfigChanged { .. })));
}

#[tokio::test]
async fn test_locked_state_is_refused() {
    let h = Harness::new();
    let plan = h.plan(ONE).await;
    let lock = h.store.acquire_lock("someone-else", "apply").await.unwrap();

    let err = h.engine(ONE).apply(&plan, &CancellationToken::new()).await.unwrap_err();
    assert!(err.is_retryable());
    h.store.release_lock(&lock.lock_id).await.unwrap();
    h.engine(ONE).apply(&plan, &CancellationToken::new()).await.unwrap().check().unwrap();
}

#[tokio::test]
async fn test_refresh_records_deletions() {
    let h = Harness::new();
    let applied = h.apply(CHAIN).await;
    let r1_id = applied.state.get(&thing("r1")).unwrap().id().unwrap().to_string();
    h.provider.forget(&r1_id);

    let outcome = h.engine(CHAIN).refresh(&CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    assert!(outcome.state.get(&thing("r1")).is_none());
    assert!(outcome.state.get(&thing("r2")).is_some());
    assert!(outcome.state.serial > applied.state.serial);
    assert!(
        outcome
            .report
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Drift && d.address.as_deref() == Some("fake_thing.r1"))
    );

    let plan = h.plan(CHAIN).await;
    assert_eq!(plan.change(&thing("r1")).unwrap().action, Action::Create);
}

#[tokio::test]
async fn test_refresh_only_plan_saves_drift() {
    let h = Harness::new();
    h.apply(ONE).await.check().unwrap();
    h.provider.put("thing-1", MarkedValue::object_from([("x", MarkedValue::number(7.0))]));

    let engine = h.engine(ONE);
    let options = PlanOptions {
        mode: PlanMode::RefreshOnly,
        refresh: true,
    };
    let plan = engine.plan(options, &CancellationToken::new()).await.unwrap();
    assert!(plan.has_changes());
    assert!(plan.changes.is_empty());

    let outcome = engine.apply(&plan, &CancellationToken::new()).await.unwrap();
    let record = outcome.state.get(&thing("a")).unwrap();
    assert_eq!(record.value().get_attr("x"), Some(MarkedValue::number(7.0)));
}

#[tokio::test]
async fn test_destroy_removes_everything() {
    let h = Harness::new();
    h.apply(CHAIN).await.check().unwrap();

    let engine = h.engine(CHAIN);
    let options = PlanOptions {
        mode: PlanMode::Destroy,
        refresh: true,
    };
    let plan = engine.plan(options, &CancellationToken::new()).await.unwrap();
    assert_eq!(plan.summary().destroy, 2);
    // Dependents go first.
    assert_eq!(plan.changes[0].address, thing("r2"));

    let outcome = engine.apply(&plan, &CancellationToken::new()).await.unwrap();
    outcome.check().unwrap();
    assert!(outcome.state.resources.is_empty());
    assert!(outcome.state.outputs.is_empty());
    assert_eq!(h.provider.object_count(), 0);
}

#[tokio::test]
async fn test_graph_ignores_declaration_order() {
    let forward = r#"
resources:
  - type: fake_thing
    name: a
  - type: fake_thing
    name: b
    attributes:
      input: "${fake_thing.a.id}"
  - type: null_resource
    name: c
    attributes:
      triggers:
        b: "${fake_thing.b.id}"
"#;
    let backward = r#"
resources:
  - type: null_resource
    name: c
    attributes:
      triggers:
        b: "${fake_thing.b.id}"
  - type: fake_thing
    name: b
    attributes:
      input: "${fake_thing.a.id}"
  - type: fake_thing
    name: a
"#;
    let h = Harness::new();
    let (one, _) = h.engine(forward).graph(GraphMode::Plan).await.unwrap();
    let (two, _) = h.engine(backward).graph(GraphMode::Plan).await.unwrap();
    assert_eq!(one.signature(), two.signature());
    assert_eq!(one.len(), two.len());
}

#[tokio::test]
async fn test_cycle_fails_before_any_change() {
    let yaml = r#"
resources:
  - type: fake_thing
    name: a
    attributes:
      input: "${fake_thing.b.id}"
  - type: fake_thing
    name: b
    attributes:
      input: "${fake_thing.a.id}"
"#;
    let h = Harness::new();
    let plan = h.plan(yaml).await;
    assert!(plan.diagnostics.errors().any(|d| d.kind == DiagnosticKind::Cycle));
    assert!(plan.changes.is_empty());
    assert_eq!(h.provider.object_count(), 0);
}

#[tokio::test]
async fn test_parallelism_is_bounded() {
    let yaml = r#"
resources:
  - type: fake_thing
    name: worker
    count: 6
"#;
    let mut h = Harness::with_provider(FakeProvider::with_delay(Duration::from_millis(25)));
    h.parallelism = 2;
    h.apply(yaml).await.check().unwrap();
    assert_eq!(h.provider.object_count(), 6);
    assert!(h.provider.max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_sensitive_output_requires_flag() {
    let yaml = r#"
variables:
  token:
    default: hunter2
    sensitive: true
resources:
  - type: fake_thing
    name: a
    attributes:
      x: "${var.token}"
outputs:
  leaked:
    value: "${fake_thing.a.x}"
"#;
    let plan = Harness::new().plan(yaml).await;
    let error = plan.diagnostics.errors().next().unwrap();
    assert_eq!(error.kind, DiagnosticKind::SensitivityViolation);

    let fixed = yaml.replace("    value: \"${fake_thing.a.x}\"", "    value: \"${fake_thing.a.x}\"\n    sensitive: true");
    let h = Harness::new();
    let outcome = h.apply(&fixed).await;
    outcome.check().unwrap();
    assert!(outcome.state.outputs["leaked"].sensitive);
    let record = outcome.state.get(&thing("a")).unwrap();
    assert!(record.value().get_attr("x").unwrap().is_sensitive());
}

#[tokio::test]
async fn test_replace_order_follows_lifecycle() {
    for create_before_destroy in [false, true] {
        let config = |name: &str| {
            format!(
                "resources:\n  - type: fake_thing\n    name: a\n    lifecycle:\n      create_before_destroy: {create_before_destroy}\n    attributes:\n      name: {name}\n"
            )
        };
        let h = Harness::new();
        h.apply(&config("first")).await.check().unwrap();
        h.provider.take_calls();

        let renamed = config("second");
        let plan = h.plan(&renamed).await;
        let change = plan.change(&thing("a")).unwrap();
        assert_eq!(change.action, Action::Replace);
        assert_eq!(change.create_before_destroy, create_before_destroy);
        assert_eq!(change.replace_paths, vec!["name"]);

        let outcome = h.engine(&renamed).apply(&plan, &CancellationToken::new()).await.unwrap();
        outcome.check().unwrap();
        let expected = if create_before_destroy {
            vec!["create thing-2", "delete thing-1"]
        } else {
            vec!["delete thing-1", "create thing-2"]
        };
        assert_eq!(h.provider.take_calls(), expected);
        assert_eq!(h.provider.object_count(), 1);
        assert_eq!(outcome.state.get(&thing("a")).unwrap().id(), Some("thing-2"));

        let replan = h.plan(&renamed).await;
        assert_eq!(replan.change(&thing("a")).unwrap().action, Action::NoOp);
    }
}

#[tokio::test]
async fn test_count_from_local() {
    let yaml = r#"
locals:
  n: 2
resources:
  - type: fake_thing
    name: worker
    count: "${local.n}"
"#;
    let plan = Harness::new().plan(yaml).await;
    assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
    assert_eq!(plan.changes.len(), 2);
    assert!(plan.changes.iter().all(|c| c.action == Action::Create));
}

#[tokio::test]
async fn test_import_id_from_local() {
    let yaml = r#"
locals:
  obj: thing-9
resources:
  - type: fake_thing
    name: a
    attributes:
      x: 5
imports:
  - to: fake_thing.a
    id: "${local.obj}"
"#;
    let h = Harness::new();
    h.provider.put("thing-9", MarkedValue::object_from([("x", MarkedValue::number(5.0))]));

    let plan = h.plan(yaml).await;
    assert!(!plan.diagnostics.iter().any(|d| d.caused_by_unknown), "{:?}", plan.diagnostics);
    let change = plan.change(&thing("a")).unwrap();
    assert_eq!(change.action, Action::NoOp);
    assert_eq!(change.import_id.as_deref(), Some("thing-9"));
}
