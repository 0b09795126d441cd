//! Desired configuration against recorded state.

use super::change::{Action, ChangeReason, ChangeRecord};
use crate::addrs::ResourceAddress;
use crate::provider::ResourceSchema;
use crate::state::ResourceRecord;
use crate::value::{Mark, MarkedValue};
use std::collections::{BTreeMap, BTreeSet};

/// Computes the change for one instance.
///
/// The engine holds the per-resource settings that are not part of the
/// schema: the owning provider and the `create_before_destroy` override.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    provider: String,
    create_before_destroy: Option<bool>,
}

fn object_attrs(value: Option<&MarkedValue>) -> BTreeMap<String, MarkedValue> {
    value
        .and_then(MarkedValue::as_object)
        .cloned()
        .unwrap_or_default()
}

fn same(a: &MarkedValue, b: &MarkedValue) -> bool {
    (a.is_null() && b.is_null()) || a.equals_ignoring_marks(b)
}

impl DiffEngine {
    /// A diff engine for instances owned by `provider`.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            create_before_destroy: None,
        }
    }

    /// Overrides the schema's replacement order.
    #[must_use]
    pub const fn with_create_before_destroy(mut self, enabled: Option<bool>) -> Self {
        self.create_before_destroy = enabled;
        self
    }

    /// Compares `desired` (conformed configuration) with `observed` (state).
    ///
    /// Never calls a provider and never fails.
    #[must_use]
    pub fn diff(
        &self,
        address: &ResourceAddress,
        desired: Option<&MarkedValue>,
        observed: Option<&ResourceRecord>,
        schema: &ResourceSchema,
    ) -> ChangeRecord {
        let record = match (desired, observed) {
            (None, None) => ChangeRecord::new(address.clone(), Action::NoOp, ChangeReason::Unchanged),
            (None, Some(prior)) => {
                let mut record =
                    ChangeRecord::new(address.clone(), Action::Destroy, ChangeReason::NotInConfiguration);
                record.before = Some(prior.value());
                record
            }
            (Some(desired), None) => {
                let (after, unknown_paths) = Self::new_object(desired, schema);
                let mut record = ChangeRecord::new(address.clone(), Action::Create, ChangeReason::NotInState);
                record.after = Some(after);
                record.unknown_paths = unknown_paths;
                record
            }
            (Some(desired), Some(prior)) => self.compare(address, desired, prior, schema),
        };
        record.with_provider(self.provider.clone())
    }

    /// A destroy for an instance whose removal was requested.
    #[must_use]
    pub fn destroy(&self, address: &ResourceAddress, observed: &ResourceRecord) -> ChangeRecord {
        let mut record = ChangeRecord::new(address.clone(), Action::Destroy, ChangeReason::DestroyRequested);
        record.before = Some(observed.value());
        record.with_provider(self.provider.clone())
    }

    /// The object a create would produce: configured values, with computed
    /// attributes the configuration leaves out marked unknown.
    fn new_object(desired: &MarkedValue, schema: &ResourceSchema) -> (MarkedValue, Vec<String>) {
        let mut attrs = object_attrs(Some(desired));
        for (name, attribute) in &schema.attributes {
            let configured = attrs.get(name).is_some_and(|v| !v.is_null());
            if configured {
                continue;
            }
            let value = if attribute.computed {
                let unknown = MarkedValue::unknown();
                if attribute.sensitive {
                    unknown.mark(Mark::Sensitive)
                } else {
                    unknown
                }
            } else {
                MarkedValue::null()
            };
            attrs.insert(name.clone(), value);
        }
        let unknown_paths = attrs
            .iter()
            .filter(|(_, v)| v.contains_unknown())
            .map(|(k, _)| k.clone())
            .collect();
        (MarkedValue::object(attrs), unknown_paths)
    }

    fn compare(
        &self,
        address: &ResourceAddress,
        desired: &MarkedValue,
        prior: &ResourceRecord,
        schema: &ResourceSchema,
    ) -> ChangeRecord {
        let before = prior.value();
        let desired_attrs = object_attrs(Some(desired));
        let prior_attrs = object_attrs(Some(&before));

        let names: BTreeSet<&String> = schema
            .attributes
            .keys()
            .chain(desired_attrs.keys())
            .chain(prior_attrs.keys())
            .collect();

        let mut after = BTreeMap::new();
        let mut changed = Vec::new();
        let mut unknown = Vec::new();
        let mut replace = Vec::new();

        for name in names {
            let configured = desired_attrs.get(name).filter(|v| !v.is_null());
            let old = prior_attrs.get(name).cloned().unwrap_or_default();
            let value = match configured {
                Some(v) => v.clone(),
                None if schema.is_computed(name) => prior_attrs
                    .get(name)
                    .cloned()
                    .unwrap_or_else(MarkedValue::unknown),
                None => MarkedValue::null(),
            };

            if value.contains_unknown() {
                unknown.push(name.clone());
                if schema.is_force_new(name) {
                    replace.push(name.clone());
                }
            } else if !same(&value, &old) {
                changed.push(name.clone());
                if schema.is_force_new(name) {
                    replace.push(name.clone());
                }
            }
            after.insert(name.clone(), value);
        }

        let (action, reason) = if !replace.is_empty() {
            (Action::Replace, ChangeReason::ReplaceRequired)
        } else if !changed.is_empty() {
            (Action::Update, ChangeReason::AttributesChanged)
        } else if !unknown.is_empty() {
            (Action::Update, ChangeReason::DeferredValues)
        } else {
            (Action::NoOp, ChangeReason::Unchanged)
        };

        let mut record = ChangeRecord::new(address.clone(), action, reason);
        record.before = Some(before);
        record.changed_paths = changed;
        record.replace_paths = replace;

        if action == Action::Replace {
            let (fresh, unknown_paths) = Self::new_object(desired, schema);
            record.after = Some(fresh);
            record.unknown_paths = unknown_paths;
            record.create_before_destroy = self
                .create_before_destroy
                .unwrap_or(schema.create_before_destroy);
        } else {
            record.after = Some(MarkedValue::object(after));
            record.unknown_paths = unknown;
        }
        record
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::provider::AttributeSchema;
    use crate::value::ValueType;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("test_thing")
            .attribute(AttributeSchema::required("name", ValueType::String).force_new())
            .attribute(AttributeSchema::optional("x", ValueType::Number))
            .attribute(AttributeSchema::optional("password", ValueType::String).sensitive())
            .attribute(AttributeSchema::computed("id", ValueType::String))
    }

    fn address() -> ResourceAddress {
        ResourceAddress::new("test_thing", "a")
    }

    fn desired(name: &str, x: MarkedValue) -> MarkedValue {
        MarkedValue::object_from([("name", MarkedValue::string(name)), ("x", x)])
    }

    fn prior(name: &str, x: f64) -> ResourceRecord {
        ResourceRecord::new(
            address(),
            "test",
            &MarkedValue::object_from([
                ("id", MarkedValue::string("i-1")),
                ("name", MarkedValue::string(name)),
                ("password", MarkedValue::null()),
                ("x", MarkedValue::number(x)),
            ]),
        )
    }

    fn engine() -> DiffEngine {
        DiffEngine::new("test")
    }

    #[test]
    fn test_create_marks_computed_unknown() {
        let change = engine().diff(&address(), Some(&desired("n", MarkedValue::number(1.0))), None, &schema());
        assert_eq!(change.action, Action::Create);
        assert_eq!(change.provider, "test");
        assert_eq!(change.unknown_paths, vec!["id"]);
        let after = change.after.unwrap();
        assert!(!after.get_attr("id").unwrap().is_known());
        assert!(after.get_attr("password").unwrap().is_null());
    }

    #[test]
    fn test_update_in_place_keeps_computed() {
        let change = engine().diff(
            &address(),
            Some(&desired("n", MarkedValue::number(2.0))),
            Some(&prior("n", 1.0)),
            &schema(),
        );
        assert_eq!(change.action, Action::Update);
        assert_eq!(change.changed_paths, vec!["x"]);
        assert!(change.unknown_paths.is_empty());
        let after = change.after.unwrap();
        assert_eq!(after.get_attr("id").unwrap(), MarkedValue::string("i-1"));
        assert_eq!(after.get_attr("x").unwrap(), MarkedValue::number(2.0));
    }

    #[test]
    fn test_no_changes() {
        let change = engine().diff(
            &address(),
            Some(&desired("n", MarkedValue::number(1.0))),
            Some(&prior("n", 1.0)),
            &schema(),
        );
        assert_eq!(change.action, Action::NoOp);
        assert_eq!(change.reason, ChangeReason::Unchanged);
    }

    #[test]
    fn test_force_new_replaces() {
        let change = engine()
            .with_create_before_destroy(Some(true))
            .diff(
                &address(),
                Some(&desired("other", MarkedValue::number(1.0))),
                Some(&prior("n", 1.0)),
                &schema(),
            );
        assert_eq!(change.action, Action::Replace);
        assert_eq!(change.replace_paths, vec!["name"]);
        assert!(change.create_before_destroy);
        assert_eq!(change.unknown_paths, vec!["id"]);
    }

    #[test]
    fn test_unknown_values() {
        let change = engine().diff(
            &address(),
            Some(&desired("n", MarkedValue::unknown())),
            Some(&prior("n", 1.0)),
            &schema(),
        );
        assert_eq!(change.action, Action::Update);
        assert_eq!(change.reason, ChangeReason::DeferredValues);
        assert_eq!(change.unknown_paths, vec!["x"]);

        let change = engine().diff(
            &address(),
            Some(&MarkedValue::object_from([
                ("name", MarkedValue::unknown()),
                ("x", MarkedValue::number(5.0)),
            ])),
            Some(&prior("n", 1.0)),
            &schema(),
        );
        assert_eq!(change.action, Action::Replace);
        assert!(!change.create_before_destroy);
    }

    #[test]
    fn test_destroy_and_sensitive_before() {
        let mut record = prior("n", 1.0);
        record.sensitive_paths.insert("name".to_string());
        let change = engine().diff(&address(), None, Some(&record), &schema());
        assert_eq!(change.action, Action::Destroy);
        assert!(change.before.unwrap().get_attr("name").unwrap().is_sensitive());
        assert!(change.after.is_none());
    }
}
