//! Resource schemas.
//!
//! A schema tells the planner which attributes a resource type accepts,
//! which the provider computes, and which force a replacement when they
//! change.

use crate::value::{
    convert, Diagnostic, DiagnosticKind, Diagnostics, Mark, MarkedValue, SourceRange, ValueType,
};
use std::collections::BTreeMap;

/// One attribute of a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: String,
    /// Expected type.
    pub value_type: ValueType,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Filled in by the provider when not configured.
    pub computed: bool,
    /// A change cannot be applied in place.
    pub force_new: bool,
    /// Values are always redacted.
    pub sensitive: bool,
}

impl AttributeSchema {
    fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
        }
    }

    /// An attribute configuration must set.
    #[must_use]
    pub fn required(name: &str, value_type: ValueType) -> Self {
        Self {
            required: true,
            ..Self::new(name, value_type)
        }
    }

    /// An attribute configuration may set.
    #[must_use]
    pub fn optional(name: &str, value_type: ValueType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, value_type)
        }
    }

    /// An attribute only the provider sets.
    #[must_use]
    pub fn computed(name: &str, value_type: ValueType) -> Self {
        Self {
            computed: true,
            ..Self::new(name, value_type)
        }
    }

    /// Marks the attribute as replace-on-change.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Marks the attribute as sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Allows the provider to fill the attribute when configuration leaves it out.
    #[must_use]
    pub const fn also_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// True if the configuration may set this attribute.
    #[must_use]
    pub const fn configurable(&self) -> bool {
        self.required || self.optional
    }
}

/// Schema of one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    /// Resource type.
    pub resource_type: String,
    /// Attributes by name.
    pub attributes: BTreeMap<String, AttributeSchema>,
    /// Whether replacements create the new object first by default.
    pub create_before_destroy: bool,
}

impl ResourceSchema {
    /// Creates a schema with no attributes.
    #[must_use]
    pub fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            attributes: BTreeMap::new(),
            create_before_destroy: false,
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Sets the default replacement order.
    #[must_use]
    pub const fn with_create_before_destroy(mut self, enabled: bool) -> Self {
        self.create_before_destroy = enabled;
        self
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// True if `name` is computed by the provider.
    #[must_use]
    pub fn is_computed(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.computed)
    }

    /// True if changing `name` forces a replacement.
    #[must_use]
    pub fn is_force_new(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.force_new)
    }

    /// Checks a configuration object against the schema.
    ///
    /// Known values are converted to their declared type, and attributes
    /// declared sensitive gain the sensitive mark. Unknown values pass
    /// through. `range` is the location of the resource's `attributes` block.
    #[must_use]
    pub fn conform(&self, config: &MarkedValue, range: &SourceRange) -> (MarkedValue, Diagnostics) {
        let mut diags = Diagnostics::new();
        let Some(attrs) = config.as_object() else {
            if !config.is_known() {
                return (config.clone(), diags);
            }
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::Config,
                    "Invalid resource arguments",
                    format!("The arguments of a {} resource must be an object.", self.resource_type),
                )
                .with_subject(Some(range.clone())),
            );
            return (MarkedValue::null(), diags);
        };

        let mut out = BTreeMap::new();
        for (name, value) in attrs {
            let subject = Some(range.child(name));
            let Some(schema) = self.get(name).filter(|a| a.configurable()) else {
                let detail = if self.get(name).is_some() {
                    format!("The attribute \"{name}\" is computed by the provider and cannot be set.")
                } else {
                    format!("An argument named \"{name}\" is not expected for {}.", self.resource_type)
                };
                diags.push(
                    Diagnostic::error(DiagnosticKind::Config, "Unsupported argument", detail)
                        .with_subject(subject),
                );
                continue;
            };
            match convert(value, schema.value_type) {
                Ok(converted) => {
                    let converted = if schema.sensitive {
                        converted.mark(Mark::Sensitive)
                    } else {
                        converted
                    };
                    out.insert(name.clone(), converted);
                }
                Err(err) => diags.push(
                    Diagnostic::error(
                        DiagnosticKind::Evaluation,
                        "Incorrect attribute value type",
                        format!("Inappropriate value for attribute \"{name}\": {err}."),
                    )
                    .with_subject(subject),
                ),
            }
        }

        for attribute in self.attributes.values().filter(|a| a.required) {
            let missing = attrs.get(&attribute.name).is_none_or(MarkedValue::is_null);
            if missing {
                diags.push(
                    Diagnostic::error(
                        DiagnosticKind::Config,
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            attribute.name
                        ),
                    )
                    .with_subject(Some(range.clone())),
                );
            }
        }

        (MarkedValue::object(out).with_marks(config.marks()), diags)
    }
}
