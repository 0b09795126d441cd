//! Configuration validation.
//!
//! Checks that do not need any evaluation: naming rules, root-only blocks,
//! import targets, module inputs, and the backend/cloud exclusivity rule.
//! Reference resolution is left to the graph builder, which reports
//! undeclared references with source locations.

use crate::error::{ConfigError, Result, StrataError};
use std::collections::BTreeSet;
use tracing::debug;

use super::module::{Configuration, Module};

/// Validator for loaded configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Whether a `cloud` block is usable in this build.
    allow_cloud: bool,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_cloud: false }
    }

    /// Accepts `cloud` blocks instead of reporting them unavailable.
    #[must_use]
    pub const fn allow_cloud(mut self, allow: bool) -> Self {
        self.allow_cloud = allow;
        self
    }

    /// Validates a configuration, collecting every problem.
    #[must_use]
    pub fn check(&self, config: &Configuration) -> ValidationResult {
        let mut result = ValidationResult::default();

        for module in config.modules() {
            Self::validate_module(module, &mut result);
        }
        Self::validate_imports(config, &mut result);
        self.validate_backend(config, &mut result);

        result
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; warnings never fail validation.
    pub fn validate(&self, config: &Configuration) -> Result<ValidationResult> {
        let result = self.check(config);
        if let Some(first_error) = result.errors.first() {
            if first_error.field == "cloud" {
                return Err(StrataError::Config(ConfigError::Unsupported {
                    feature: "Remote workspaces (\"cloud\" block)".to_string(),
                    message: first_error.message.clone(),
                }));
            }
            return Err(StrataError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }
        debug!(
            "Configuration validation passed with {} warning(s)",
            result.warnings.len()
        );
        Ok(result)
    }

    fn validate_module(module: &Module, result: &mut ValidationResult) {
        let prefix = module.path.prefix();

        for name in module.variables.keys() {
            check_name(result, &format!("{prefix}var.{name}"), name);
        }
        for name in module.locals.keys() {
            check_name(result, &format!("{prefix}local.{name}"), name);
        }
        for name in module.outputs.keys() {
            check_name(result, &format!("{prefix}output.{name}"), name);
        }
        for name in module.calls.keys() {
            check_name(result, &format!("{prefix}module.{name}"), name);
        }
        for name in module.providers.keys() {
            check_name(result, &format!("provider.{name}"), name);
        }

        for resource in module.resources.values() {
            let field = format!("{prefix}{}", resource.key());
            check_name(result, &field, &resource.resource_type);
            check_name(result, &field, &resource.name);
            if resource.resource_type == "module" {
                result.error(&field, "\"module\" is reserved and cannot be a resource type");
            }
            if resource.lifecycle.prevent_destroy
                && resource.lifecycle.create_before_destroy == Some(false)
            {
                result.warnings.push(format!(
                    "{field}: prevent_destroy blocks every replacement, so create_before_destroy has no effect"
                ));
            }
        }

        for output in module.outputs.values() {
            if output.value.is_none() {
                result.error(
                    format!("{prefix}output.{}", output.name),
                    "Output blocks must set \"value\"",
                );
            }
        }

        for call in module.calls.values() {
            let child = &call.module;
            let field = format!("{prefix}module.{}", call.name);
            for input in call.inputs.keys() {
                if !child.variables.contains_key(input) {
                    result.error(
                        &field,
                        format!("Module has no input variable named \"{input}\""),
                    );
                }
            }
            for variable in child.variables.values() {
                if variable.default.is_none() && !call.inputs.contains_key(&variable.name) {
                    result.error(
                        &field,
                        format!("Missing required input variable \"{}\"", variable.name),
                    );
                }
            }
        }
    }

    fn validate_imports(config: &Configuration, result: &mut ValidationResult) {
        let mut seen = BTreeSet::new();
        for import in &config.root.imports {
            let field = import.range.path.clone();
            if !seen.insert(import.to.clone()) {
                result.error(
                    &field,
                    format!("Duplicate import configuration for \"{}\"", import.to),
                );
                continue;
            }
            match config.resource(&import.to) {
                None => result.error(
                    &field,
                    format!(
                        "Configuration for import target does not exist: {} is not declared",
                        import.to.config_address()
                    ),
                ),
                Some(resource) => match (&resource.count, import.to.index) {
                    (None, Some(_)) => result.error(
                        &field,
                        format!("{} does not set \"count\", so it cannot be indexed", import.to.config_address()),
                    ),
                    (Some(_), None) => result.error(
                        &field,
                        format!("{} sets \"count\", so the import target needs an index", import.to.config_address()),
                    ),
                    _ => {}
                },
            }
        }
    }

    fn validate_backend(&self, config: &Configuration, result: &mut ValidationResult) {
        match (&config.backend, &config.cloud) {
            (Some(_), Some(_)) => result.error(
                "backend",
                "Both a backend and a cloud configuration are present; only one may be used",
            ),
            (None, Some(cloud)) => {
                if cloud.organization.as_deref().is_none_or(str::is_empty) {
                    result.error("cloud.organization", "The cloud block requires an organization");
                }
                if cloud.workspaces.name.is_some() && !cloud.workspaces.tags.is_empty() {
                    result.error(
                        "cloud.workspaces",
                        "Only one of workspaces.name or workspaces.tags may be set",
                    );
                }
                if !self.allow_cloud {
                    result.error(
                        "cloud",
                        "this build stores state with the local backend only; remove the cloud block or use a backend block",
                    );
                }
            }
            _ => {}
        }
    }
}

fn check_name(result: &mut ValidationResult, field: &str, name: &str) {
    if !is_valid_name(name) {
        result.error(
            field,
            format!(
                "Name '{name}' is invalid. Must start with a letter or underscore and contain only letters, digits, underscores and hyphens."
            ),
        );
    }
}

/// Checks if a name is a valid identifier.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter or underscore
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
