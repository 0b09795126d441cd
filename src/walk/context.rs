//! Shared pieces of every visitor: value nodes, provider calls, and
//! resource evaluation.

use crate::addrs::{ModulePath, ResourceAddress};
use crate::config::{Configuration, Output, ProviderConfig, Resource, Variable};
use crate::error::ProviderError;
use crate::eval::{evaluate, EvalContext, Expression, NamedValues, ValueKey};
use crate::graph::{Node, NodeKey, NodeKind};
use crate::provider::{ProviderRegistry, ResourceSchema};
use crate::state::{OutputRecord, ResourceRecord, WorkingState};
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics, Mark, MarkedValue};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a visitor needs from the engine for one walk.
#[derive(Debug, Clone)]
pub struct WalkContext {
    /// The loaded configuration.
    pub config: Arc<Configuration>,
    /// Available providers.
    pub providers: ProviderRegistry,
    /// Values resolved so far.
    pub values: Arc<NamedValues>,
    /// State being built by the walk.
    pub working: Arc<WorkingState>,
}

/// What happened when a recorded object was read back.
#[derive(Debug, Clone, PartialEq)]
pub enum Refreshed {
    /// The object still exists; this is its current record.
    Present(ResourceRecord),
    /// The object is gone.
    Gone,
}

pub(crate) fn provider_error(address: &ResourceAddress, op: &str, err: &ProviderError) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::ProviderAction,
        format!("Failed to {op} {address}"),
        err.to_string(),
    )
}

pub(crate) fn prevent_destroy_error(address: &ResourceAddress, resource: &Resource) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Config,
        "Instance cannot be destroyed",
        format!(
            "Resource {address} has lifecycle.prevent_destroy set, but the plan calls for this resource to be destroyed. To avoid this error and continue with the plan, either disable lifecycle.prevent_destroy or reduce the scope of the plan."
        ),
    )
    .with_subject(Some(resource.range.clone()))
}

/// Marks attributes the schema declares sensitive, plus every path that was
/// sensitive in `template`.
pub(crate) fn mark_sensitive(value: MarkedValue, schema: &ResourceSchema, template: Option<&MarkedValue>) -> MarkedValue {
    let value = match template {
        Some(template) => value.mark_paths(&template.unmark_deep().1),
        None => value,
    };
    let paths: BTreeSet<String> = schema
        .attributes
        .values()
        .filter(|a| a.sensitive)
        .map(|a| a.name.clone())
        .collect();
    value.mark_paths(&paths)
}

impl WalkContext {
    /// Root scope over the shared values.
    #[must_use]
    pub fn scope(&self) -> EvalContext {
        EvalContext::new(Arc::clone(&self.values))
    }

    /// Visits the nodes every walk handles the same way. Returns `None`
    /// for resource and orphan nodes.
    pub async fn visit_common(&self, node: &Node) -> Option<Diagnostics> {
        let module = node.module();
        let diags = match &node.kind {
            NodeKind::Variable { variable, input } => self.visit_variable(&module, variable, input.as_ref()),
            NodeKind::Local { expr } => {
                let NodeKey::Local(_, name) = &node.key else {
                    return Some(Diagnostics::new());
                };
                self.visit_local(&module, name, expr)
            }
            NodeKind::Output { output } => self.visit_output(&module, output).1,
            NodeKind::Provider { config } => self.visit_provider(config).await,
            NodeKind::Resource { .. } | NodeKind::Orphan { .. } => return None,
        };
        Some(diags)
    }

    /// Publishes a variable. Root values were resolved before the walk;
    /// module inputs are evaluated in the calling module.
    fn visit_variable(&self, module: &ModulePath, variable: &Variable, input: Option<&Expression>) -> Diagnostics {
        let key = ValueKey::Variable(module.clone(), variable.name.clone());
        let Some(parent) = module.parent() else {
            let value = self
                .values
                .get(&key)
                .or_else(|| variable.default.clone())
                .unwrap_or_default();
            self.values.set(key, Self::mark_if(value, variable.sensitive));
            return Diagnostics::new();
        };

        let (value, diags) = match input {
            Some(expr) => evaluate(expr, &self.scope().with_path(parent)),
            None => match &variable.default {
                Some(default) => (default.clone(), Diagnostics::new()),
                None => (
                    MarkedValue::null(),
                    Diagnostics::from(
                        Diagnostic::error(
                            DiagnosticKind::Config,
                            "Missing required argument",
                            format!(
                                "The input variable \"{}\" is not set by {module}, and has no default value.",
                                variable.name
                            ),
                        )
                        .with_subject(Some(variable.range.clone())),
                    ),
                ),
            },
        };
        if !diags.has_errors() {
            self.values.set(key, Self::mark_if(value, variable.sensitive));
        }
        diags
    }

    fn visit_local(&self, module: &ModulePath, name: &str, expr: &Expression) -> Diagnostics {
        let (value, diags) = evaluate(expr, &self.scope().with_path(module.clone()));
        if !diags.has_errors() {
            self.values.set(ValueKey::Local(module.clone(), name.to_string()), value);
        }
        diags
    }

    /// Evaluates an output and publishes it. Returns the value for root
    /// outputs so callers can record it.
    pub(crate) fn visit_output(&self, module: &ModulePath, output: &Output) -> (Option<MarkedValue>, Diagnostics) {
        let (value, mut diags) = match &output.value {
            Some(expr) => evaluate(expr, &self.scope().with_path(module.clone())),
            None => (MarkedValue::null(), Diagnostics::new()),
        };
        if diags.has_errors() {
            return (None, diags);
        }
        if module.is_root() && value.contains_sensitive() && !output.sensitive {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::SensitivityViolation,
                    "Output refers to sensitive values",
                    format!(
                        "Output \"{}\" includes sensitive values. To reduce the risk of accidentally exporting sensitive data, set \"sensitive: true\" on the output.",
                        output.name
                    ),
                )
                .with_subject(Some(output.range.clone())),
            );
            return (None, diags);
        }
        let value = Self::mark_if(value, output.sensitive);
        self.values
            .set(ValueKey::Output(module.clone(), output.name.clone()), value.clone());
        (module.is_root().then_some(value), diags)
    }

    /// Records a root output in the working state.
    pub(crate) fn record_output(&self, name: &str, value: &MarkedValue, sensitive: bool) {
        self.working.set_output(name, OutputRecord::new(value, sensitive));
    }

    async fn visit_provider(&self, config: &ProviderConfig) -> Diagnostics {
        let provider = match self.providers.require(&config.name) {
            Ok(provider) => provider,
            Err(err) => {
                return Diagnostics::from(
                    Diagnostic::error(DiagnosticKind::Config, "Provider not available", err.to_string())
                        .with_subject(Some(config.range.clone())),
                );
            }
        };
        let (value, mut diags) = evaluate(&config.config_expression(), &self.scope());
        if diags.has_errors() {
            return diags;
        }
        if value.contains_unknown() {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::UnknownValue,
                    "Invalid provider configuration",
                    format!(
                        "The configuration for provider \"{}\" depends on values that cannot be determined until apply.",
                        config.name
                    ),
                )
                .with_subject(Some(config.range.clone()))
                .caused_by_unknown(),
            );
            return diags;
        }
        debug!("Configuring provider {}", config.name);
        if let Err(err) = provider.configure(&value.clear_marks()).await {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::ProviderAction,
                    format!("Failed to configure provider {}", config.name),
                    err.to_string(),
                )
                .with_subject(Some(config.range.clone())),
            );
        }
        diags
    }

    /// The schema of `resource_type`, as a diagnostic on failure.
    pub(crate) fn schema(&self, provider: &str, resource_type: &str) -> Result<ResourceSchema, Diagnostics> {
        self.providers.schema(provider, resource_type).map_err(|err| {
            Diagnostics::from(Diagnostic::error(
                DiagnosticKind::Config,
                "Unsupported resource type",
                err.to_string(),
            ))
        })
    }

    /// Evaluates the arguments of one instance and conforms them to the
    /// provider schema.
    ///
    /// Returns `None` when evaluation produced errors.
    pub(crate) fn evaluate_desired(
        &self,
        address: &ResourceAddress,
        resource: &Resource,
        schema: &ResourceSchema,
    ) -> (Option<MarkedValue>, Diagnostics) {
        let scope = self
            .scope()
            .with_path(address.module.clone())
            .with_count_index(address.index);
        let expr = resource.attributes_expression();
        let (value, mut diags) = evaluate(&expr, &scope);
        if diags.has_errors() {
            return (None, diags);
        }
        let (conformed, conform_diags) = schema.conform(&value, &expr.range);
        diags.extend(conform_diags);
        if diags.has_errors() {
            return (None, diags);
        }
        (Some(conformed), diags)
    }

    /// Reads the object behind `prior` from its provider.
    pub(crate) async fn refresh_record(&self, prior: &ResourceRecord) -> Result<Refreshed, Diagnostics> {
        let address = &prior.address;
        let provider = self
            .providers
            .require(&prior.provider)
            .map_err(|err| Diagnostics::from(provider_error(address, "refresh", &err)))?;
        let current = provider
            .read(&address.resource_type, &prior.attributes)
            .await
            .map_err(|err| Diagnostics::from(provider_error(address, "refresh", &err)))?;
        Ok(match current {
            Some(value) => {
                let value = value.mark_paths(&prior.sensitive_paths);
                let record = ResourceRecord::new(address.clone(), prior.provider.clone(), &value)
                    .with_dependencies(prior.dependencies.clone());
                Refreshed::Present(record)
            }
            None => Refreshed::Gone,
        })
    }

    /// Refreshes `prior` into the working state. Returns the record that
    /// is now current, and a drift warning when reality moved.
    pub(crate) async fn refresh_into_working(
        &self,
        prior: ResourceRecord,
    ) -> Result<(Option<ResourceRecord>, Option<Diagnostic>), Diagnostics> {
        let address = prior.address.clone();
        match self.refresh_record(&prior).await? {
            Refreshed::Present(record) => {
                let drift = (record.attributes != prior.attributes).then(|| {
                    info!("{address} has changed outside of Strata");
                    Diagnostic::warning(
                        DiagnosticKind::Drift,
                        "Object has changed outside of Strata",
                        format!("The recorded attributes of {address} no longer match the remote object."),
                    )
                });
                self.working.put(record.clone());
                Ok((Some(record), drift))
            }
            Refreshed::Gone => {
                info!("{address} has been deleted outside of Strata");
                self.working.remove(&address);
                Ok((
                    None,
                    Some(Diagnostic::warning(
                        DiagnosticKind::Drift,
                        "Object has been deleted outside of Strata",
                        format!("{address} is recorded in state but no longer exists; it has been removed from state."),
                    )),
                ))
            }
        }
    }

    fn mark_if(value: MarkedValue, sensitive: bool) -> MarkedValue {
        if sensitive {
            value.mark(Mark::Sensitive)
        } else {
            value
        }
    }
}
