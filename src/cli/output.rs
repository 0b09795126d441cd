//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, walk
//! results, and state in text or JSON.

use colored::Colorize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::Path;
use tabled::{Table, Tabled};

use crate::config::ConfigHasher;
use crate::engine::WalkOutcome;
use crate::planner::{Action, ChangeRecord, Plan, PlanMode};
use crate::state::{ResourceRecord, State};
use crate::value::{Diagnostic, Diagnostics, MarkedValue, Severity};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Instance row for table display.
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Depends on")]
    dependencies: String,
}

/// Where a rendered plan came from.
#[derive(Debug, Clone, Copy)]
pub enum PlanSource<'a> {
    /// Computed now and not saved.
    Unsaved,
    /// Computed now and saved to this file.
    Saved(&'a Path),
    /// Computed now for this file, but not written because it has no changes.
    NotSaved(&'a Path),
    /// Loaded from this file.
    File(&'a Path),
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// True for JSON output.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, source: PlanSource<'_>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, source),
        }
    }

    fn format_plan_text(plan: &Plan, source: PlanSource<'_>) -> String {
        let mut output = String::new();
        if !plan.has_errors() {
            Self::write_plan_source(&mut output, plan, source);
        }

        let changes: Vec<&ChangeRecord> = plan
            .changes
            .iter()
            .filter(|c| c.is_change() || c.import_id.is_some())
            .collect();

        if plan.mode == PlanMode::RefreshOnly {
            if plan.has_changes() {
                output.push_str("\nStrata detected changes made outside of Strata:\n");
                for diagnostic in plan.diagnostics.iter().filter(|d| d.kind == crate::value::DiagnosticKind::Drift) {
                    let address = diagnostic.address.as_deref().unwrap_or("?");
                    let _ = writeln!(output, "  {} {address}: {}", "~".yellow(), diagnostic.summary);
                }
                output.push_str("\nApplying this plan will update the state to match.\n");
            } else {
                let _ = writeln!(
                    output,
                    "\n{} No changes. Your state matches the real objects.",
                    "✓".green()
                );
            }
        } else if changes.is_empty() {
            let _ = writeln!(
                output,
                "\n{} No changes. Your infrastructure matches the configuration.",
                "✓".green()
            );
        } else {
            output.push_str("\nStrata will perform the following actions:\n\n");
            for change in &changes {
                Self::write_change(&mut output, change);
            }
            let _ = writeln!(output, "{}", plan.summary().to_string().bold());
        }

        if !plan.outputs.is_empty() && plan.mode != PlanMode::Destroy {
            output.push_str("\nOutputs:\n");
            for (name, value) in &plan.outputs {
                let _ = writeln!(output, "  {name} = {value}");
            }
        }

        output.push_str(&Self::format_diagnostics_text(&plan.diagnostics));

        output
    }

    fn write_plan_source(output: &mut String, plan: &Plan, source: PlanSource<'_>) {
        match source {
            PlanSource::Unsaved if plan.has_changes() => {
                output.push_str(
                    "Note: You didn't use the --out option to save this plan, so Strata can't \
                     guarantee to take exactly these actions if you run \"strata apply\" now.\n",
                );
            }
            PlanSource::Unsaved => {}
            PlanSource::Saved(path) => {
                let _ = writeln!(output, "Saved the plan to: {}", path.display());
                let _ = writeln!(
                    output,
                    "To perform exactly these actions, run: strata apply {}",
                    path.display()
                );
            }
            PlanSource::NotSaved(path) => {
                let _ = writeln!(output, "The plan has no changes, so it was not saved to {}", path.display());
            }
            PlanSource::File(path) => {
                let _ = writeln!(
                    output,
                    "Plan {} from {} (created {}, configuration {})",
                    plan.id,
                    path.display(),
                    plan.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    ConfigHasher::new().short_hash(&plan.config_hash)
                );
            }
        }
    }

    fn write_change(output: &mut String, change: &ChangeRecord) {
        let verb = match change.action {
            Action::Create => "will be created".green().to_string(),
            Action::Update => "will be updated in place".yellow().to_string(),
            Action::Replace => "must be replaced".red().to_string(),
            Action::Destroy => "will be destroyed".red().to_string(),
            Action::NoOp => "will be imported".cyan().to_string(),
        };
        let _ = writeln!(output, "  # {} {verb}", change.address.to_string().bold());
        if let Some(id) = &change.import_id
            && change.action != Action::NoOp
        {
            let _ = writeln!(output, "    (imported from \"{id}\")");
        }
        if change.action == Action::Destroy {
            let _ = writeln!(output, "    ({})", change.reason);
        }

        let symbol = change.action.symbol(change.create_before_destroy);
        let _ = writeln!(
            output,
            "  {} resource \"{}\" \"{}\" {{",
            Self::color_symbol(symbol, change.action),
            change.address.resource_type,
            change.address.name
        );

        let before = attrs(change.before.as_ref());
        let after = attrs(change.after.as_ref());
        let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
        let mut hidden = 0;
        for name in names {
            let old = before.get(name);
            let new = after.get(name);
            let line = match change.action {
                Action::Create => new
                    .filter(|v| !v.is_null())
                    .map(|v| format!("{} {name:width$} = {}", "+".green(), render(v))),
                Action::Destroy => old
                    .filter(|v| !v.is_null())
                    .map(|v| format!("{} {name:width$} = {}", "-".red(), render(v))),
                Action::Update | Action::Replace | Action::NoOp => {
                    let changed = change.changed_paths.contains(name) || change.unknown_paths.contains(name);
                    if changed || (change.action == Action::Replace && old.is_none()) {
                        let forces = if change.replace_paths.contains(name) {
                            format!(" {}", "# forces replacement".red())
                        } else {
                            String::new()
                        };
                        Some(format!(
                            "{} {name:width$} = {} -> {}{forces}",
                            "~".yellow(),
                            old.map_or_else(|| "null".to_string(), render),
                            new.map_or_else(|| "null".to_string(), render)
                        ))
                    } else {
                        hidden += 1;
                        None
                    }
                }
            };
            if let Some(line) = line {
                let _ = writeln!(output, "      {line}");
            }
        }
        if hidden > 0 && change.action != Action::NoOp {
            let _ = writeln!(output, "        # ({hidden} unchanged attributes hidden)");
        }
        output.push_str("    }\n\n");
    }

    fn color_symbol(symbol: &str, action: Action) -> String {
        match action {
            Action::Create => symbol.green().to_string(),
            Action::Update => symbol.yellow().to_string(),
            Action::Replace | Action::Destroy => symbol.red().to_string(),
            Action::NoOp => symbol.to_string(),
        }
    }

    /// Formats diagnostics.
    #[must_use]
    pub fn format_diagnostics(&self, diagnostics: &Diagnostics) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(diagnostics).unwrap_or_default(),
            OutputFormat::Text => Self::format_diagnostics_text(diagnostics),
        }
    }

    fn format_diagnostics_text(diagnostics: &Diagnostics) -> String {
        let mut output = String::new();
        for diagnostic in diagnostics {
            output.push('\n');
            output.push_str(&Self::format_diagnostic(diagnostic));
            output.push('\n');
        }
        output
    }

    fn format_diagnostic(diagnostic: &Diagnostic) -> String {
        let (marker, label) = match diagnostic.severity {
            Severity::Error => ("✗".red(), "Error".red().bold()),
            Severity::Warning => ("⚠".yellow(), "Warning".yellow().bold()),
        };
        let mut output = format!("{marker} {label}: {}", diagnostic.summary);
        if let Some(address) = &diagnostic.address {
            let _ = write!(output, "\n    with {address}");
        }
        if let Some(subject) = &diagnostic.subject {
            let _ = write!(output, "\n    on {subject}");
        }
        if diagnostic.caused_by_unknown {
            output.push_str("\n    The value will be known after apply.");
        }
        if !diagnostic.detail.is_empty() {
            let _ = write!(output, "\n    {}", diagnostic.detail);
        }
        output
    }

    /// Formats the result of an apply or destroy.
    #[must_use]
    pub fn format_apply(&self, outcome: &WalkOutcome, destroy: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&WalkJson::from(outcome)).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = Self::format_diagnostics_text(&outcome.report.diagnostics);
                let summary = outcome.summary;
                let complete = outcome.check().is_ok();
                let (marker, status) = if complete {
                    ("✓".green(), "complete".green())
                } else {
                    ("✗".red(), "incomplete".red())
                };
                if destroy {
                    let _ = writeln!(
                        output,
                        "\n{marker} Destroy {status}! Resources: {} destroyed.",
                        summary.destroy
                    );
                } else {
                    let _ = writeln!(
                        output,
                        "\n{marker} Apply {status}! Resources: {} imported, {} added, {} changed, {} destroyed.",
                        summary.import, summary.add, summary.change, summary.destroy
                    );
                }
                if !outcome.state.outputs.is_empty() {
                    output.push_str("\nOutputs:\n\n");
                    for (name, record) in &outcome.state.outputs {
                        let value = if record.sensitive {
                            "<sensitive>".to_string()
                        } else {
                            render(&record.value)
                        };
                        let _ = writeln!(output, "{name} = {value}");
                    }
                }
                output
            }
        }
    }

    /// Formats the result of a refresh.
    #[must_use]
    pub fn format_refresh(&self, outcome: &WalkOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&WalkJson::from(outcome)).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = Self::format_diagnostics_text(&outcome.report.diagnostics);
                let _ = writeln!(
                    output,
                    "\n{} Refreshed {} instance(s); state serial {}.",
                    "✓".green(),
                    outcome.state.resources.len(),
                    outcome.state.serial
                );
                output
            }
        }
    }

    /// Formats the recorded instances.
    #[must_use]
    pub fn format_state_list(&self, state: &State) -> String {
        match self.format {
            OutputFormat::Json => {
                let addresses: Vec<String> = state.resources.keys().map(ToString::to_string).collect();
                serde_json::to_string_pretty(&addresses).unwrap_or_default()
            }
            OutputFormat::Text => {
                if state.resources.is_empty() {
                    return "No instances in state.\n".to_string();
                }
                let rows: Vec<InstanceRow> = state
                    .resources
                    .values()
                    .map(|r| InstanceRow {
                        address: r.address.to_string(),
                        provider: r.provider.clone(),
                        id: r.id().unwrap_or("-").to_string(),
                        dependencies: r
                            .dependencies
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                let _ = write!(
                    output,
                    "\n\nSerial {} (lineage {}), last updated {}\n",
                    state.serial,
                    state.lineage,
                    state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
                );
                output
            }
        }
    }

    /// Formats one recorded instance. Sensitive attributes are redacted in
    /// both formats.
    #[must_use]
    pub fn format_record(&self, record: &ResourceRecord) -> String {
        let value = record.value();
        match self.format {
            OutputFormat::Json => {
                let redacted: BTreeMap<String, String> = attrs(Some(&value))
                    .into_iter()
                    .map(|(k, v)| (k, render(&v)))
                    .collect();
                serde_json::to_string_pretty(&serde_json::json!({
                    "address": record.address.to_string(),
                    "provider": record.provider,
                    "attributes": redacted,
                    "dependencies": record.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }))
                .unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!(
                    "# {}:\nresource \"{}\" \"{}\" {{\n",
                    record.address, record.address.resource_type, record.address.name
                );
                let attributes = attrs(Some(&value));
                let width = attributes.keys().map(String::len).max().unwrap_or(0);
                for (name, value) in &attributes {
                    let _ = writeln!(output, "    {name:width$} = {}", render(value));
                }
                output.push_str("}\n");
                output
            }
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&serde_json::json!({ "status": "success", "message": message }))
                    .unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✓".green()),
        }
    }
}

fn attrs(value: Option<&MarkedValue>) -> BTreeMap<String, MarkedValue> {
    value.and_then(MarkedValue::as_object).cloned().unwrap_or_default()
}

/// Renders a value for display. Marks on nested values are honored, so a
/// sensitive field inside an object is redacted on its own.
fn render(value: &MarkedValue) -> String {
    value.to_string()
}

// JSON serialization helpers

#[derive(Serialize)]
struct WalkJson {
    complete: bool,
    serial: u64,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    cancelled: usize,
    diagnostics: Diagnostics,
    outputs: BTreeMap<String, serde_json::Value>,
}

impl From<&WalkOutcome> for WalkJson {
    fn from(outcome: &WalkOutcome) -> Self {
        use crate::walk::NodeState;
        let report = &outcome.report;
        Self {
            complete: outcome.check().is_ok(),
            serial: outcome.state.serial,
            succeeded: report.count(NodeState::Succeeded),
            failed: report.count(NodeState::Failed),
            skipped: report.count(NodeState::Skipped),
            cancelled: report.count(NodeState::Cancelled),
            diagnostics: report.diagnostics.clone(),
            outputs: outcome
                .state
                .outputs
                .iter()
                .map(|(name, record)| {
                    let value = if record.sensitive {
                        serde_json::Value::String("<sensitive>".to_string())
                    } else {
                        serde_json::to_value(&record.value).unwrap_or_default()
                    };
                    (name.clone(), value)
                })
                .collect(),
        }
    }
}
