//! Expression evaluation.

use super::expr::{ExprKind, Expression, Reference, Step, TemplatePart};
use super::functions;
use super::scope::EvalContext;
use crate::value::{
    convert, Diagnostic, DiagnosticKind, Diagnostics, FromValue, Mark, MarkedValue, Marks, Value,
    ValueType,
};
use std::collections::BTreeMap;

/// Evaluates `expr` in `ctx` without any type conversion.
///
/// On error the returned value is null and the diagnostics explain why.
#[must_use]
pub fn evaluate(expr: &Expression, ctx: &EvalContext) -> (MarkedValue, Diagnostics) {
    let mut diags = Diagnostics::new();
    let value = eval(expr, ctx, &mut diags).unwrap_or_default();
    (value, diags)
}

/// Evaluates an optional expression and converts the result to `target`.
///
/// An absent expression evaluates to null. Unknown results are returned as
/// unknown; conversion only applies once the value is known.
#[must_use]
pub fn evaluate_expr(
    expr: Option<&Expression>,
    ctx: &EvalContext,
    target: ValueType,
) -> (MarkedValue, Diagnostics) {
    let Some(expr) = expr else {
        return (MarkedValue::null(), Diagnostics::new());
    };
    let (value, mut diags) = evaluate(expr, ctx);
    if diags.has_errors() {
        return (value, diags);
    }
    match convert(&value, target) {
        Ok(converted) => (converted, diags),
        Err(err) => {
            diags.push(
                Diagnostic::error(
                    DiagnosticKind::Evaluation,
                    "Incorrect value type",
                    format!("Invalid expression value: {err}."),
                )
                .with_subject(Some(expr.range.clone())),
            );
            (MarkedValue::null(), diags)
        }
    }
}

/// Messages for a configuration argument that must evaluate to a known,
/// non-null, non-sensitive value of one type.
#[derive(Debug, Clone, Copy)]
pub struct RequiredField {
    /// Summary shared by all diagnostics for this field.
    pub summary: &'static str,
    /// Detail when the value is absent or null.
    pub null_detail: &'static str,
    /// Detail when the value is not yet known.
    pub unknown_detail: &'static str,
    /// Detail when the value is sensitive.
    pub sensitive_detail: &'static str,
    /// Prefix of the detail when the value has the wrong type.
    pub unsuitable_prefix: &'static str,
}

/// The `count` argument of a resource block.
pub const COUNT_FIELD: RequiredField = RequiredField {
    summary: "Invalid count argument",
    null_detail: "The given \"count\" argument value is null. An integer is required.",
    unknown_detail: "The \"count\" value depends on resource attributes that cannot be determined until apply, so Strata cannot predict how many instances will be created.",
    sensitive_detail: "The given \"count\" value is derived from a sensitive value, so it cannot be used to decide how many instances to create.",
    unsuitable_prefix: "The given \"count\" argument value is unsuitable",
};

impl RequiredField {
    /// Evaluates `expr` and extracts a concrete `T`.
    ///
    /// Checks run in a fixed order and stop at the first failure: absence,
    /// evaluation errors, null, unknown, sensitive, and finally conversion.
    /// The value is `None` whenever an error diagnostic was produced.
    #[must_use]
    pub fn evaluate<T: FromValue>(
        &self,
        expr: Option<&Expression>,
        ctx: &EvalContext,
    ) -> (Option<T>, Diagnostics) {
        let Some(expr) = expr else {
            return (None, Diagnostics::from(self.error(DiagnosticKind::Config, self.null_detail)));
        };
        let subject = Some(expr.range.clone());

        let (value, mut diags) = evaluate_expr(Some(expr), ctx, T::TYPE);
        if diags.has_errors() {
            return (None, diags);
        }

        if value.is_null() {
            diags.push(
                self.error(DiagnosticKind::Evaluation, self.null_detail)
                    .with_subject(subject),
            );
            return (None, diags);
        }

        if !value.is_known() {
            diags.push(
                self.error(DiagnosticKind::UnknownValue, self.unknown_detail)
                    .with_subject(subject)
                    .caused_by_unknown(),
            );
            return (None, diags);
        }

        if value.contains_sensitive() {
            diags.push(
                self.error(DiagnosticKind::SensitivityViolation, self.sensitive_detail)
                    .with_subject(subject),
            );
            return (None, diags);
        }

        match T::from_value(&value) {
            Ok(concrete) => (Some(concrete), diags),
            Err(err) => {
                diags.push(
                    self.error(
                        DiagnosticKind::Evaluation,
                        format!("{}: {err}.", self.unsuitable_prefix),
                    )
                    .with_subject(subject),
                );
                (None, diags)
            }
        }
    }

    fn error(&self, kind: DiagnosticKind, detail: impl Into<String>) -> Diagnostic {
        Diagnostic::error(kind, self.summary, detail)
    }
}

fn error_at(diags: &mut Diagnostics, expr: &Expression, summary: &str, detail: impl Into<String>) {
    diags.push(
        Diagnostic::error(DiagnosticKind::Evaluation, summary, detail)
            .with_subject(Some(expr.range.clone())),
    );
}

fn eval(expr: &Expression, ctx: &EvalContext, diags: &mut Diagnostics) -> Option<MarkedValue> {
    match &expr.kind {
        ExprKind::Literal(value) => Some(value.clone()),
        ExprKind::Traversal(traversal) => {
            let (reference, consumed) = match Reference::parse(traversal) {
                Ok(parsed) => parsed,
                Err(detail) => {
                    error_at(diags, expr, "Invalid reference", detail);
                    return None;
                }
            };
            let mut value = match ctx.resolve(&reference) {
                Ok(value) => value,
                Err(detail) => {
                    error_at(diags, expr, "Reference to undeclared object", detail);
                    return None;
                }
            };
            for step in &traversal.steps[consumed..] {
                value = match step {
                    Step::Attr(name) => {
                        if value.is_null() {
                            error_at(
                                diags,
                                expr,
                                "Attempt to get attribute from null value",
                                format!("This value is null, so it does not have any attribute named \"{name}\"."),
                            );
                            return None;
                        }
                        match value.get_attr(name) {
                            Some(v) => v,
                            None => {
                                error_at(
                                    diags,
                                    expr,
                                    "Unsupported attribute",
                                    format!("This {} does not have an attribute named \"{name}\".", value.value().type_name()),
                                );
                                return None;
                            }
                        }
                    }
                    Step::Index(i) => match value.get_index(*i) {
                        Some(v) => v,
                        None => {
                            error_at(
                                diags,
                                expr,
                                "Invalid index",
                                format!("The given index {i} is not present in this {}.", value.value().type_name()),
                            );
                            return None;
                        }
                    },
                };
            }
            Some(value)
        }
        ExprKind::Template(parts) => eval_template(parts, ctx, diags),
        ExprKind::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            let mut failed = false;
            for arg in args {
                match eval(arg, ctx, diags) {
                    Some(v) => values.push(v),
                    None => failed = true,
                }
            }
            if failed {
                return None;
            }
            match functions::call(name, values) {
                Ok(v) => Some(v),
                Err(detail) => {
                    error_at(diags, expr, "Error in function call", format!("Call to function \"{name}\" failed: {detail}"));
                    None
                }
            }
        }
        ExprKind::List(items) => {
            let values: Vec<Option<MarkedValue>> = items.iter().map(|e| eval(e, ctx, diags)).collect();
            values.into_iter().collect::<Option<Vec<_>>>().map(MarkedValue::list)
        }
        ExprKind::Object(attrs) => {
            let values: BTreeMap<String, Option<MarkedValue>> = attrs
                .iter()
                .map(|(k, e)| (k.clone(), eval(e, ctx, diags)))
                .collect();
            values
                .into_iter()
                .map(|(k, v)| v.map(|v| (k, v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(MarkedValue::object)
        }
    }
}

fn eval_template(
    parts: &[TemplatePart],
    ctx: &EvalContext,
    diags: &mut Diagnostics,
) -> Option<MarkedValue> {
    let mut out = String::new();
    let mut marks = Marks::NONE;
    let mut unknown = false;
    let mut failed = false;

    for part in parts {
        let interpolation = match part {
            TemplatePart::Literal(text) => {
                out.push_str(text);
                continue;
            }
            TemplatePart::Interpolation(inner) => inner,
        };
        let Some(value) = eval(interpolation, ctx, diags) else {
            failed = true;
            continue;
        };
        marks = marks.union(value.deep_marks());
        if value.contains_unknown() {
            unknown = true;
            continue;
        }
        if value.is_null() {
            error_at(
                diags,
                interpolation,
                "Invalid template interpolation value",
                "The expression result is null. Cannot include a null value in a string template.",
            );
            failed = true;
            continue;
        }
        match convert(&value, ValueType::String).map(|v| v.into_parts().0) {
            Ok(Value::String(s)) => out.push_str(&s),
            Ok(_) | Err(_) => {
                error_at(
                    diags,
                    interpolation,
                    "Invalid template interpolation value",
                    format!(
                        "Cannot include the given value in a string template: string required, but got {}.",
                        value.value().type_name()
                    ),
                );
                failed = true;
            }
        }
    }

    if failed {
        return None;
    }
    if unknown {
        return Some(MarkedValue::unknown().with_marks(marks));
    }
    Some(MarkedValue::string(out).with_marks(marks.without(Mark::Unknown)))
}
