//! Evaluation of `import` block identifiers.

use super::evaluator::RequiredField;
use super::expr::Expression;
use super::scope::EvalContext;
use crate::addrs::ModulePath;
use crate::value::Diagnostics;

/// The `id` argument of an import block.
pub const IMPORT_ID_FIELD: RequiredField = RequiredField {
    summary: "Invalid import id argument",
    null_detail: "The import ID cannot be null.",
    unknown_detail: "The import block \"id\" argument depends on resource attributes that cannot be determined until apply, so Strata cannot plan to import this resource.",
    sensitive_detail: "The import ID cannot be sensitive.",
    unsuitable_prefix: "The import ID value is unsuitable",
};

/// Evaluates the identifier of an import block.
///
/// Import blocks always evaluate in the root module, whatever scope `ctx`
/// was built for. Returns the empty string whenever an error diagnostic is
/// produced.
#[must_use]
pub fn evaluate_import_id(expr: Option<&Expression>, ctx: &EvalContext) -> (String, Diagnostics) {
    let root = ctx.with_path(ModulePath::root());
    let (id, diags) = IMPORT_ID_FIELD.evaluate::<String>(expr, &root);
    (id.unwrap_or_default(), diags)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::eval::scope::{NamedValues, ValueKey};
    use crate::eval::template::parse_template;
    use crate::value::{DiagnosticKind, Mark, MarkedValue, SourceRange};
    use std::sync::Arc;

    fn root_ctx() -> EvalContext {
        let values = Arc::new(NamedValues::new());
        let root = ModulePath::root();
        values.set(ValueKey::Variable(root.clone(), "id".into()), MarkedValue::string("i-123"));
        values.set(ValueKey::Variable(root.clone(), "num".into()), MarkedValue::number(42.0));
        values.set(
            ValueKey::Variable(root.clone(), "secret".into()),
            MarkedValue::string("s").mark(Mark::Sensitive),
        );
        values.set(ValueKey::Variable(root.clone(), "empty".into()), MarkedValue::null());
        values.set(
            ValueKey::Variable(root.clone(), "list".into()),
            MarkedValue::list(vec![MarkedValue::string("a")]),
        );
        values.register_resource(&root, "null_resource", "r1", None);
        EvalContext::new(values)
    }

    fn expr(text: &str) -> Expression {
        parse_template(text, &SourceRange::new("imports.strata.yaml", "imports[0].id")).unwrap()
    }

    #[test]
    fn test_absent_id() {
        let (id, diags) = evaluate_import_id(None, &root_ctx());
        assert_eq!(id, "");
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Invalid import id argument");
        assert_eq!(diag.detail, "The import ID cannot be null.");
        assert!(diag.subject.is_none());
    }

    #[test]
    fn test_null_id_has_subject() {
        let (id, diags) = evaluate_import_id(Some(&expr("${var.empty}")), &root_ctx());
        assert_eq!(id, "");
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.detail, "The import ID cannot be null.");
        assert_eq!(diag.subject.as_ref().unwrap().path, "imports[0].id");
    }

    #[test]
    fn test_unknown_id() {
        let (id, diags) = evaluate_import_id(Some(&expr("${null_resource.r1.id}")), &root_ctx());
        assert_eq!(id, "");
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert!(diag.caused_by_unknown);
        assert!(diag.detail.contains("cannot be determined until apply"));
    }

    #[test]
    fn test_sensitive_id() {
        let (id, diags) = evaluate_import_id(Some(&expr("${var.secret}")), &root_ctx());
        assert_eq!(id, "");
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::SensitivityViolation);
        assert_eq!(diag.detail, "The import ID cannot be sensitive.");
    }

    #[test]
    fn test_unsuitable_id() {
        let (id, diags) = evaluate_import_id(Some(&expr("${var.list}")), &root_ctx());
        assert_eq!(id, "");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.iter().next().unwrap().detail.contains("string required"));
    }

    #[test]
    fn test_valid_ids() {
        let (id, diags) = evaluate_import_id(Some(&expr("${var.id}")), &root_ctx());
        assert_eq!(id, "i-123");
        assert!(diags.is_empty());

        let (id, _) = evaluate_import_id(Some(&expr("${var.num}")), &root_ctx());
        assert_eq!(id, "42");
    }

    #[test]
    fn test_evaluates_in_root_scope() {
        let ctx = root_ctx().with_path(ModulePath::root().child("nested"));
        let (id, diags) = evaluate_import_id(Some(&expr("${var.id}")), &ctx);
        assert_eq!(id, "i-123");
        assert!(diags.is_empty());
    }
}
