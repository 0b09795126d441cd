//! Expression evaluation.
//!
//! Configuration strings are parsed into [`Expression`] trees by
//! [`parse_template`], then evaluated against an [`EvalContext`]: a module
//! path plus the shared table of values resolved so far. Evaluation never
//! fails outright; it returns a value together with [`Diagnostics`].
//!
//! [`Diagnostics`]: crate::value::Diagnostics

mod evaluator;
mod expr;
mod functions;
mod import;
mod scope;
mod template;

pub use evaluator::{evaluate, evaluate_expr, RequiredField, COUNT_FIELD};
pub use expr::{ExprKind, Expression, Reference, Step, TemplatePart, Traversal};
pub use functions::{call as call_function, FUNCTION_NAMES};
pub use import::{evaluate_import_id, IMPORT_ID_FIELD};
pub use scope::{EvalContext, NamedValues, ValueKey};
pub use template::{parse_expression, parse_template, TemplateError};
