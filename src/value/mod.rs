//! Marked values and diagnostics.
//!
//! Every value flowing through evaluation carries two independent marks:
//! `unknown` (the concrete value only exists after apply) and `sensitive`
//! (the value must be redacted). Marks propagate through every operation
//! that derives a new value from a marked one.

mod convert;
mod diagnostics;
mod marked;

pub use convert::{convert, ConversionError, FromValue};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity, SourceRange};
pub use marked::{format_number, yaml_key, Mark, MarkedValue, Marks, Value, ValueType};
