//! Type conversion between value kinds.

use super::marked::{format_number, MarkedValue, Value, ValueType};
use thiserror::Error;

/// Why a value could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The value is not yet known. Callers usually report this separately.
    #[error("value is not yet known")]
    Unknown,

    /// The value is null where a concrete value is needed.
    #[error("a non-null value is required")]
    Null,

    /// The value is of the wrong kind.
    #[error("{expected} required")]
    TypeMismatch {
        /// Required type.
        expected: ValueType,
        /// Kind that was found.
        found: &'static str,
    },

    /// A string could not be parsed into the target type.
    #[error("cannot convert {text:?} to {expected}")]
    Parse {
        /// Required type.
        expected: ValueType,
        /// The offending text.
        text: String,
    },

    /// A number is not a non-negative whole number.
    #[error("a whole number is required, but got {value}")]
    NotWholeNumber {
        /// The formatted number.
        value: String,
    },
}

/// Converts `value` to `target`, keeping its marks.
///
/// Unknown and null values convert to themselves, since their type is
/// irrelevant until they hold something.
///
/// # Errors
///
/// Returns an error when the payload cannot be represented as `target`.
pub fn convert(value: &MarkedValue, target: ValueType) -> Result<MarkedValue, ConversionError> {
    if !value.is_known() || value.is_null() || target == ValueType::Any {
        return Ok(value.clone());
    }
    let marks = value.marks();
    let converted = match (target, value.value()) {
        (ValueType::String, Value::String(_))
        | (ValueType::Number, Value::Number(_))
        | (ValueType::Bool, Value::Bool(_))
        | (ValueType::List, Value::List(_))
        | (ValueType::Object, Value::Object(_)) => return Ok(value.clone()),
        (ValueType::String, Value::Number(n)) => Value::String(format_number(*n)),
        (ValueType::String, Value::Bool(b)) => Value::String(b.to_string()),
        (ValueType::Number, Value::String(s)) => {
            Value::Number(s.trim().parse::<f64>().map_err(|_| ConversionError::Parse {
                expected: target,
                text: s.clone(),
            })?)
        }
        (ValueType::Bool, Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                return Err(ConversionError::Parse {
                    expected: target,
                    text: s.clone(),
                });
            }
        },
        (expected, other) => {
            return Err(ConversionError::TypeMismatch {
                expected,
                found: other.type_name(),
            });
        }
    };
    Ok(MarkedValue::new(converted).with_marks(marks))
}

/// Extraction of a concrete Rust value from a known, unmarked-or-marked value.
pub trait FromValue: Sized {
    /// The value type to convert to before extraction.
    const TYPE: ValueType;

    /// Extracts `Self`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or null values, or values of the wrong kind.
    fn from_value(value: &MarkedValue) -> Result<Self, ConversionError>;
}

fn concrete(value: &MarkedValue, target: ValueType) -> Result<Value, ConversionError> {
    if !value.is_known() {
        return Err(ConversionError::Unknown);
    }
    if value.is_null() {
        return Err(ConversionError::Null);
    }
    convert(value, target).map(|v| v.into_parts().0)
}

impl FromValue for String {
    const TYPE: ValueType = ValueType::String;

    fn from_value(value: &MarkedValue) -> Result<Self, ConversionError> {
        match concrete(value, Self::TYPE)? {
            Value::String(s) => Ok(s),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::TYPE,
                found: other.type_name(),
            }),
        }
    }
}

impl FromValue for f64 {
    const TYPE: ValueType = ValueType::Number;

    fn from_value(value: &MarkedValue) -> Result<Self, ConversionError> {
        match concrete(value, Self::TYPE)? {
            Value::Number(n) => Ok(n),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::TYPE,
                found: other.type_name(),
            }),
        }
    }
}

impl FromValue for bool {
    const TYPE: ValueType = ValueType::Bool;

    fn from_value(value: &MarkedValue) -> Result<Self, ConversionError> {
        match concrete(value, Self::TYPE)? {
            Value::Bool(b) => Ok(b),
            other => Err(ConversionError::TypeMismatch {
                expected: Self::TYPE,
                found: other.type_name(),
            }),
        }
    }
}

impl FromValue for usize {
    const TYPE: ValueType = ValueType::Number;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_value(value: &MarkedValue) -> Result<Self, ConversionError> {
        let n = f64::from_value(value)?;
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 {
            Ok(n as Self)
        } else {
            Err(ConversionError::NotWholeNumber {
                value: format_number(n),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Mark;

    #[test]
    fn test_primitive_conversions() {
        let n = convert(&MarkedValue::number(5.0), ValueType::String).ok();
        assert_eq!(n, Some(MarkedValue::string("5")));

        let b = convert(&MarkedValue::string("true"), ValueType::Bool).ok();
        assert_eq!(b, Some(MarkedValue::bool(true)));

        assert!(matches!(
            convert(&MarkedValue::string("abc"), ValueType::Number),
            Err(ConversionError::Parse { .. })
        ));
    }

    #[test]
    fn test_conversion_keeps_marks() {
        let v = MarkedValue::number(1.0).mark(Mark::Sensitive);
        let converted = convert(&v, ValueType::String).ok();
        assert!(converted.is_some_and(|c| c.is_sensitive()));
    }

    #[test]
    fn test_unknown_passes_through_convert_but_not_extraction() {
        let unknown = MarkedValue::unknown();
        assert_eq!(convert(&unknown, ValueType::String).ok(), Some(unknown.clone()));
        assert_eq!(String::from_value(&unknown), Err(ConversionError::Unknown));
    }

    #[test]
    fn test_structural_value_is_unsuitable_string() {
        let list = MarkedValue::list(vec![MarkedValue::string("a")]);
        let err = String::from_value(&list).err();
        assert_eq!(err.map(|e| e.to_string()), Some("string required".to_string()));
    }

    #[test]
    fn test_whole_numbers() {
        assert_eq!(usize::from_value(&MarkedValue::number(3.0)), Ok(3));
        assert!(usize::from_value(&MarkedValue::number(-1.0)).is_err());
        assert!(usize::from_value(&MarkedValue::number(1.5)).is_err());
        assert_eq!(usize::from_value(&MarkedValue::string("2")), Ok(2));
    }
}
