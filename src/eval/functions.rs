//! Built-in functions available in expressions.
//!
//! Functions see fully evaluated arguments. Unless a function deals with
//! marks itself (`sensitive`, `nonsensitive`), an unknown argument makes the
//! result unknown and the marks of every argument carry over to the result.

use crate::value::{
    convert, format_number, FromValue, Mark, MarkedValue, Marks, Value, ValueType,
};

/// Names of all built-in functions.
pub const FUNCTION_NAMES: &[&str] = &[
    "coalesce",
    "concat",
    "format",
    "join",
    "length",
    "lower",
    "nonsensitive",
    "sensitive",
    "tonumber",
    "tostring",
    "upper",
];

/// Calls the built-in function `name`.
///
/// # Errors
///
/// Returns a message for unknown functions, wrong arity, or invalid arguments.
pub fn call(name: &str, args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    match name {
        "sensitive" => {
            let [value] = exact::<1>(name, args)?;
            return Ok(value.mark(Mark::Sensitive));
        }
        "nonsensitive" => {
            let [value] = exact::<1>(name, args)?;
            if !value.is_sensitive() && value.is_known() {
                return Err("Invalid function argument: the given value is not sensitive, so this call is redundant.".to_string());
            }
            let (inner, marks) = value.unmark();
            return Ok(inner.with_marks(marks.without(Mark::Sensitive)));
        }
        _ if !FUNCTION_NAMES.contains(&name) => {
            return Err(format!(
                "There is no function named \"{name}\". Available functions: {}.",
                FUNCTION_NAMES.join(", ")
            ));
        }
        _ => {}
    }

    let marks = args
        .iter()
        .fold(Marks::NONE, |acc, v| acc.union(v.deep_marks()));
    if marks.has(Mark::Unknown) && name != "length" {
        return Ok(MarkedValue::unknown().with_marks(marks));
    }
    let result = match name {
        "upper" => string_op(name, args, |s| s.to_uppercase())?,
        "lower" => string_op(name, args, |s| s.to_lowercase())?,
        "length" => length(args)?,
        "join" => join(args)?,
        "concat" => concat(args)?,
        "coalesce" => coalesce(args)?,
        "tostring" => {
            let [value] = exact::<1>(name, args)?;
            convert(&value, ValueType::String).map_err(|e| format!("Invalid value for tostring: {e}."))?
        }
        "tonumber" => {
            let [value] = exact::<1>(name, args)?;
            convert(&value, ValueType::Number).map_err(|e| format!("Invalid value for tonumber: {e}."))?
        }
        "format" => format(args)?,
        _ => return Err(format!("There is no function named \"{name}\".")),
    };
    if !result.is_known() {
        return Ok(result);
    }
    let (result, _) = result.unmark();
    Ok(result.with_marks(marks.without(Mark::Unknown)))
}

fn exact<const N: usize>(name: &str, args: Vec<MarkedValue>) -> Result<[MarkedValue; N], String> {
    let count = args.len();
    args.try_into().map_err(|_| {
        format!("Function \"{name}\" expects {N} argument(s), but {count} were given.")
    })
}

fn string_arg(name: &str, value: &MarkedValue) -> Result<String, String> {
    String::from_value(value).map_err(|e| format!("Invalid argument to {name}: {e}."))
}

fn string_op(
    name: &str,
    args: Vec<MarkedValue>,
    op: impl Fn(&str) -> String,
) -> Result<MarkedValue, String> {
    let [value] = exact::<1>(name, args)?;
    Ok(MarkedValue::string(op(&string_arg(name, &value)?)))
}

#[allow(clippy::cast_precision_loss)]
fn length(args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    let [value] = exact::<1>("length", args)?;
    if !value.is_known() {
        return Ok(MarkedValue::unknown().with_marks(value.marks()));
    }
    let len = match value.value() {
        Value::List(items) => items.len(),
        Value::Object(attrs) => attrs.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(format!(
                "Invalid argument to length: a list, object or string is required, but got {}.",
                other.type_name()
            ));
        }
    };
    Ok(MarkedValue::number(len as f64))
}

fn join(args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    let [separator, list] = exact::<2>("join", args)?;
    let separator = string_arg("join", &separator)?;
    let items = list
        .as_list()
        .ok_or_else(|| "Invalid argument to join: a list is required as the second argument.".to_string())?;
    let parts = items
        .iter()
        .map(|item| string_arg("join", item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MarkedValue::string(parts.join(&separator)))
}

fn concat(args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    let mut out = Vec::new();
    for arg in args {
        let items = arg
            .as_list()
            .ok_or_else(|| "Invalid argument to concat: all arguments must be lists.".to_string())?;
        out.extend(items.iter().cloned());
    }
    Ok(MarkedValue::list(out))
}

fn coalesce(args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    args.into_iter()
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .ok_or_else(|| "Invalid arguments to coalesce: no non-null, non-empty argument.".to_string())
}

fn format(args: Vec<MarkedValue>) -> Result<MarkedValue, String> {
    let mut args = args.into_iter();
    let spec = args
        .next()
        .ok_or_else(|| "Function \"format\" expects at least one argument.".to_string())?;
    let spec = string_arg("format", &spec)?;
    let mut out = String::new();
    let mut chars = spec.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let arg = args
                    .next()
                    .ok_or_else(|| "Not enough arguments for format string.".to_string())?;
                out.push_str(&string_arg("format", &arg)?);
            }
            Some('d') => {
                let arg = args
                    .next()
                    .ok_or_else(|| "Not enough arguments for format string.".to_string())?;
                let n = f64::from_value(&arg).map_err(|e| format!("Invalid argument to format: {e}."))?;
                if n.fract() != 0.0 {
                    return Err(format!("Invalid argument to format: %d requires a whole number, but got {}.", format_number(n)));
                }
                out.push_str(&format_number(n));
            }
            other => {
                return Err(format!(
                    "Unsupported format verb %{} in format string.",
                    other.map(String::from).unwrap_or_default()
                ));
            }
        }
    }
    if args.next().is_some() {
        return Err("Too many arguments for format string.".to_string());
    }
    Ok(MarkedValue::string(out))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn s(v: &str) -> MarkedValue {
        MarkedValue::string(v)
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", vec![s("abc")]).unwrap(), s("ABC"));
        assert_eq!(call("lower", vec![s("AbC")]).unwrap(), s("abc"));
        assert_eq!(
            call("join", vec![s("-"), MarkedValue::list(vec![s("a"), s("b")])]).unwrap(),
            s("a-b")
        );
        assert_eq!(
            call("format", vec![s("%s-%d%%"), s("web"), MarkedValue::number(3.0)]).unwrap(),
            s("web-3%")
        );
    }

    #[test]
    fn test_length_and_collections() {
        let list = MarkedValue::list(vec![s("a"), s("b")]);
        assert_eq!(call("length", vec![list.clone()]).unwrap(), MarkedValue::number(2.0));
        let joined = call("concat", vec![list.clone(), list]).unwrap();
        assert_eq!(joined.as_list().unwrap().len(), 4);
        assert_eq!(
            call("coalesce", vec![MarkedValue::null(), s(""), s("x")]).unwrap(),
            s("x")
        );
    }

    #[test]
    fn test_unknown_arguments_give_unknown_results() {
        let result = call("upper", vec![MarkedValue::unknown()]).unwrap();
        assert!(!result.is_known());

        let list = MarkedValue::list(vec![s("a"), MarkedValue::unknown()]);
        assert!(!call("join", vec![s(","), list.clone()]).unwrap().is_known());
        assert_eq!(call("length", vec![list]).unwrap(), MarkedValue::number(2.0));
    }

    #[test]
    fn test_sensitivity_flows_through_functions() {
        let secret = s("pw").mark(Mark::Sensitive);
        let upper = call("upper", vec![secret.clone()]).unwrap();
        assert!(upper.is_sensitive());
        assert_eq!(upper.unmark().0, s("PW"));

        let revealed = call("nonsensitive", vec![secret]).unwrap();
        assert!(!revealed.is_sensitive());
        assert!(call("nonsensitive", vec![s("plain")]).is_err());
        assert!(call("sensitive", vec![s("x")]).unwrap().is_sensitive());
    }

    #[test]
    fn test_errors() {
        assert!(call("nope", vec![]).is_err());
        assert!(call("upper", vec![]).is_err());
        assert!(call("format", vec![s("%s")]).is_err());
        assert!(call("join", vec![s(","), s("not a list")]).is_err());
    }
}
