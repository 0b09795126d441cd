//! Dynamically typed values carrying `unknown` and `sensitive` marks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A property attached to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    /// The concrete value will only exist after apply.
    Unknown,
    /// The value must never be displayed or used where secrets are forbidden.
    Sensitive,
}

/// The set of marks on one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Marks {
    unknown: bool,
    sensitive: bool,
}

impl Marks {
    /// No marks.
    pub const NONE: Self = Self {
        unknown: false,
        sensitive: false,
    };

    /// Only the unknown mark.
    pub const UNKNOWN: Self = Self {
        unknown: true,
        sensitive: false,
    };

    /// Only the sensitive mark.
    pub const SENSITIVE: Self = Self {
        unknown: false,
        sensitive: true,
    };

    /// Returns true when no mark is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !self.unknown && !self.sensitive
    }

    /// Returns true when `mark` is set.
    #[must_use]
    pub const fn has(self, mark: Mark) -> bool {
        match mark {
            Mark::Unknown => self.unknown,
            Mark::Sensitive => self.sensitive,
        }
    }

    /// Returns a copy with `mark` set.
    #[must_use]
    pub const fn with(mut self, mark: Mark) -> Self {
        match mark {
            Mark::Unknown => self.unknown = true,
            Mark::Sensitive => self.sensitive = true,
        }
        self
    }

    /// Returns a copy with `mark` cleared.
    #[must_use]
    pub const fn without(mut self, mark: Mark) -> Self {
        match mark {
            Mark::Unknown => self.unknown = false,
            Mark::Sensitive => self.sensitive = false,
        }
        self
    }

    /// Returns the union of both mark sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            unknown: self.unknown || other.unknown,
            sensitive: self.sensitive || other.sensitive,
        }
    }

    /// Lists the set marks in a stable order.
    #[must_use]
    pub fn to_vec(self) -> Vec<Mark> {
        let mut marks = Vec::new();
        if self.unknown {
            marks.push(Mark::Unknown);
        }
        if self.sensitive {
            marks.push(Mark::Sensitive);
        }
        marks
    }
}

impl FromIterator<Mark> for Marks {
    fn from_iter<I: IntoIterator<Item = Mark>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

/// The kind of a value, used as a conversion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Accept any value unchanged.
    Any,
    /// A string.
    String,
    /// A number.
    Number,
    /// A boolean.
    Bool,
    /// An ordered list.
    List,
    /// A string-keyed object.
    Object,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any value",
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// The payload of a [`MarkedValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(String),
    /// An ordered list.
    List(Vec<MarkedValue>),
    /// A string-keyed object.
    Object(BTreeMap<String, MarkedValue>),
}

impl Value {
    /// Returns a short name of the payload kind, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }
}

/// A value with its marks.
///
/// Unknown values carry a [`Value::Null`] payload; the payload is meaningless
/// until the unknown mark is gone. Marks on a container apply to everything
/// read out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MarkedRepr", into = "MarkedRepr")]
pub struct MarkedValue {
    value: Value,
    marks: Marks,
}

/// On-disk form: plain JSON when unmarked, an envelope otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MarkedRepr {
    Marked {
        #[serde(rename = "$marks")]
        marks: Vec<Mark>,
        value: Value,
    },
    Plain(Value),
}

impl From<MarkedRepr> for MarkedValue {
    fn from(repr: MarkedRepr) -> Self {
        match repr {
            MarkedRepr::Marked { marks, value } => Self {
                value,
                marks: marks.into_iter().collect(),
            },
            MarkedRepr::Plain(value) => Self::new(value),
        }
    }
}

impl From<MarkedValue> for MarkedRepr {
    fn from(value: MarkedValue) -> Self {
        if value.marks.is_empty() {
            Self::Plain(value.value)
        } else {
            Self::Marked {
                marks: value.marks.to_vec(),
                value: value.value,
            }
        }
    }
}

impl Default for MarkedValue {
    fn default() -> Self {
        Self::null()
    }
}

impl MarkedValue {
    /// Wraps an unmarked payload.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            marks: Marks::NONE,
        }
    }

    /// The null value.
    #[must_use]
    pub const fn null() -> Self {
        Self::new(Value::Null)
    }

    /// A placeholder for a value that will only be known after apply.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            value: Value::Null,
            marks: Marks::UNKNOWN,
        }
    }

    /// A string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::new(Value::String(s.into()))
    }

    /// A number value.
    #[must_use]
    pub const fn number(n: f64) -> Self {
        Self::new(Value::Number(n))
    }

    /// A boolean value.
    #[must_use]
    pub const fn bool(b: bool) -> Self {
        Self::new(Value::Bool(b))
    }

    /// A list value.
    #[must_use]
    pub const fn list(items: Vec<Self>) -> Self {
        Self::new(Value::List(items))
    }

    /// An object value.
    #[must_use]
    pub const fn object(attrs: BTreeMap<String, Self>) -> Self {
        Self::new(Value::Object(attrs))
    }

    /// Builds an object from `(key, value)` pairs.
    #[must_use]
    pub fn object_from<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The payload.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// The marks on this value (not its children).
    #[must_use]
    pub const fn marks(&self) -> Marks {
        self.marks
    }

    /// Splits the value into payload and marks.
    #[must_use]
    pub fn into_parts(self) -> (Value, Marks) {
        (self.value, self.marks)
    }

    /// Returns true if this value itself is known.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !self.marks.unknown
    }

    /// Returns true if this value is a known null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.is_known() && matches!(self.value, Value::Null)
    }

    /// Returns true if this value itself is marked sensitive.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.marks.sensitive
    }

    /// Adds a mark.
    #[must_use]
    pub const fn mark(mut self, mark: Mark) -> Self {
        self.marks = self.marks.with(mark);
        self
    }

    /// Adds every mark in `marks`.
    #[must_use]
    pub const fn with_marks(mut self, marks: Marks) -> Self {
        self.marks = self.marks.union(marks);
        self
    }

    /// Removes the top-level marks, returning them alongside the value.
    #[must_use]
    pub fn unmark(self) -> (Self, Marks) {
        let marks = self.marks;
        (Self::new(self.value), marks)
    }

    /// Returns true if this value or anything inside it is unknown.
    #[must_use]
    pub fn contains_unknown(&self) -> bool {
        !self.is_known()
            || match &self.value {
                Value::List(items) => items.iter().any(Self::contains_unknown),
                Value::Object(attrs) => attrs.values().any(Self::contains_unknown),
                _ => false,
            }
    }

    /// Returns true if this value or anything inside it is sensitive.
    #[must_use]
    pub fn contains_sensitive(&self) -> bool {
        self.is_sensitive()
            || match &self.value {
                Value::List(items) => items.iter().any(Self::contains_sensitive),
                Value::Object(attrs) => attrs.values().any(Self::contains_sensitive),
                _ => false,
            }
    }

    /// The union of the marks on this value and all of its children.
    #[must_use]
    pub fn deep_marks(&self) -> Marks {
        let inner = match &self.value {
            Value::List(items) => items
                .iter()
                .fold(Marks::NONE, |acc, v| acc.union(v.deep_marks())),
            Value::Object(attrs) => attrs
                .values()
                .fold(Marks::NONE, |acc, v| acc.union(v.deep_marks())),
            _ => Marks::NONE,
        };
        self.marks.union(inner)
    }

    /// Strips every sensitive mark, returning the paths where they were.
    ///
    /// Unknown marks are kept. Paths use `attr.child[0]` notation; the root is `""`.
    #[must_use]
    pub fn unmark_deep(&self) -> (Self, BTreeSet<String>) {
        let mut paths = BTreeSet::new();
        let stripped = self.unmark_deep_at(String::new(), &mut paths);
        (stripped, paths)
    }

    fn unmark_deep_at(&self, path: String, paths: &mut BTreeSet<String>) -> Self {
        if self.is_sensitive() {
            paths.insert(path.clone());
        }
        let value = match &self.value {
            Value::List(items) => Value::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v.unmark_deep_at(format!("{path}[{i}]"), paths))
                    .collect(),
            ),
            Value::Object(attrs) => Value::Object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.unmark_deep_at(join_path(&path, k), paths)))
                    .collect(),
            ),
            other => other.clone(),
        };
        Self {
            value,
            marks: self.marks.without(Mark::Sensitive),
        }
    }

    /// Re-applies sensitive marks at the given paths. Missing paths are ignored.
    #[must_use]
    pub fn mark_paths(self, paths: &BTreeSet<String>) -> Self {
        if paths.is_empty() {
            return self;
        }
        self.mark_paths_at("", paths)
    }

    fn mark_paths_at(self, path: &str, paths: &BTreeSet<String>) -> Self {
        let marks = if paths.contains(path) {
            self.marks.with(Mark::Sensitive)
        } else {
            self.marks
        };
        let value = match self.value {
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| v.mark_paths_at(&format!("{path}[{i}]"), paths))
                    .collect(),
            ),
            Value::Object(attrs) => Value::Object(
                attrs
                    .into_iter()
                    .map(|(k, v)| {
                        let child = join_path(path, &k);
                        (k, v.mark_paths_at(&child, paths))
                    })
                    .collect(),
            ),
            other => other,
        };
        Self { value, marks }
    }

    /// Removes every mark at every depth.
    #[must_use]
    pub fn clear_marks(&self) -> Self {
        let value = match &self.value {
            Value::List(items) => Value::List(items.iter().map(Self::clear_marks).collect()),
            Value::Object(attrs) => Value::Object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clear_marks()))
                    .collect(),
            ),
            other => other.clone(),
        };
        Self::new(value)
    }

    /// Compares payloads at every depth, ignoring sensitive marks.
    ///
    /// Unknown values never equal anything, not even another unknown.
    #[must_use]
    pub fn equals_ignoring_marks(&self, other: &Self) -> bool {
        if !self.is_known() || !other.is_known() {
            return false;
        }
        match (&self.value, &other.value) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals_ignoring_marks(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals_ignoring_marks(vb))
            }
            (a, b) => a == b,
        }
    }

    /// Reads an attribute of an object, carrying this value's marks onto the result.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<Self> {
        if !self.is_known() {
            return Some(Self::unknown().with_marks(self.marks));
        }
        match &self.value {
            Value::Object(attrs) => attrs.get(name).map(|v| v.clone().with_marks(self.marks)),
            _ => None,
        }
    }

    /// Reads a list element, carrying this value's marks onto the result.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<Self> {
        if !self.is_known() {
            return Some(Self::unknown().with_marks(self.marks));
        }
        match &self.value {
            Value::List(items) => items.get(index).map(|v| v.clone().with_marks(self.marks)),
            _ => None,
        }
    }

    /// The object attributes, if this is a known object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match &self.value {
            Value::Object(attrs) if self.is_known() => Some(attrs),
            _ => None,
        }
    }

    /// The list items, if this is a known list.
    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<Self>> {
        match &self.value {
            Value::List(items) if self.is_known() => Some(items),
            _ => None,
        }
    }

    /// The string payload, if this is a known string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) if self.is_known() => Some(s),
            _ => None,
        }
    }

    /// Converts an untyped YAML value.
    #[must_use]
    pub fn from_yaml(yaml: &serde_yaml::Value) -> Self {
        match yaml {
            serde_yaml::Value::Null => Self::null(),
            serde_yaml::Value::Bool(b) => Self::bool(*b),
            serde_yaml::Value::Number(n) => Self::number(n.as_f64().unwrap_or(f64::NAN)),
            serde_yaml::Value::String(s) => Self::string(s.clone()),
            serde_yaml::Value::Sequence(items) => {
                Self::list(items.iter().map(Self::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => Self::object(
                map.iter()
                    .map(|(k, v)| (yaml_key(k), Self::from_yaml(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(&tagged.value),
        }
    }
}

/// Renders a YAML mapping key as a string.
#[must_use]
pub fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Formats a number without a trailing `.0` for whole values.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for MarkedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sensitive() {
            return write!(f, "(sensitive value)");
        }
        if !self.is_known() {
            return write!(f, "(known after apply)");
        }
        match &self.value {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(attrs) => {
                if attrs.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                for (i, (k, v)) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn sample() -> MarkedValue {
        MarkedValue::object_from([
            ("name", MarkedValue::string("web")),
            ("password", MarkedValue::string("hunter2").mark(Mark::Sensitive)),
            (
                "tags",
                MarkedValue::list(vec![
                    MarkedValue::string("a"),
                    MarkedValue::unknown(),
                ]),
            ),
        ])
    }

    #[test]
    fn test_marks_are_deep() {
        let v = sample();
        assert!(v.is_known());
        assert!(v.contains_unknown());
        assert!(v.contains_sensitive());
        assert!(!v.is_sensitive());
        let marks = v.deep_marks();
        assert!(marks.has(Mark::Unknown));
        assert!(marks.has(Mark::Sensitive));
    }

    #[test]
    fn test_strip_and_restore_sensitive_paths() {
        let v = sample();
        let (stripped, paths) = v.unmark_deep();
        assert!(!stripped.contains_sensitive());
        assert!(stripped.contains_unknown());
        assert_eq!(paths.iter().collect::<Vec<_>>(), vec!["password"]);

        let restored = stripped.mark_paths(&paths);
        assert!(restored.get_attr("password").unwrap().is_sensitive());
        assert!(!restored.get_attr("name").unwrap().is_sensitive());
    }

    #[test]
    fn test_marks_propagate_through_access() {
        let secret = MarkedValue::object_from([("k", MarkedValue::string("v"))])
            .mark(Mark::Sensitive);
        assert!(secret.get_attr("k").unwrap().is_sensitive());

        let unknown = MarkedValue::unknown();
        assert!(!unknown.get_attr("anything").unwrap().is_known());
        assert!(!unknown.get_index(3).unwrap().is_known());
    }

    #[test]
    fn test_equality_ignores_sensitivity_but_not_unknown() {
        let a = MarkedValue::string("x");
        let b = MarkedValue::string("x").mark(Mark::Sensitive);
        assert!(a.equals_ignoring_marks(&b));
        assert!(!MarkedValue::unknown().equals_ignoring_marks(&MarkedValue::unknown()));
    }

    #[test]
    fn test_serialization_is_plain_when_unmarked() {
        let v = MarkedValue::object_from([("n", MarkedValue::number(2.0))]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"n":2.0}"#);
    }

    #[test]
    fn test_serialization_keeps_marks() {
        let v = sample();
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("$marks"));
        let back: MarkedValue = serde_json::from_str(&json).unwrap();
        assert!(back.get_attr("password").unwrap().is_sensitive());
        assert!(!back.get_attr("tags").unwrap().get_index(1).unwrap().is_known());
        assert_eq!(
            back.get_attr("name").unwrap().as_str(),
            Some("web")
        );
    }

    #[test]
    fn test_display_redacts() {
        assert_eq!(MarkedValue::string("s").mark(Mark::Sensitive).to_string(), "(sensitive value)");
        assert_eq!(MarkedValue::unknown().to_string(), "(known after apply)");
        assert_eq!(MarkedValue::number(3.0).to_string(), "3");
        assert_eq!(MarkedValue::string("a").to_string(), "\"a\"");
    }
}
