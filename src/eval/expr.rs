//! Expression syntax tree and reference extraction.

use crate::value::{MarkedValue, SourceRange};
use std::collections::BTreeMap;
use std::fmt;

/// One step after the root name of a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.name`
    Attr(String),
    /// `[n]`
    Index(usize),
}

/// A dotted reference such as `var.region` or `aws_subnet.a[0].id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    /// The first name.
    pub root: String,
    /// Everything after the first name.
    pub steps: Vec<Step>,
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                Step::Attr(name) => write!(f, ".{name}")?,
                Step::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// A piece of a string template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text.
    Literal(String),
    /// An interpolated `${...}` expression.
    Interpolation(Expression),
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A constant.
    Literal(MarkedValue),
    /// A string with interpolations.
    Template(Vec<TemplatePart>),
    /// A reference to another named value.
    Traversal(Traversal),
    /// A built-in function call.
    Call {
        /// Function name.
        name: String,
        /// Arguments in order.
        args: Vec<Expression>,
    },
    /// A list constructor.
    List(Vec<Expression>),
    /// An object constructor.
    Object(BTreeMap<String, Expression>),
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The expression.
    pub kind: ExprKind,
    /// Where it came from.
    pub range: SourceRange,
}

impl Expression {
    /// Creates an expression.
    #[must_use]
    pub const fn new(kind: ExprKind, range: SourceRange) -> Self {
        Self { kind, range }
    }

    /// A literal with no meaningful location.
    #[must_use]
    pub fn literal(value: MarkedValue) -> Self {
        Self::new(ExprKind::Literal(value), SourceRange::default())
    }

    /// Every traversal in the expression, with its location.
    ///
    /// Object attributes are visited in key order, everything else in source order.
    #[must_use]
    pub fn traversals(&self) -> Vec<(&Traversal, &SourceRange)> {
        let mut out = Vec::new();
        self.collect_traversals(&mut out);
        out
    }

    fn collect_traversals<'a>(&'a self, out: &mut Vec<(&'a Traversal, &'a SourceRange)>) {
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Traversal(t) => out.push((t, &self.range)),
            ExprKind::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(expr) = part {
                        expr.collect_traversals(out);
                    }
                }
            }
            ExprKind::Call { args, .. } | ExprKind::List(args) => {
                for arg in args {
                    arg.collect_traversals(out);
                }
            }
            ExprKind::Object(attrs) => {
                for expr in attrs.values() {
                    expr.collect_traversals(out);
                }
            }
        }
    }

    /// Returns true if the expression refers to nothing.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.traversals().is_empty()
    }

    /// Every reference the expression makes, found without evaluating it.
    ///
    /// Traversals that do not name a valid object come back as `Err` with
    /// the reason.
    #[must_use]
    pub fn references(&self) -> Vec<(Result<Reference, String>, &SourceRange)> {
        self.traversals()
            .into_iter()
            .map(|(traversal, range)| (Reference::parse(traversal).map(|(r, _)| r), range))
            .collect()
    }
}

/// What a traversal names, resolved from its leading steps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    /// `var.NAME`
    Variable(String),
    /// `local.NAME`
    Local(String),
    /// `count.index`
    CountIndex,
    /// `module.CALL.OUTPUT`
    ModuleOutput {
        /// Module call name.
        call: String,
        /// Output name.
        output: String,
    },
    /// `TYPE.NAME` or `TYPE.NAME[i]`
    Resource {
        /// Resource type.
        resource_type: String,
        /// Resource name.
        name: String,
        /// Instance index, if given.
        index: Option<usize>,
    },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "var.{name}"),
            Self::Local(name) => write!(f, "local.{name}"),
            Self::CountIndex => write!(f, "count.index"),
            Self::ModuleOutput { call, output } => write!(f, "module.{call}.{output}"),
            Self::Resource {
                resource_type,
                name,
                index,
            } => {
                write!(f, "{resource_type}.{name}")?;
                if let Some(i) = index {
                    write!(f, "[{i}]")?;
                }
                Ok(())
            }
        }
    }
}

impl Reference {
    /// Resolves the leading steps of `traversal`.
    ///
    /// Returns the reference and the number of steps it consumed; the
    /// remaining steps index into the referenced value.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the traversal is too short or
    /// uses a reserved prefix incorrectly.
    pub fn parse(traversal: &Traversal) -> Result<(Self, usize), String> {
        let attr = |i: usize| match traversal.steps.get(i) {
            Some(Step::Attr(name)) => Some(name.clone()),
            _ => None,
        };
        match traversal.root.as_str() {
            "var" => attr(0)
                .map(|n| (Self::Variable(n), 1))
                .ok_or_else(|| "The \"var\" object must be followed by an attribute name.".to_string()),
            "local" => attr(0)
                .map(|n| (Self::Local(n), 1))
                .ok_or_else(|| "The \"local\" object must be followed by an attribute name.".to_string()),
            "count" => match attr(0).as_deref() {
                Some("index") => Ok((Self::CountIndex, 1)),
                _ => Err("The \"count\" object only has the attribute \"index\".".to_string()),
            },
            "module" => match (attr(0), attr(1)) {
                (Some(call), Some(output)) => Ok((Self::ModuleOutput { call, output }, 2)),
                _ => Err(
                    "A module reference must name both the module call and one of its outputs."
                        .to_string(),
                ),
            },
            resource_type => {
                let name = attr(0).ok_or_else(|| {
                    format!(
                        "A reference to a resource type must be followed by at least one attribute access, specifying the resource name; \"{resource_type}\" alone is not valid."
                    )
                })?;
                match traversal.steps.get(1) {
                    Some(Step::Index(i)) => Ok((
                        Self::Resource {
                            resource_type: resource_type.to_string(),
                            name,
                            index: Some(*i),
                        },
                        2,
                    )),
                    _ => Ok((
                        Self::Resource {
                            resource_type: resource_type.to_string(),
                            name,
                            index: None,
                        },
                        1,
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn traversal(root: &str, steps: Vec<Step>) -> Traversal {
        Traversal {
            root: root.to_string(),
            steps,
        }
    }

    #[test]
    fn test_parse_references() {
        let t = traversal("var", vec![Step::Attr("region".into())]);
        assert_eq!(Reference::parse(&t).unwrap(), (Reference::Variable("region".into()), 1));

        let t = traversal(
            "null_resource",
            vec![Step::Attr("a".into()), Step::Index(1), Step::Attr("id".into())],
        );
        let (reference, consumed) = Reference::parse(&t).unwrap();
        assert_eq!(reference.to_string(), "null_resource.a[1]");
        assert_eq!(consumed, 2);

        let t = traversal(
            "module",
            vec![Step::Attr("net".into()), Step::Attr("cidr".into())],
        );
        assert_eq!(Reference::parse(&t).unwrap().0.to_string(), "module.net.cidr");
    }

    #[test]
    fn test_parse_rejects_bare_roots() {
        assert!(Reference::parse(&traversal("var", vec![])).is_err());
        assert!(Reference::parse(&traversal("null_resource", vec![])).is_err());
        assert!(Reference::parse(&traversal("count", vec![Step::Attr("x".into())])).is_err());
    }

    #[test]
    fn test_traversals_are_collected_in_order() {
        let range = SourceRange::default();
        let a = Expression::new(
            ExprKind::Traversal(traversal("var", vec![Step::Attr("a".into())])),
            range.clone(),
        );
        let b = Expression::new(
            ExprKind::Traversal(traversal("local", vec![Step::Attr("b".into())])),
            range.clone(),
        );
        let call = Expression::new(
            ExprKind::Call {
                name: "join".into(),
                args: vec![a, b],
            },
            range,
        );
        let names: Vec<String> = call.traversals().iter().map(|(t, _)| t.to_string()).collect();
        assert_eq!(names, vec!["var.a", "local.b"]);
        assert!(!call.is_static());
    }
}
