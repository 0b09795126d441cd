//! Module paths and resource instance addresses.
//!
//! Addresses render as `module.net.aws_subnet.public[1]` and parse back from
//! the same form. They order deterministically, which keeps state files,
//! plans and graph iteration stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path from the root module to a nested module call.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root module.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns true for the root module.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path of a child module called `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// The calling module, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The name of the innermost module call.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Module call names from outermost to innermost.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Prefix used when rendering addresses inside this module.
    #[must_use]
    pub fn prefix(&self) -> String {
        self.0.iter().map(|s| format!("module.{s}.")).collect()
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|s| format!("module.{s}"))
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{rendered}")
    }
}

/// Address of one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceAddress {
    /// Module containing the resource.
    pub module: ModulePath,
    /// Resource type, e.g. `null_resource`.
    pub resource_type: String,
    /// Resource name within the module.
    pub name: String,
    /// Instance index when the resource uses `count`.
    pub index: Option<usize>,
}

impl ResourceAddress {
    /// Creates a root-module address without an index.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: ModulePath::root(),
            resource_type: resource_type.into(),
            name: name.into(),
            index: None,
        }
    }

    /// Places the address in a module.
    #[must_use]
    pub fn in_module(mut self, module: ModulePath) -> Self {
        self.module = module;
        self
    }

    /// Sets the instance index.
    #[must_use]
    pub const fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }

    /// The address of the resource block this instance belongs to.
    #[must_use]
    pub fn config_address(&self) -> String {
        format!("{}{}.{}", self.module.prefix(), self.resource_type, self.name)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config_address())?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// Error returned when an address string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource address {input:?}: {reason}")]
pub struct AddressParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl FromStr for ResourceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| AddressParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split('.').collect();
        let mut module = ModulePath::root();
        let mut i = 0;
        while parts.len() - i > 2 && parts[i] == "module" {
            module = module.child(parts[i + 1]);
            i += 2;
        }
        if parts.len() - i != 2 {
            return Err(err("expected TYPE.NAME optionally preceded by module.NAME segments"));
        }
        let resource_type = parts[i];
        if resource_type == "module" {
            return Err(err("a module call is not a resource"));
        }
        let (name, index) = match parts[i + 1].split_once('[') {
            Some((name, rest)) => {
                let digits = rest
                    .strip_suffix(']')
                    .ok_or_else(|| err("unterminated instance index"))?;
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| err("instance index must be a non-negative integer"))?;
                (name, Some(index))
            }
            None => (parts[i + 1], None),
        };
        if resource_type.is_empty() || name.is_empty() {
            return Err(err("type and name must not be empty"));
        }
        if module.segments().iter().any(String::is_empty) {
            return Err(err("module names must not be empty"));
        }
        Ok(Self {
            module,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            index,
        })
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
