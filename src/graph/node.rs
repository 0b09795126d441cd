//! Graph nodes.

use crate::addrs::{ModulePath, ResourceAddress};
use crate::config::{Import, Output, ProviderConfig, Resource, Variable};
use crate::eval::Expression;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Dense index of a node in a [`Graph`](super::Graph).
pub type NodeId = usize;

/// Unique, ordered identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// A module input variable.
    Variable(ModulePath, String),
    /// A module local value.
    Local(ModulePath, String),
    /// A module output.
    Output(ModulePath, String),
    /// A provider configuration.
    Provider(String),
    /// A configured resource instance.
    Resource(ResourceAddress),
    /// A resource instance that only exists in state.
    Orphan(ResourceAddress),
}

impl NodeKey {
    const fn rank(&self) -> u8 {
        match self {
            Self::Provider(_) => 0,
            Self::Variable(..) => 1,
            Self::Local(..) => 2,
            Self::Resource(_) => 3,
            Self::Orphan(_) => 4,
            Self::Output(..) => 5,
        }
    }

    /// The resource address, for resource and orphan nodes.
    #[must_use]
    pub const fn address(&self) -> Option<&ResourceAddress> {
        match self {
            Self::Resource(address) | Self::Orphan(address) => Some(address),
            _ => None,
        }
    }
}

impl Ord for NodeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Self::Variable(ma, a), Self::Variable(mb, b))
            | (Self::Local(ma, a), Self::Local(mb, b))
            | (Self::Output(ma, a), Self::Output(mb, b)) => (ma, a).cmp(&(mb, b)),
            (Self::Provider(a), Self::Provider(b)) => a.cmp(b),
            (Self::Resource(a), Self::Resource(b)) | (Self::Orphan(a), Self::Orphan(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for NodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(module, name) => write!(f, "{}var.{name}", module.prefix()),
            Self::Local(module, name) => write!(f, "{}local.{name}", module.prefix()),
            Self::Output(module, name) => write!(f, "{}output.{name}", module.prefix()),
            Self::Provider(name) => write!(f, "provider.{name}"),
            Self::Resource(address) => write!(f, "{address}"),
            Self::Orphan(address) => write!(f, "{address} (orphan)"),
        }
    }
}

/// What a node does when visited.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Publishes a variable value. Root variables are resolved before the
    /// walk; module inputs are evaluated in the calling module.
    Variable {
        /// Declaration.
        variable: Variable,
        /// Input expression from the module call, if any.
        input: Option<Expression>,
    },
    /// Evaluates a local value.
    Local {
        /// The expression.
        expr: Expression,
    },
    /// Evaluates an output.
    Output {
        /// Declaration.
        output: Output,
    },
    /// Configures a provider.
    Provider {
        /// Configuration block, or an implicit empty one.
        config: ProviderConfig,
    },
    /// Plans or applies one configured resource instance.
    Resource {
        /// The resource block.
        resource: Arc<Resource>,
        /// The import block targeting this instance.
        import: Option<Import>,
        /// Identifier from the import block, evaluated before the walk.
        import_id: Option<String>,
        /// Resource instances this one references, directly or through values.
        dependencies: Vec<ResourceAddress>,
    },
    /// Handles an instance that exists only in state.
    Orphan {
        /// Provider recorded for the instance.
        provider: String,
        /// The resource block still in configuration, in destroy mode.
        resource: Option<Arc<Resource>>,
    },
}

/// A node: identity plus behavior.
#[derive(Debug, Clone)]
pub struct Node {
    /// Identity.
    pub key: NodeKey,
    /// Behavior.
    pub kind: NodeKind,
}

impl Node {
    /// Module the node evaluates in.
    #[must_use]
    pub fn module(&self) -> ModulePath {
        match &self.key {
            NodeKey::Variable(m, _) | NodeKey::Local(m, _) | NodeKey::Output(m, _) => m.clone(),
            NodeKey::Resource(a) | NodeKey::Orphan(a) => a.module.clone(),
            NodeKey::Provider(_) => ModulePath::root(),
        }
    }

    /// Short label of the node type, for logs and DOT output.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self.kind {
            NodeKind::Variable { .. } => "variable",
            NodeKind::Local { .. } => "local",
            NodeKind::Output { .. } => "output",
            NodeKind::Provider { .. } => "provider",
            NodeKind::Resource { .. } => "resource",
            NodeKind::Orphan { .. } => "orphan",
        }
    }
}
