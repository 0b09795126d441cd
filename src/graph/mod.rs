//! Dependency graph.
//!
//! The graph wraps a `petgraph` [`DiGraph`]. Nodes are never removed, so a
//! node's [`NodeId`] is its dense petgraph index. An edge `a -> b` means `a`
//! must finish before `b` starts. Nodes are inserted in key order and
//! neighbour lists are returned sorted, so ids and every traversal are
//! independent of the order blocks were declared in.

mod builder;
mod cycle;
mod node;

pub use builder::{GraphBuilder, GraphMode};
pub use cycle::find_cycles;
pub use node::{Node, NodeId, NodeKey, NodeKind};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;

/// A directed acyclic graph of nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: DiGraph<Node, ()>,
    index: BTreeMap<NodeKey, NodeId>,
}

impl Graph {
    /// Builds a graph from nodes and `(before, after)` key pairs.
    ///
    /// Edges naming unknown keys are dropped; repeated edges collapse.
    #[must_use]
    pub fn from_parts(
        nodes: BTreeMap<NodeKey, NodeKind>,
        edges: impl IntoIterator<Item = (NodeKey, NodeKey)>,
    ) -> Self {
        let mut graph = Self::default();
        for (key, kind) in nodes {
            let id = graph.inner.add_node(Node { key: key.clone(), kind });
            graph.index.insert(key, id.index());
        }
        for (from, to) in edges {
            if let (Some(&a), Some(&b)) = (graph.index.get(&from), graph.index.get(&to)) {
                graph.inner.update_edge(NodeIndex::new(a), NodeIndex::new(b), ());
            }
        }
        graph
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    /// True if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// The node with id `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.inner[NodeIndex::new(id)]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.inner[NodeIndex::new(id)]
    }

    /// Looks up a node id by key.
    #[must_use]
    pub fn id_of(&self, key: &NodeKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// All nodes with their ids, in key order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.inner.node_indices().map(|id| (id.index(), &self.inner[id]))
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .inner
            .neighbors_directed(NodeIndex::new(id), direction)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out
    }

    /// Nodes that must finish before `id` starts, sorted.
    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Nodes waiting on `id`, sorted.
    #[must_use]
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// True if `from -> to` is an edge.
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.inner.contains_edge(NodeIndex::new(from), NodeIndex::new(to))
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Strongly connected components, each sorted, in order of their first node.
    #[must_use]
    pub fn strongly_connected(&self) -> Vec<Vec<NodeId>> {
        let mut components: Vec<Vec<NodeId>> = tarjan_scc(&self.inner)
            .into_iter()
            .map(|component| {
                let mut ids: Vec<NodeId> = component.into_iter().map(NodeIndex::index).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        components.sort();
        components
    }

    /// Every edge as a sorted `(before, after)` pair of rendered keys.
    ///
    /// Two graphs with the same signature are isomorphic under their keys.
    #[must_use]
    pub fn signature(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .inner
            .edge_references()
            .map(|edge| {
                (
                    self.inner[edge.source()].key.to_string(),
                    self.inner[edge.target()].key.to_string(),
                )
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Level of each node, by id: one more than the deepest of its
    /// dependencies. Nodes on a cycle, and nodes after one, get `usize::MAX`.
    #[must_use]
    pub fn level_of(&self) -> Vec<usize> {
        let mut level = vec![usize::MAX; self.len()];
        // tarjan_scc yields components in reverse topological order.
        for component in tarjan_scc(&self.inner).into_iter().rev() {
            let &[id] = component.as_slice() else {
                continue;
            };
            if self.inner.contains_edge(id, id) {
                continue;
            }
            let mut depth = 0;
            for dep in self.inner.neighbors_directed(id, Direction::Incoming) {
                depth = match level[dep.index()] {
                    usize::MAX => usize::MAX,
                    d => depth.max(d + 1),
                };
                if depth == usize::MAX {
                    break;
                }
            }
            level[id.index()] = depth;
        }
        level
    }

    /// Groups nodes by level. Nodes on a cycle are left out.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<NodeId>> {
        let mut levels: Vec<Vec<NodeId>> = Vec::new();
        for (id, depth) in self.level_of().into_iter().enumerate() {
            if depth == usize::MAX {
                continue;
            }
            if levels.len() <= depth {
                levels.resize_with(depth + 1, Vec::new);
            }
            levels[depth].push(id);
        }
        levels
    }

    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.inner,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, _| String::new(),
            &|_, (_, node)| {
                let shape = match node.kind {
                    NodeKind::Provider { .. } => "diamond",
                    NodeKind::Resource { .. } => "box",
                    NodeKind::Orphan { .. } => "box\" style = \"dashed",
                    _ => "note",
                };
                let label = node.key.to_string().replace('"', "\\\"");
                format!("label = \"{label}\" shape = \"{shape}\"")
            },
        );
        format!("{dot:?}")
    }
}
