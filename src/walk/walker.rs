//! Concurrent, dependency-ordered graph traversal.

use crate::graph::{Graph, Node, NodeId, NodeKey};
use crate::value::{Diagnostic, DiagnosticKind, Diagnostics};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of nodes visited at once.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Waiting for dependencies.
    Pending,
    /// Being visited.
    Evaluating,
    /// Visited without errors.
    Succeeded,
    /// Visited with at least one error.
    Failed,
    /// Not visited because a dependency did not succeed.
    Skipped,
    /// Not visited because the walk was cancelled.
    Cancelled,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Evaluating => "evaluating",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Does the work of one walk, one node at a time.
///
/// A visit is atomic from the walker's point of view. Any error diagnostic
/// in the result fails the node.
#[async_trait]
pub trait NodeVisitor: Send + Sync + 'static {
    /// Visits `node`. All of its dependencies have succeeded.
    async fn visit(&self, node: &Node) -> Diagnostics;
}

/// Outcome of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Diagnostics from every node, grouped by address.
    pub diagnostics: Diagnostics,
    /// Terminal state of every node.
    pub states: BTreeMap<NodeKey, NodeState>,
}

impl WalkReport {
    /// Number of nodes in `state`.
    #[must_use]
    pub fn count(&self, state: NodeState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    /// State of one node.
    #[must_use]
    pub fn state_of(&self, key: &NodeKey) -> Option<NodeState> {
        self.states.get(key).copied()
    }

    /// True if every node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.states.values().all(|s| *s == NodeState::Succeeded)
    }

    /// True if the walk stopped early.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.count(NodeState::Cancelled) > 0
    }
}

/// Walks a graph with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct Walker {
    parallelism: usize,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl Walker {
    /// Creates a walker visiting at most `parallelism` nodes at once.
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    /// Visits every node after all of its dependencies.
    ///
    /// A node whose dependency failed or was skipped is skipped in turn;
    /// independent parts of the graph carry on. Once `cancel` fires no new
    /// visit starts, visits in flight finish, and every node left is
    /// reported cancelled.
    pub async fn walk<V: NodeVisitor>(
        &self,
        graph: Arc<Graph>,
        visitor: Arc<V>,
        cancel: &CancellationToken,
    ) -> WalkReport {
        let n = graph.len();
        info!("Walking {n} nodes (parallelism {})", self.parallelism);

        let mut states = vec![NodeState::Pending; n];
        let mut remaining: Vec<usize> = (0..n).map(|id| graph.dependencies(id).len()).collect();
        let mut ready: VecDeque<NodeId> = (0..n).filter(|&id| remaining[id] == 0).collect();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, NodeId> = HashMap::new();
        let mut diags = Diagnostics::new();

        loop {
            while !cancel.is_cancelled() {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                let key = graph.node(id).key.to_string();
                let blocked = graph
                    .dependencies(id)
                    .into_iter()
                    .any(|dep| states[dep] != NodeState::Succeeded);
                if blocked {
                    warn!("Skipping {key} due to failed dependencies");
                    states[id] = NodeState::Skipped;
                    diags.push(
                        Diagnostic::warning(
                            DiagnosticKind::Skipped,
                            "Node skipped",
                            "skipped because dependency failed",
                        )
                        .for_address(key),
                    );
                    release(&graph, id, &mut remaining, &mut ready);
                    continue;
                }

                states[id] = NodeState::Evaluating;
                let graph = Arc::clone(&graph);
                let visitor = Arc::clone(&visitor);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let handle = tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (NodeState::Cancelled, Diagnostics::new());
                    };
                    if cancel.is_cancelled() {
                        return (NodeState::Cancelled, Diagnostics::new());
                    }
                    let node = graph.node(id);
                    debug!("Visiting {}", node.key);
                    let diags = visitor.visit(node).await.for_address(&node.key.to_string());
                    let state = if diags.has_errors() {
                        NodeState::Failed
                    } else {
                        NodeState::Succeeded
                    };
                    (state, diags)
                });
                running.insert(handle.id(), id);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let (id, state, node_diags) = match joined {
                Ok((task, (state, node_diags))) => (running.remove(&task), state, node_diags),
                Err(err) => {
                    let id = running.remove(&err.id());
                    let key = id.map(|id| graph.node(id).key.to_string()).unwrap_or_default();
                    let diag = Diagnostic::error(
                        DiagnosticKind::Evaluation,
                        "Node evaluation aborted",
                        format!("The visit of {key} did not complete: {err}"),
                    )
                    .for_address(key);
                    (id, NodeState::Failed, Diagnostics::from(diag))
                }
            };
            let Some(id) = id else {
                continue;
            };
            debug!("{} {state}", graph.node(id).key);
            states[id] = state;
            diags.extend(node_diags);
            if state != NodeState::Cancelled {
                release(&graph, id, &mut remaining, &mut ready);
            }
        }

        let mut cancelled = 0;
        for state in &mut states {
            if matches!(state, NodeState::Pending | NodeState::Evaluating | NodeState::Cancelled) {
                *state = NodeState::Cancelled;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            warn!("Walk cancelled with {cancelled} nodes not visited");
            diags.push(Diagnostic::warning(
                DiagnosticKind::Cancelled,
                "Operation cancelled",
                format!("{cancelled} node(s) were not visited because the operation was cancelled."),
            ));
        }
        diags.sort_by_address();

        let states = graph
            .nodes()
            .map(|(id, node)| (node.key.clone(), states[id]))
            .collect();
        WalkReport {
            diagnostics: diags,
            states,
        }
    }
}

fn release(graph: &Graph, id: NodeId, remaining: &mut [usize], ready: &mut VecDeque<NodeId>) {
    for next in graph.dependents(id) {
        remaining[next] -= 1;
        if remaining[next] == 0 {
            ready.push_back(next);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::addrs::ResourceAddress;
    use crate::graph::NodeKind;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key(name: &str) -> NodeKey {
        NodeKey::Orphan(ResourceAddress::new("null_resource", name))
    }

    fn graph(names: &[&str], edges: &[(&str, &str)]) -> Arc<Graph> {
        let nodes: BTreeMap<NodeKey, NodeKind> = names
            .iter()
            .map(|n| {
                (
                    key(n),
                    NodeKind::Orphan {
                        provider: "null".to_string(),
                        resource: None,
                    },
                )
            })
            .collect();
        Arc::new(Graph::from_parts(nodes, edges.iter().map(|(a, b)| (key(a), key(b)))))
    }

    #[derive(Default)]
    struct Recorder {
        order: Mutex<Vec<String>>,
        fail: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_ms: u64,
        cancel_after: Option<(String, CancellationToken)>,
    }

    #[async_trait]
    impl NodeVisitor for Recorder {
        async fn visit(&self, node: &Node) -> Diagnostics {
            let name = node.key.address().unwrap().name.clone();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.order.lock().push(name.clone());
            if let Some((trigger, token)) = &self.cancel_after
                && *trigger == name
            {
                token.cancel();
            }
            if self.fail.contains(&name) {
                Diagnostics::from(Diagnostic::error(DiagnosticKind::ProviderAction, "boom", "failed"))
            } else {
                Diagnostics::new()
            }
        }
    }

    #[tokio::test]
    async fn test_dependencies_first() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let visitor = Arc::new(Recorder::default());
        let report = Walker::default()
            .walk(g, Arc::clone(&visitor), &CancellationToken::new())
            .await;
        assert!(report.is_success());
        assert_eq!(*visitor.order.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        // a -> b -> c, and an independent d.
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
        let visitor = Arc::new(Recorder {
            fail: vec!["a".to_string()],
            ..Recorder::default()
        });
        let report = Walker::default()
            .walk(g, Arc::clone(&visitor), &CancellationToken::new())
            .await;

        assert_eq!(report.state_of(&key("a")), Some(NodeState::Failed));
        assert_eq!(report.state_of(&key("b")), Some(NodeState::Skipped));
        assert_eq!(report.state_of(&key("c")), Some(NodeState::Skipped));
        assert_eq!(report.state_of(&key("d")), Some(NodeState::Succeeded));
        let skipped: Vec<&Diagnostic> = report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Skipped)
            .collect();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].detail, "skipped because dependency failed");
        assert_eq!(report.diagnostics.error_count(), 1);
    }

    #[tokio::test]
    async fn test_parallelism_bound() {
        let names: Vec<String> = (0..12).map(|i| format!("n{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let g = graph(&refs, &[]);
        let visitor = Arc::new(Recorder {
            delay_ms: 20,
            ..Recorder::default()
        });
        let report = Walker::new(3)
            .walk(g, Arc::clone(&visitor), &CancellationToken::new())
            .await;
        assert!(report.is_success());
        assert!(visitor.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(visitor.order.lock().len(), 12);
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_visits() {
        let token = CancellationToken::new();
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let visitor = Arc::new(Recorder {
            cancel_after: Some(("a".to_string(), token.clone())),
            ..Recorder::default()
        });
        let report = Walker::default().walk(g, Arc::clone(&visitor), &token).await;

        assert_eq!(*visitor.order.lock(), vec!["a"]);
        assert_eq!(report.state_of(&key("a")), Some(NodeState::Succeeded));
        assert_eq!(report.count(NodeState::Cancelled), 2);
        assert!(report.was_cancelled());
        let cancelled: Vec<&Diagnostic> = report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Cancelled)
            .collect();
        assert_eq!(cancelled.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let report = Walker::new(0)
            .walk(graph(&[], &[]), Arc::new(Recorder::default()), &CancellationToken::new())
            .await;
        assert!(report.is_success());
        assert!(report.states.is_empty());
    }
}
