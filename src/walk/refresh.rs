//! The refresh walk: bring state in line with reality.

use super::context::WalkContext;
use super::walker::NodeVisitor;
use crate::graph::{Node, NodeKind};
use crate::value::Diagnostics;
use async_trait::async_trait;

/// Reads every recorded object and reconciles it into the working state.
///
/// Configuration is never evaluated beyond what providers need.
pub struct RefreshVisitor {
    ctx: WalkContext,
}

impl RefreshVisitor {
    /// Creates a visitor.
    #[must_use]
    pub const fn new(ctx: WalkContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl NodeVisitor for RefreshVisitor {
    async fn visit(&self, node: &Node) -> Diagnostics {
        let (NodeKind::Orphan { .. }, Some(address)) = (&node.kind, node.key.address()) else {
            return self.ctx.visit_common(node).await.unwrap_or_default();
        };
        let Some(prior) = self.ctx.working.get(address) else {
            return Diagnostics::new();
        };
        match self.ctx.refresh_into_working(prior).await {
            Ok((_, Some(drift))) => Diagnostics::from(drift),
            Ok((_, None)) => Diagnostics::new(),
            Err(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::graph::GraphMode;
    use crate::state::{Operation, ResourceRecord, State};
    use crate::value::{DiagnosticKind, MarkedValue};
    use crate::walk::tests::{build, fixture, walk};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_refresh_drops_deleted_objects() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("kept.txt");
        std::fs::write(&kept, "hello").unwrap();
        let missing = dir.path().join("missing.txt");

        let record = |name: &str, path: &std::path::Path, content: &str| {
            ResourceRecord::new(
                crate::addrs::ResourceAddress::new("local_file", name),
                "local",
                &MarkedValue::object_from([
                    ("filename", MarkedValue::string(path.display().to_string())),
                    ("content", MarkedValue::string(content)),
                    ("id", MarkedValue::string("x")),
                ]),
            )
        };
        let mut state = State::new();
        state.set(record("kept", &kept, "hello"));
        state.set(record("missing", &missing, "bye"));

        let ctx = fixture("resources: []", state);
        let graph = build(&ctx, GraphMode::Refresh);
        let report = walk(graph, Arc::new(RefreshVisitor::new(ctx.clone()))).await;
        assert!(!report.diagnostics.has_errors(), "{:?}", report.diagnostics);

        let state = ctx.working.commit(Operation::Refresh, None);
        assert_eq!(state.resources.len(), 1);
        let deleted: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Drift)
            .map(|d| d.summary.as_str())
            .collect();
        assert!(deleted.contains(&"Object has been deleted outside of Strata"));
    }
}
