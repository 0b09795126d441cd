//! Graph walks.
//!
//! A [`Walker`] visits every node of a graph after its dependencies, with
//! bounded concurrency. What a visit does depends on the visitor: the
//! [`PlanVisitor`] computes changes, the [`ApplyVisitor`] carries them out,
//! and the [`RefreshVisitor`] reads recorded objects back. All three share
//! a [`WalkContext`].

mod apply;
mod context;
mod plan;
mod refresh;
mod walker;

pub use apply::ApplyVisitor;
pub(crate) use apply::retain_configured_outputs;
pub use context::{Refreshed, WalkContext};
pub use plan::PlanVisitor;
pub use refresh::RefreshVisitor;
pub use walker::{NodeState, NodeVisitor, WalkReport, Walker, DEFAULT_PARALLELISM};
