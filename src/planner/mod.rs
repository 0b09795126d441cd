//! Planning: change records, the diff engine, and plan files.

mod change;
mod diff;
mod plan;
mod planfile;

pub use change::{Action, ChangeReason, ChangeRecord};
pub use diff::DiffEngine;
pub use plan::{Plan, PlanMode, PlanSummary, PLAN_FORMAT_VERSION};
pub use planfile::{is_plan_file, load_plan, save_plan};
