// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Hygiene - reported, fixed before release
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code
#![warn(unused_imports)]              // Unused imports
#![warn(unused_variables)]            // Unused variables

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Strata
//!
//! A declarative infrastructure engine: describe resources in YAML, then
//! plan and apply the changes that make reality match.
//!
//! ## Overview
//!
//! Strata works the way plan/apply tools do:
//!
//! - Configuration declares resources, variables, locals, outputs, and
//!   child modules, with `${...}` references between them
//! - References form a dependency graph, walked in parallel with dependents
//!   always after their dependencies
//! - Values that only exist after a resource is created flow through the
//!   plan as *unknown* and are resolved during apply
//! - Sensitive values stay marked from variable to output and are redacted
//!   on display
//!
//! ## Architecture
//!
//! 1. **Configuration**: `*.strata.yaml` files compiled into modules
//! 2. **Graph**: one node per variable, local, output, provider, and
//!    resource instance, plus orphans left in state
//! 3. **Plan**: refresh, evaluate, and diff every instance
//! 4. **Apply**: carry the plan out, then commit state once
//!
//! ## Modules
//!
//! - [`value`]: Marked values and diagnostics
//! - [`addrs`]: Module paths and resource addresses
//! - [`eval`]: Expression parsing and evaluation
//! - [`config`]: Configuration parsing and validation
//! - [`state`]: State snapshots, stores, and locking
//! - [`provider`]: Provider interface and built-in providers
//! - [`graph`]: Dependency graph construction
//! - [`planner`]: Diffs, plans, and plan files
//! - [`walk`]: Concurrent graph walks
//! - [`engine`]: Plan, apply, and refresh orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! variables:
//!   greeting:
//!     default: hello
//!
//! resources:
//!   - type: null_resource
//!     name: seed
//!     attributes:
//!       triggers:
//!         greeting: "${var.greeting}"
//!
//!   - type: local_file
//!     name: note
//!     attributes:
//!       filename: note.txt
//!       content: "${var.greeting} from ${null_resource.seed.id}"
//!
//! outputs:
//!   note_id:
//!     value: "${local_file.note.id}"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod addrs;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod state;
pub mod value;
pub mod walk;

// ============================================================================
// Re-exports
// ============================================================================

pub use addrs::{ModulePath, ResourceAddress};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, Configuration};
pub use engine::{Engine, PlanOptions, WalkOutcome};
pub use error::{Result, StrataError};
pub use graph::{Graph, GraphBuilder, GraphMode};
pub use planner::{Action, ChangeRecord, DiffEngine, Plan, PlanMode};
pub use provider::{LocalProvider, NullProvider, Provider, ProviderRegistry};
pub use state::{LocalStateStore, MemoryStateStore, State, StateStore, WorkingState};
pub use value::{Diagnostic, Diagnostics, MarkedValue};
pub use walk::Walker;
