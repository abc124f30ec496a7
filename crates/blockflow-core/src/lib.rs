#![forbid(unsafe_code)]
//! blockflow-core: the value model, row blocks, planner-node graph, config,
//! and the canonical error taxonomy shared by every other crate.
//!
//! Nothing in here executes a plan. Operators live in `blockflow-operators`,
//! the pull-based runtime in `blockflow-exec`.

pub mod block;
pub mod config;
pub mod dag;
pub mod error;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod table;
pub mod types;

/// Engine version string for diagnostics and `explain` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
