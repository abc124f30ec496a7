#![forbid(unsafe_code)]
//! blockflow-exec: pull-based pipeline runtime.
//!
//! A validated plan becomes a `PreparedPlan`: one prototype operator per
//! distinct planner node. Each run clones the prototypes into a `Pipeline`,
//! an arena of stages wired by consumer edges, and pulls the root until it
//! is exhausted. Upstream work happens synchronously inside `get_next`.

pub mod metrics;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;

pub use metrics::{RunStats, StageStats};
pub use pipeline::Pipeline;
pub use runtime::{BlockStream, Engine, ExecError, PreparedPlan, RunOutput};
