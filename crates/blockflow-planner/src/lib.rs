#![forbid(unsafe_code)]
//! blockflow-planner: building, rewriting, and describing planner graphs.
//!
//! - `builder::Plan` wraps a `PNode` with one method per operator kind.
//! - `dsl::yaml` turns a YAML plan document into a graph; nodes are named so
//!   one sub-plan can feed several consumers.
//! - `rules::optimize` applies identity-preserving rewrites.
//! - `explain` renders a graph with tags, types, and lengths.
//!
//! Nothing here executes a plan.

pub mod builder;
pub mod dsl;
pub mod error;
pub mod explain;
pub mod rules;

pub use builder::Plan;
pub use dsl::yaml::{parse_yaml_plan, ConfigOverrides, PlanDocument, PlanEnv, TableDecl};
pub use error::{PlanError, Result};
pub use explain::explain;
pub use rules::optimize;
