//! Convenient re-exports for downstream crates.

pub use crate::block::{RowBlock, RowRef};
pub use crate::config::EngineConfig;
pub use crate::dag::{
    node_key, Arity, AuxValue, NodeKind, NodeTagger, OperatorAttributes, OperatorFlags, PNode,
    PlannerNode,
};
pub use crate::error::{Error, Result};
pub use crate::id::{PipelineId, RequestId};
pub use crate::schema::{format_types, TypeTag};
pub use crate::table::MemoryTable;
pub use crate::types::{DateTime, Image, ImageFormat, Value};
