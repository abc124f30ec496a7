//! Operator trait + common interfaces.
//!
//! An operator is bound to one `NodeKind`. The executor instantiates it once
//! per distinct planner node (through the registry), clones it per pipeline,
//! and calls `execute` until it reports `Finished`. Everything an operator
//! knows about the plan without running it lives in `OperatorSpec`.

use blockflow_core::dag::{NodeKind, NodeTagger, OperatorAttributes, PNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;

use crate::context::QueryContext;
use crate::infer::Inference;

/// Integer form of an unknown length, for callers that need one.
pub const UNKNOWN_LENGTH: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// More output may follow; call `execute` again.
    Yielded,
    /// Exhausted; nothing more will be emitted.
    Finished,
}

/// Runtime half of an operator.
///
/// Invariants:
/// - Every emitted block has at least one row.
/// - Rows are emitted in input order.
/// - State kept between `execute` calls is only what is needed to resume a
///   half-built output block.
pub trait Operator: Send + 'static {
    fn kind(&self) -> NodeKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn attributes(&self) -> OperatorAttributes {
        self.kind().attributes()
    }

    /// A fresh instance with the same construction parameters and no
    /// transient state.
    fn clone_operator(&self) -> Box<dyn Operator>;

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus>;
}

/// Static half of an operator, dispatched by kind through the registry.
pub trait OperatorSpec: Operator + Sized {
    const KIND: NodeKind;

    fn from_planner_node(node: &PNode) -> Result<Self>;

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>>;

    /// `None` when the length cannot be known without executing.
    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>>;

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String;
}

/// Guard used by `from_planner_node` implementations.
pub(crate) fn expect_kind(node: &PNode, kind: NodeKind) -> Result<()> {
    if node.kind != kind {
        return Err(Error::MalformedPlan(format!(
            "{} operator built from a {} node",
            kind, node.kind
        )));
    }
    Ok(())
}

/// Non-negative integer parameter.
pub(crate) fn param_count(node: &PNode, key: &str) -> Result<u64> {
    let v = node.param_int(key)?;
    u64::try_from(v).map_err(|_| {
        Error::MalformedPlan(format!("{}: parameter '{}' must be >= 0, got {}", node.kind, key, v))
    })
}
