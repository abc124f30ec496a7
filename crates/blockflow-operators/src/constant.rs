//! Constant: one column repeating a single value.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_core::types::Value;

use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, param_count, ExecStatus, Operator, OperatorSpec};

#[derive(Debug, Clone)]
pub struct Constant {
    value: Value,
    length: u64,
    produced: u64,
}

impl Constant {
    pub fn new(value: Value, length: u64) -> Self {
        Self {
            value,
            length,
            produced: 0,
        }
    }

    pub fn make_planner_node(value: Value, length: u64) -> Result<PNode> {
        let mut params = BTreeMap::new();
        params.insert("value".to_string(), value);
        let length = i64::try_from(length)
            .map_err(|_| Error::MalformedPlan(format!("constant: length {} too large", length)))?;
        params.insert("length".to_string(), Value::Integer(length));
        PlannerNode::make_shared(NodeKind::Constant, params, BTreeMap::new(), vec![])
    }
}

impl Operator for Constant {
    fn kind(&self) -> NodeKind {
        NodeKind::Constant
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(Constant::new(self.value.clone(), self.length))
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        if self.produced >= self.length {
            return Ok(ExecStatus::Finished);
        }
        let n = (ctx.block_size() as u64).min(self.length - self.produced) as usize;
        let mut out = ctx.get_output_buffer();
        out.resize(1, 0);
        out.column_mut(0).resize(n, self.value.clone());
        out.resize(1, n);
        ctx.emit(out);
        self.produced += n as u64;
        Ok(if self.produced >= self.length {
            ExecStatus::Finished
        } else {
            ExecStatus::Yielded
        })
    }
}

impl OperatorSpec for Constant {
    const KIND: NodeKind = NodeKind::Constant;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        Ok(Constant::new(
            node.param("value")?.clone(),
            param_count(node, "length")?,
        ))
    }

    fn infer_type(node: &PNode, _inf: &mut Inference) -> Result<Vec<TypeTag>> {
        Ok(vec![node.param("value")?.type_tag()])
    }

    fn infer_length(node: &PNode, _inf: &mut Inference) -> Result<Option<u64>> {
        Ok(Some(param_count(node, "length")?))
    }

    fn repr(node: &PNode, _tagger: &mut NodeTagger) -> String {
        match (node.param_opt("value"), node.param_opt("length")) {
            (Some(v), Some(l)) => format!("Constant({}x{})", v, l),
            _ => "Constant(?)".to_string(),
        }
    }
}
