//! Range: integers `start..end`.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_core::types::Value;

use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

#[derive(Debug, Clone)]
pub struct Range {
    start: i64,
    end: i64,
    next: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            next: start,
        }
    }

    pub fn make_planner_node(start: i64, end: i64) -> Result<PNode> {
        let mut params = BTreeMap::new();
        params.insert("start".to_string(), Value::Integer(start));
        params.insert("end".to_string(), Value::Integer(end));
        PlannerNode::make_shared(NodeKind::Range, params, BTreeMap::new(), vec![])
    }

    fn bounds(node: &PNode) -> Result<(i64, i64)> {
        let start = node.param_int("start")?;
        let end = node.param_int("end")?;
        if end < start {
            return Err(Error::MalformedPlan(format!(
                "range: end {} before start {}",
                end, start
            )));
        }
        Ok((start, end))
    }
}

impl Operator for Range {
    fn kind(&self) -> NodeKind {
        NodeKind::Range
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(Range::new(self.start, self.end))
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        if self.next >= self.end {
            return Ok(ExecStatus::Finished);
        }
        let n = (ctx.block_size() as i64).min(self.end - self.next);
        let mut out = ctx.get_output_buffer();
        out.resize(1, 0);
        out.column_mut(0)
            .extend((self.next..self.next + n).map(Value::Integer));
        out.resize(1, n as usize);
        ctx.emit(out);
        self.next += n;
        Ok(if self.next >= self.end {
            ExecStatus::Finished
        } else {
            ExecStatus::Yielded
        })
    }
}

impl OperatorSpec for Range {
    const KIND: NodeKind = NodeKind::Range;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        let (start, end) = Self::bounds(node)?;
        Ok(Range::new(start, end))
    }

    fn infer_type(node: &PNode, _inf: &mut Inference) -> Result<Vec<TypeTag>> {
        Self::bounds(node)?;
        Ok(vec![TypeTag::Integer])
    }

    fn infer_length(node: &PNode, _inf: &mut Inference) -> Result<Option<u64>> {
        let (start, end) = Self::bounds(node)?;
        Ok(Some((end - start) as u64))
    }

    fn repr(node: &PNode, _tagger: &mut NodeTagger) -> String {
        match Self::bounds(node) {
            Ok((s, e)) => format!("Range({}:{})", s, e),
            Err(_) => "Range(?)".to_string(),
        }
    }
}
