//! LogicalFilter: keeps the rows of input 0 whose mask (input 1, one
//! column) is truthy.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::{format_types, TypeTag};
use blockflow_mem::PooledBlock;

use crate::carry::Carry;
use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

const DATA: usize = 0;
const MASK: usize = 1;

#[derive(Debug, Default)]
pub struct LogicalFilter {
    data: Carry,
    mask: Carry,
    out: Option<PooledBlock>,
    outidx: usize,
}

impl LogicalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_planner_node(data: PNode, mask: PNode) -> Result<PNode> {
        PlannerNode::make_shared(
            NodeKind::LogicalFilter,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![data, mask],
        )
    }

    fn flush(&mut self, ctx: &mut dyn QueryContext) {
        if let Some(mut out) = self.out.take() {
            if self.outidx > 0 {
                out.truncate(self.outidx);
                ctx.emit(out);
            }
        }
        self.outidx = 0;
    }
}

impl Operator for LogicalFilter {
    fn kind(&self) -> NodeKind {
        NodeKind::LogicalFilter
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(LogicalFilter::new())
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        let block_size = ctx.block_size();
        loop {
            let has_data = self.data.refill(ctx, DATA)?;
            let has_mask = self.mask.refill(ctx, MASK)?;
            if has_data != has_mask {
                return Err(Error::Invariant(
                    "logical_filter: data and mask have different lengths".into(),
                ));
            }
            if !has_data {
                self.flush(ctx);
                return Ok(ExecStatus::Finished);
            }

            let (Some(data), Some(mask)) = (self.data.block(), self.mask.block()) else {
                continue;
            };
            let (dc, mc) = (self.data.cursor(), self.mask.cursor());
            let take = self.data.remaining().min(self.mask.remaining());

            let mut consumed = take;
            for k in 0..take {
                if !mask.value(mc + k, 0).is_truthy() {
                    continue;
                }
                let out = self.out.get_or_insert_with(|| {
                    let mut b = ctx.get_output_buffer();
                    b.resize(data.num_columns(), block_size);
                    b
                });
                out.copy_row_from(self.outidx, data, dc + k);
                self.outidx += 1;
                if self.outidx == block_size {
                    consumed = k + 1;
                    break;
                }
            }
            self.data.advance(consumed);
            self.mask.advance(consumed);

            if self.outidx == block_size {
                if let Some(full) = self.out.take() {
                    ctx.emit(full);
                }
                self.outidx = 0;
                return Ok(ExecStatus::Yielded);
            }
        }
    }
}

impl OperatorSpec for LogicalFilter {
    const KIND: NodeKind = NodeKind::LogicalFilter;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        Ok(LogicalFilter::new())
    }

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        let mask = inf.types(node.input(MASK)?)?;
        if mask.len() != 1 {
            return Err(Error::MalformedPlan(format!(
                "logical_filter: mask must have one column, got {}",
                format_types(&mask)
            )));
        }
        inf.types(node.input(DATA)?)
    }

    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        let data = inf.length(node.input(DATA)?)?;
        let mask = inf.length(node.input(MASK)?)?;
        if let (Some(d), Some(m)) = (data, mask) {
            if d != m {
                return Err(Error::MalformedPlan(format!(
                    "logical_filter: data has {} rows, mask has {}",
                    d, m
                )));
            }
        }
        Ok(None)
    }

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        let tags: Vec<String> = node.inputs.iter().map(|i| tagger.tag(i)).collect();
        format!("LogicalFilter({})", tags.join(","))
    }
}
