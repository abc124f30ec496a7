//! Union: places the columns of all inputs side by side, row-aligned.
//!
//! Inputs may deliver blocks of different sizes, so each input keeps its own
//! carried block and cursor between `execute` calls.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_mem::PooledBlock;

use crate::carry::Carry;
use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

#[derive(Debug)]
pub struct Union {
    num_inputs: usize,
    carries: Vec<Carry>,
}

impl Union {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            num_inputs,
            carries: (0..num_inputs).map(|_| Carry::default()).collect(),
        }
    }

    pub fn make_planner_node(inputs: Vec<PNode>) -> Result<PNode> {
        PlannerNode::make_shared(NodeKind::Union, BTreeMap::new(), BTreeMap::new(), inputs)
    }
}

impl Operator for Union {
    fn kind(&self) -> NodeKind {
        NodeKind::Union
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(Union::new(self.num_inputs))
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        let block_size = ctx.block_size();
        let mut out: Option<PooledBlock> = None;
        let mut filled = 0;

        while filled < block_size {
            let mut live = 0;
            for (i, carry) in self.carries.iter_mut().enumerate() {
                if carry.refill(ctx, i)? {
                    live += 1;
                }
            }
            if live == 0 {
                break;
            }
            if live < self.num_inputs {
                let lengths: Vec<&str> = self
                    .carries
                    .iter()
                    .map(|c| if c.is_exhausted() { "done" } else { "more" })
                    .collect();
                return Err(Error::Invariant(format!(
                    "union: inputs have different lengths ({})",
                    lengths.join(",")
                )));
            }

            let take = self
                .carries
                .iter()
                .map(Carry::remaining)
                .min()
                .unwrap_or(0)
                .min(block_size - filled);

            let out = out.get_or_insert_with(|| {
                let columns = self
                    .carries
                    .iter()
                    .filter_map(Carry::block)
                    .map(|b| b.num_columns())
                    .sum();
                let mut b = ctx.get_output_buffer();
                b.resize(columns, block_size);
                b
            });

            let mut col = 0;
            for carry in &mut self.carries {
                if let Some(src) = carry.block() {
                    out.copy_range_from(filled, col, src, carry.cursor(), take);
                    col += src.num_columns();
                }
                carry.advance(take);
            }
            filled += take;
        }

        if let Some(mut out) = out {
            out.truncate(filled);
            ctx.emit(out);
        }
        Ok(if filled < block_size {
            ExecStatus::Finished
        } else {
            ExecStatus::Yielded
        })
    }
}

impl OperatorSpec for Union {
    const KIND: NodeKind = NodeKind::Union;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        if node.inputs.is_empty() {
            return Err(Error::MalformedPlan("union with no inputs".into()));
        }
        Ok(Union::new(node.inputs.len()))
    }

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        Ok(inf.input_types(node)?.concat())
    }

    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        let lengths = inf.input_lengths(node)?;
        let known: Vec<u64> = lengths.iter().flatten().copied().collect();
        if let Some(first) = known.first() {
            if known.iter().any(|l| l != first) {
                return Err(Error::MalformedPlan(format!(
                    "union: inputs have different lengths {:?}",
                    known
                )));
            }
        }
        if known.len() == lengths.len() {
            Ok(known.first().copied())
        } else {
            Ok(None)
        }
    }

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        let tags: Vec<String> = node.inputs.iter().map(|i| tagger.tag(i)).collect();
        format!("Union({})", tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{ints, MockContext};
    use crate::range::Range;
    use blockflow_core::types::Value;

    #[test]
    fn aligns_blocks_of_different_sizes() {
        let mut ctx = MockContext::new(
            4,
            vec![
                vec![ints(0..2), ints(2..3), ints(3..6)],
                vec![ints(10..15), ints(15..16)],
            ],
        );
        ctx.run(&mut Union::new(2)).unwrap();
        let rows = ctx.rows();
        assert_eq!(rows.len(), 6);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row[0], Value::Integer(i as i64));
            assert_eq!(row[1], Value::Integer(10 + i as i64));
        }
        let sizes: Vec<usize> = ctx.emitted.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![4, 2]);
    }

    #[test]
    fn runtime_length_mismatch_fails() {
        let mut ctx = MockContext::new(4, vec![vec![ints(0..3)], vec![ints(0..2)]]);
        assert!(matches!(
            ctx.run(&mut Union::new(2)),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn length_inference() {
        let a = Range::make_planner_node(0, 4).unwrap();
        let b = Range::make_planner_node(4, 8).unwrap();
        let ok = Union::make_planner_node(vec![a.clone(), b]).unwrap();
        assert_eq!(
            Union::infer_length(&ok, &mut Inference::new()).unwrap(),
            Some(4)
        );
        assert_eq!(
            Union::infer_type(&ok, &mut Inference::new()).unwrap(),
            vec![TypeTag::Integer, TypeTag::Integer]
        );
        let short = Range::make_planner_node(0, 1).unwrap();
        let bad = Union::make_planner_node(vec![a, short]).unwrap();
        assert!(matches!(
            Union::infer_length(&bad, &mut Inference::new()),
            Err(Error::MalformedPlan(_))
        ));
    }
}
