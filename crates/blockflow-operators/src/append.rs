//! Append: all rows of input 0, then all rows of input 1.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::{format_types, TypeTag};
use blockflow_mem::PooledBlock;

use crate::carry::Carry;
use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

/// Resumable: each `execute` returns after emitting one full block, keeping
/// the pending input block, its row cursor, and the partial output.
#[derive(Debug, Default)]
pub struct Append {
    input: usize,
    pending: Carry,
    out: Option<PooledBlock>,
    outidx: usize,
}

impl Append {
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner node appending `right` after `left`.
    pub fn make_planner_node(left: PNode, right: PNode) -> Result<PNode> {
        PlannerNode::make_shared(
            NodeKind::Append,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![left, right],
        )
    }
}

impl Operator for Append {
    fn kind(&self) -> NodeKind {
        NodeKind::Append
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(Append::new())
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        let block_size = ctx.block_size();
        while self.input < 2 {
            if !self.pending.refill(ctx, self.input)? {
                self.input += 1;
                self.pending = Carry::default();
                continue;
            }
            let Some(src) = self.pending.block() else {
                continue;
            };
            let ncols = src.num_columns();

            let out = self.out.get_or_insert_with(|| {
                let mut b = ctx.get_output_buffer();
                b.resize(ncols, block_size);
                b
            });
            if out.num_columns() != ncols {
                return Err(Error::Invariant(format!(
                    "append: input {} has {} columns, output has {}",
                    self.input,
                    ncols,
                    out.num_columns()
                )));
            }

            let mut cursor = self.pending.cursor();
            let end = src.num_rows();
            while cursor < end && self.outidx < block_size {
                out.copy_row_from(self.outidx, src, cursor);
                cursor += 1;
                self.outidx += 1;
            }
            let copied = cursor - self.pending.cursor();
            self.pending.advance(copied);

            if self.outidx == block_size {
                if let Some(full) = self.out.take() {
                    ctx.emit(full);
                }
                self.outidx = 0;
                return Ok(ExecStatus::Yielded);
            }
        }

        if let Some(mut last) = self.out.take() {
            if self.outidx > 0 {
                last.truncate(self.outidx);
                ctx.emit(last);
            }
        }
        self.outidx = 0;
        Ok(ExecStatus::Finished)
    }
}

impl OperatorSpec for Append {
    const KIND: NodeKind = NodeKind::Append;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        if node.inputs.len() != 2 {
            return Err(Error::MalformedPlan(format!(
                "append: expected 2 inputs, got {}",
                node.inputs.len()
            )));
        }
        Ok(Append::new())
    }

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        let types = inf.input_types(node)?;
        let first = types
            .first()
            .cloned()
            .ok_or_else(|| Error::MalformedPlan("append with no input".into()))?;
        for (i, t) in types.iter().enumerate().skip(1) {
            if *t != first {
                return Err(Error::TypeMismatch(format!(
                    "append: input {} has types {}, input 0 has {}",
                    i,
                    format_types(t),
                    format_types(&first)
                )));
            }
        }
        Ok(first)
    }

    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        let mut total = 0u64;
        for len in inf.input_lengths(node)? {
            match len {
                Some(l) => {
                    total = total.checked_add(l).ok_or_else(|| {
                        Error::MalformedPlan("append: length overflows u64".into())
                    })?
                }
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        let tags: Vec<String> = node.inputs.iter().map(|i| tagger.tag(i)).collect();
        format!("Append({})", tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{ints, MockContext};
    use blockflow_core::block::RowBlock;
    use blockflow_core::types::Value;

    fn flatten(ctx: &MockContext) -> Vec<i64> {
        ctx.rows().iter().map(|r| r[0].as_int().unwrap()).collect()
    }

    #[test]
    fn concatenates_in_order() {
        let mut ctx = MockContext::new(
            4,
            vec![
                vec![ints(0..3), ints(3..5)],
                vec![ints(100..103)],
            ],
        );
        ctx.run(&mut Append::new()).unwrap();
        assert_eq!(flatten(&ctx), vec![0, 1, 2, 3, 4, 100, 101, 102]);
        let sizes: Vec<usize> = ctx.emitted.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn partial_tail_is_truncated() {
        let mut ctx = MockContext::new(3, vec![vec![ints(0..4)], vec![ints(4..5)]]);
        ctx.run(&mut Append::new()).unwrap();
        let sizes: Vec<usize> = ctx.emitted.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(flatten(&ctx), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_inputs_emit_nothing() {
        let mut ctx = MockContext::new(
            4,
            vec![vec![RowBlock::with_shape(1, 0)], vec![]],
        );
        ctx.run(&mut Append::new()).unwrap();
        assert!(ctx.emitted.is_empty());
    }

    #[test]
    fn one_block_per_call() {
        let mut ctx = MockContext::new(2, vec![vec![ints(0..5)], vec![ints(5..6)]]);
        let calls = ctx.run(&mut Append::new()).unwrap();
        // three full blocks, then the call that finishes without a tail
        assert_eq!(calls, 4);
        assert!(ctx.emitted.iter().all(|b| b.num_rows() == 2));
    }

    #[test]
    fn clone_has_no_state() {
        let mut op = Append::new();
        let mut ctx = MockContext::new(2, vec![vec![ints(0..5)], vec![]]);
        assert_eq!(op.execute(&mut ctx).unwrap(), ExecStatus::Yielded);
        let mut fresh = op.clone_operator();
        let mut ctx2 = MockContext::new(2, vec![vec![ints(7..8)], vec![]]);
        ctx2.run(fresh.as_mut()).unwrap();
        assert_eq!(ctx2.rows(), vec![vec![Value::Integer(7)]]);
    }

    #[test]
    fn mismatched_columns_fail() {
        let two_cols =
            RowBlock::from_rows(2, vec![vec![Value::Integer(1), Value::Integer(2)]]).unwrap();
        let mut ctx = MockContext::new(4, vec![vec![ints(0..1)], vec![two_cols]]);
        let err = ctx.run(&mut Append::new()).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}
