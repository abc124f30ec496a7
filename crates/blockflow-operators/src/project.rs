//! Project: selects (and may repeat or reorder) input columns.

use std::collections::BTreeMap;

use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_core::types::Value;

use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

#[derive(Debug, Clone)]
pub struct Project {
    indices: Vec<usize>,
}

impl Project {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn make_planner_node(input: PNode, indices: &[usize]) -> Result<PNode> {
        let mut params = BTreeMap::new();
        params.insert(
            "indices".to_string(),
            Value::List(indices.iter().map(|&i| Value::Integer(i as i64)).collect()),
        );
        PlannerNode::make_shared(NodeKind::Project, params, BTreeMap::new(), vec![input])
    }

    fn indices(node: &PNode) -> Result<Vec<usize>> {
        node.param_list("indices")?
            .iter()
            .map(|v| {
                v.as_int()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| {
                        Error::MalformedPlan(format!("project: bad column index {}", v))
                    })
            })
            .collect()
    }
}

impl Operator for Project {
    fn kind(&self) -> NodeKind {
        NodeKind::Project
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        while let Some(block) = ctx.get_next(0)? {
            if block.num_rows() == 0 {
                continue;
            }
            let mut out = ctx.get_output_buffer();
            out.resize(self.indices.len(), block.num_rows());
            for (dst, &src) in self.indices.iter().enumerate() {
                if src >= block.num_columns() {
                    return Err(Error::Invariant(format!(
                        "project: column {} of a {}-column block",
                        src,
                        block.num_columns()
                    )));
                }
                out.column_mut(dst).clone_from_slice(block.column(src));
            }
            ctx.emit(out);
            return Ok(ExecStatus::Yielded);
        }
        Ok(ExecStatus::Finished)
    }
}

impl OperatorSpec for Project {
    const KIND: NodeKind = NodeKind::Project;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        Ok(Project::new(Self::indices(node)?))
    }

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        let input = inf.types(node.input(0)?)?;
        Self::indices(node)?
            .into_iter()
            .map(|i| {
                input.get(i).copied().ok_or_else(|| {
                    Error::MalformedPlan(format!(
                        "project: column {} out of range for {} input columns",
                        i,
                        input.len()
                    ))
                })
            })
            .collect()
    }

    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        inf.length(node.input(0)?)
    }

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        let cols = Self::indices(node)
            .map(|ix| {
                ix.iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_else(|_| "?".into());
        match node.inputs.first() {
            Some(input) => format!("Project({},[{}])", tagger.tag(input), cols),
            None => format!("Project([{}])", cols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::MockContext;
    use crate::range::Range;
    use blockflow_core::block::RowBlock;

    #[test]
    fn reorders_and_repeats() {
        let block = RowBlock::from_rows(
            2,
            vec![vec![Value::Integer(1), Value::Str("a".into())]],
        )
        .unwrap();
        let mut ctx = MockContext::new(8, vec![vec![RowBlock::with_shape(2, 0), block]]);
        ctx.run(&mut Project::new(vec![1, 0, 1])).unwrap();
        assert_eq!(
            ctx.rows(),
            vec![vec![
                Value::Str("a".into()),
                Value::Integer(1),
                Value::Str("a".into())
            ]]
        );
    }

    #[test]
    fn out_of_range_index_fails_inference() {
        let node = Project::make_planner_node(Range::make_planner_node(0, 3).unwrap(), &[1])
            .unwrap();
        assert!(matches!(
            Project::infer_type(&node, &mut Inference::new()),
            Err(Error::MalformedPlan(_))
        ));
    }
}
