//! Fluent construction of planner graphs.
//!
//! `Plan` is a cheap handle on a shared node. Cloning it and using the clone
//! in two places yields one node with two consumers.

use std::sync::Arc;

use blockflow_core::dag::PNode;
use blockflow_core::error::Result;
use blockflow_core::schema::TypeTag;
use blockflow_core::table::MemoryTable;
use blockflow_core::types::Value;
use blockflow_lambda::LambdaClient;
use blockflow_operators::{
    Append, Constant, LambdaTransform, LogicalFilter, Project, Range, Source, Union,
};

#[derive(Debug, Clone)]
pub struct Plan {
    node: PNode,
}

impl Plan {
    pub fn from_node(node: PNode) -> Self {
        Self { node }
    }

    pub fn source(table: Arc<MemoryTable>) -> Result<Self> {
        Source::make_planner_node(table, None).map(Self::from_node)
    }

    /// Rows `[begin, end)` of `table`.
    pub fn source_slice(table: Arc<MemoryTable>, begin: u64, end: u64) -> Result<Self> {
        Source::make_planner_node(table, Some((begin, end))).map(Self::from_node)
    }

    pub fn constant(value: impl Into<Value>, length: u64) -> Result<Self> {
        Constant::make_planner_node(value.into(), length).map(Self::from_node)
    }

    pub fn range(start: i64, end: i64) -> Result<Self> {
        Range::make_planner_node(start, end).map(Self::from_node)
    }

    pub fn append(&self, other: &Plan) -> Result<Self> {
        Append::make_planner_node(self.node.clone(), other.node.clone()).map(Self::from_node)
    }

    pub fn project(&self, indices: &[usize]) -> Result<Self> {
        Project::make_planner_node(self.node.clone(), indices).map(Self::from_node)
    }

    /// Columns of `self` followed by the columns of each of `others`.
    pub fn union(&self, others: &[Plan]) -> Result<Self> {
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(self.node.clone());
        inputs.extend(others.iter().map(|p| p.node.clone()));
        Union::make_planner_node(inputs).map(Self::from_node)
    }

    /// Keep the rows whose value in the one-column `mask` is truthy.
    pub fn filter(&self, mask: &Plan) -> Result<Self> {
        LogicalFilter::make_planner_node(self.node.clone(), mask.node.clone()).map(Self::from_node)
    }

    pub fn transform(
        &self,
        client: Arc<LambdaClient>,
        function: &str,
        output_type: TypeTag,
        skip_undefined: bool,
    ) -> Result<Self> {
        LambdaTransform::make_planner_node(
            self.node.clone(),
            client,
            function,
            output_type,
            skip_undefined,
        )
        .map(Self::from_node)
    }

    pub fn node(&self) -> &PNode {
        &self.node
    }

    pub fn into_node(self) -> PNode {
        self.node
    }
}

impl From<PNode> for Plan {
    fn from(node: PNode) -> Self {
        Self::from_node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockflow_core::dag::{node_key, NodeKind};
    use blockflow_operators::{infer_planner_node_length, infer_planner_node_type};

    #[test]
    fn shared_handles_share_nodes() {
        let r = Plan::range(0, 4).unwrap();
        let both = r.append(&r).unwrap();
        let inputs = &both.node().inputs;
        assert_eq!(node_key(&inputs[0]), node_key(&inputs[1]));
        assert_eq!(infer_planner_node_length(both.node()).unwrap(), Some(8));
    }

    #[test]
    fn union_then_project() {
        let p = Plan::range(0, 3)
            .unwrap()
            .union(&[Plan::constant("x", 3).unwrap()])
            .unwrap()
            .project(&[1])
            .unwrap();
        assert_eq!(p.node().kind, NodeKind::Project);
        assert_eq!(infer_planner_node_type(p.node()).unwrap(), vec![TypeTag::String]);
    }
}
