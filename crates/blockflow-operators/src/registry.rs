//! Kind -> operator dispatch. One arm per `NodeKind`; adding a kind without
//! wiring it here fails to compile.

use blockflow_core::dag::{NodeKind, NodeTagger, PNode};
use blockflow_core::error::Result;
use blockflow_core::schema::TypeTag;

use crate::infer::Inference;
use crate::traits::{Operator, OperatorSpec};
use crate::{
    Append, Constant, LambdaTransform, LogicalFilter, Project, Range, Source, Union,
};

macro_rules! dispatch {
    ($kind:expr, $op:ident => $body:expr) => {
        match $kind {
            NodeKind::Source => {
                type $op = Source;
                $body
            }
            NodeKind::Constant => {
                type $op = Constant;
                $body
            }
            NodeKind::Range => {
                type $op = Range;
                $body
            }
            NodeKind::Append => {
                type $op = Append;
                $body
            }
            NodeKind::Project => {
                type $op = Project;
                $body
            }
            NodeKind::Union => {
                type $op = Union;
                $body
            }
            NodeKind::LogicalFilter => {
                type $op = LogicalFilter;
                $body
            }
            NodeKind::LambdaTransform => {
                type $op = LambdaTransform;
                $body
            }
        }
    };
}

pub struct Registry;

impl Registry {
    pub fn make(node: &PNode) -> Result<Box<dyn Operator>> {
        dispatch!(node.kind, Op => {
            let op: Box<dyn Operator> = Box::new(Op::from_planner_node(node)?);
            Ok(op)
        })
    }

    pub fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        dispatch!(node.kind, Op => Op::infer_type(node, inf))
    }

    pub fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        dispatch!(node.kind, Op => Op::infer_length(node, inf))
    }

    pub fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        dispatch!(node.kind, Op => Op::repr(node, tagger))
    }
}
