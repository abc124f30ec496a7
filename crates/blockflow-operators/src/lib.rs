#![forbid(unsafe_code)]
//! blockflow-operators: the operator contract and the operators.
//!
//! Design intent:
//! - Operators are pure and synchronous; all I/O goes through the
//!   `QueryContext` they are handed.
//! - Output buffers come from the context (and so from the block pool),
//!   never from a direct allocation.
//! - Each operator also answers static questions about its planner node
//!   (type, length, repr) without executing anything.

pub mod context;
pub mod infer;
pub mod registry;
pub mod traits;

mod carry;

pub mod append;
pub mod constant;
pub mod lambda_transform;
pub mod logical_filter;
pub mod project;
pub mod range;
pub mod source;
pub mod union;

pub use append::Append;
pub use constant::Constant;
pub use context::QueryContext;
pub use infer::{
    infer_planner_node_length, infer_planner_node_length_raw, infer_planner_node_type,
    validate_plan, Inference, PlanInfo,
};
pub use lambda_transform::LambdaTransform;
pub use logical_filter::LogicalFilter;
pub use project::Project;
pub use range::Range;
pub use registry::Registry;
pub use source::Source;
pub use traits::{ExecStatus, Operator, OperatorSpec, UNKNOWN_LENGTH};
pub use union::Union;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use blockflow_core::dag::{NodeKind, NodeTagger, PNode, PlannerNode};
    use blockflow_core::error::Error;
    use blockflow_core::schema::TypeTag;
    use blockflow_core::types::Value;

    #[test]
    fn append_type_mismatch_is_recoverable() {
        let ints = Range::make_planner_node(0, 3).unwrap();
        let strs = Constant::make_planner_node(Value::Str("s".into()), 2).unwrap();
        let node = Append::make_planner_node(ints, strs).unwrap();
        let err = infer_planner_node_type(&node).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert!(err.is_recoverable());
        assert!(validate_plan(&node).is_err());
    }

    fn raw_node(kind: NodeKind, inputs: Vec<PNode>) -> PNode {
        Arc::new(PlannerNode {
            kind,
            params: BTreeMap::new(),
            aux: BTreeMap::new(),
            inputs,
        })
    }

    #[test]
    fn wrong_kind_or_arity_is_a_malformed_plan() {
        let one = Range::make_planner_node(0, 3).unwrap();

        let err = Append::from_planner_node(&one).unwrap_err();
        assert!(matches!(err, Error::MalformedPlan(_)), "{:?}", err);
        assert!(err.is_recoverable());

        let lopsided = raw_node(NodeKind::Append, vec![one.clone()]);
        let err = Append::from_planner_node(&lopsided).unwrap_err();
        assert!(matches!(err, Error::MalformedPlan(_)), "{:?}", err);

        let empty_union = raw_node(NodeKind::Union, vec![]);
        let err = Union::from_planner_node(&empty_union).unwrap_err();
        assert!(matches!(err, Error::MalformedPlan(_)), "{:?}", err);

        assert!(matches!(
            Union::from_planner_node(&one),
            Err(Error::MalformedPlan(_))
        ));
    }

    #[test]
    fn length_unknown_propagates() {
        let data = Range::make_planner_node(0, 4).unwrap();
        let mask = Constant::make_planner_node(Value::Integer(1), 4).unwrap();
        let filtered = LogicalFilter::make_planner_node(data.clone(), mask).unwrap();
        let node = Append::make_planner_node(data, filtered).unwrap();
        assert_eq!(infer_planner_node_length(&node).unwrap(), None);
        assert_eq!(infer_planner_node_length_raw(&node).unwrap(), UNKNOWN_LENGTH);
    }

    #[test]
    fn raw_length_rejects_overflow() {
        let big = Constant::make_planner_node(Value::Integer(0), i64::MAX as u64).unwrap();
        let node = Append::make_planner_node(big.clone(), big).unwrap();
        assert_eq!(
            infer_planner_node_length(&node).unwrap(),
            Some(2 * (i64::MAX as u64))
        );
        let err = infer_planner_node_length_raw(&node).unwrap_err();
        assert!(matches!(err, Error::MalformedPlan(_)));
        assert!(Constant::make_planner_node(Value::Integer(0), u64::MAX).is_err());
    }

    #[test]
    fn shared_subplan_tags_consistently() {
        let shared = Range::make_planner_node(0, 2).unwrap();
        let node = Append::make_planner_node(shared.clone(), shared).unwrap();
        let mut tagger = NodeTagger::new();
        assert_eq!(Registry::repr(&node, &mut tagger), "Append(N0,N0)");

        let info = validate_plan(&node).unwrap();
        assert_eq!(info.types, vec![TypeTag::Integer]);
        assert_eq!(info.length, Some(4));
        assert_eq!(info.distinct_nodes, 2);
    }

    #[test]
    fn deep_shared_chain_infers_quickly() {
        // Each level references the previous one twice; a naive walk would
        // visit 2^40 paths.
        let mut node = Range::make_planner_node(0, 1).unwrap();
        for _ in 0..40 {
            node = Append::make_planner_node(node.clone(), node).unwrap();
        }
        let types = infer_planner_node_type(&node).unwrap();
        assert_eq!(types, vec![TypeTag::Integer]);
        assert_eq!(infer_planner_node_length(&node).unwrap(), Some(1u64 << 40));
    }
}
