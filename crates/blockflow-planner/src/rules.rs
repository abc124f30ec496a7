//! Simple rewrite rules.
//!
//! Rules only remove nodes whose output equals one of their inputs:
//! - `Append(x, e)` / `Append(e, x)` where `e` has length 0 becomes `x`;
//! - `Union(x)` with a single input becomes `x`;
//! - `Project(x, [0..n])` selecting every column of `x` in order becomes `x`.
//!
//! The rewrite walks the graph once in post-order and memoizes by node
//! identity, so a shared sub-plan is rewritten once and stays shared.

use std::collections::HashMap;

use blockflow_core::dag::{node_key, post_order, NodeKind, PNode, PlannerNode};
use blockflow_core::error::Result;
use blockflow_operators::Inference;
use tracing::debug;

/// Apply the rules bottom-up in one pass. Inputs are simplified before their
/// consumers, so a consumer always sees its final inputs. Nodes whose type or
/// length cannot be inferred are left alone; validation reports them later.
pub fn optimize(root: &PNode) -> Result<PNode> {
    let mut inf = Inference::new();
    let mut rewritten: HashMap<usize, PNode> = HashMap::new();
    let mut fired = 0usize;

    for node in post_order(root) {
        let inputs: Vec<PNode> = node
            .inputs
            .iter()
            .map(|i| rewritten.get(&node_key(i)).cloned().unwrap_or_else(|| i.clone()))
            .collect();
        let changed = inputs
            .iter()
            .zip(&node.inputs)
            .any(|(a, b)| node_key(a) != node_key(b));
        let current = if changed {
            PlannerNode::make_shared(
                node.kind,
                node.params.clone(),
                node.aux.clone(),
                inputs,
            )?
        } else {
            node.clone()
        };

        let replacement = match simplify(&current, &mut inf) {
            Some(r) => {
                fired += 1;
                r
            }
            None => current,
        };
        if node_key(&replacement) != node_key(&node) {
            rewritten.insert(node_key(&node), replacement);
        }
    }

    if fired > 0 {
        debug!(rules_fired = fired, "plan rewritten");
    }
    // Keys of rewritten nodes stay valid: `root` keeps the originals alive.
    Ok(rewritten
        .get(&node_key(root))
        .cloned()
        .unwrap_or_else(|| root.clone()))
}

fn simplify(node: &PNode, inf: &mut Inference) -> Option<PNode> {
    match node.kind {
        NodeKind::Append => {
            let [left, right] = node.inputs.as_slice() else {
                return None;
            };
            // Both sides must agree on types or the append is an error to keep.
            if inf.types(left).ok()? != inf.types(right).ok()? {
                return None;
            }
            if inf.length(right).ok()? == Some(0) {
                Some(left.clone())
            } else if inf.length(left).ok()? == Some(0) {
                Some(right.clone())
            } else {
                None
            }
        }
        NodeKind::Union if node.inputs.len() == 1 => node.inputs.first().cloned(),
        NodeKind::Project => {
            let input = node.inputs.first()?;
            let width = inf.types(input).ok()?.len();
            let indices = node.param_list("indices").ok()?;
            let identity = indices.len() == width
                && indices
                    .iter()
                    .enumerate()
                    .all(|(i, v)| v.as_int() == Some(i as i64));
            identity.then(|| input.clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Plan;
    use blockflow_core::schema::TypeTag;
    use blockflow_operators::{infer_planner_node_length, infer_planner_node_type};

    #[test]
    fn drops_empty_append_side() {
        let r = Plan::range(0, 5).unwrap();
        let empty = Plan::range(3, 3).unwrap();
        let p = empty.append(&r).unwrap();
        let out = optimize(p.node()).unwrap();
        assert_eq!(node_key(&out), node_key(r.node()));
    }

    #[test]
    fn keeps_mismatched_append() {
        let p = Plan::range(0, 0)
            .unwrap()
            .append(&Plan::constant("x", 2).unwrap())
            .unwrap();
        let out = optimize(p.node()).unwrap();
        assert_eq!(node_key(&out), node_key(p.node()));
    }

    #[test]
    fn identity_project_and_single_union() {
        let base = Plan::range(0, 3).unwrap().union(&[Plan::constant(1.5, 3).unwrap()]).unwrap();
        let p = base.project(&[0, 1]).unwrap().union(&[]).unwrap();
        let out = optimize(p.node()).unwrap();
        assert_eq!(node_key(&out), node_key(base.node()));
    }

    #[test]
    fn rewrite_below_shared_node_keeps_sharing() {
        let r = Plan::range(0, 4).unwrap();
        let shared = r.append(&Plan::range(0, 0).unwrap()).unwrap().project(&[0]).unwrap();
        let top = shared.append(&shared).unwrap();
        let out = optimize(top.node()).unwrap();
        assert_eq!(out.kind, NodeKind::Append);
        assert_eq!(node_key(&out.inputs[0]), node_key(&out.inputs[1]));
        assert_eq!(node_key(&out.inputs[0]), node_key(r.node()));
        assert_eq!(infer_planner_node_length(&out).unwrap(), Some(8));
        assert_eq!(infer_planner_node_type(&out).unwrap(), vec![TypeTag::Integer]);
    }
}
