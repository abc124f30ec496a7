//! Static type and length inference over a planner graph.
//!
//! Nothing executes here. Results are memoized by node identity, and every
//! query first walks the graph in post-order so that an operator asking for
//! its inputs' types always hits the memo; deep plans never recurse.

use std::collections::HashMap;

use blockflow_core::dag::{node_key, post_order, PNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;

use crate::registry::Registry;
use crate::traits::UNKNOWN_LENGTH;

#[derive(Default)]
pub struct Inference {
    types: HashMap<usize, Vec<TypeTag>>,
    lengths: HashMap<usize, Option<u64>>,
    // Keeps visited nodes alive so their keys stay unique.
    retained: HashMap<usize, PNode>,
}

impl Inference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&mut self, node: &PNode) -> Result<Vec<TypeTag>> {
        if let Some(t) = self.types.get(&node_key(node)) {
            return Ok(t.clone());
        }
        for n in post_order(node) {
            let key = node_key(&n);
            if self.types.contains_key(&key) {
                continue;
            }
            let t = Registry::infer_type(&n, self)?;
            self.types.insert(key, t);
            self.retain(n);
        }
        Ok(self.types.get(&node_key(node)).cloned().unwrap_or_default())
    }

    pub fn length(&mut self, node: &PNode) -> Result<Option<u64>> {
        if let Some(l) = self.lengths.get(&node_key(node)) {
            return Ok(*l);
        }
        for n in post_order(node) {
            let key = node_key(&n);
            if self.lengths.contains_key(&key) {
                continue;
            }
            let l = Registry::infer_length(&n, self)?;
            self.lengths.insert(key, l);
            self.retain(n);
        }
        Ok(self.lengths.get(&node_key(node)).copied().flatten())
    }

    /// Types of every input of `node`, in order.
    pub fn input_types(&mut self, node: &PNode) -> Result<Vec<Vec<TypeTag>>> {
        node.inputs.iter().map(|i| self.types(i)).collect()
    }

    pub fn input_lengths(&mut self, node: &PNode) -> Result<Vec<Option<u64>>> {
        node.inputs.iter().map(|i| self.length(i)).collect()
    }

    fn retain(&mut self, node: PNode) {
        self.retained.entry(node_key(&node)).or_insert(node);
    }
}

pub fn infer_planner_node_type(node: &PNode) -> Result<Vec<TypeTag>> {
    Inference::new().types(node)
}

pub fn infer_planner_node_length(node: &PNode) -> Result<Option<u64>> {
    Inference::new().length(node)
}

/// Length with unknown reported as `UNKNOWN_LENGTH`.
pub fn infer_planner_node_length_raw(node: &PNode) -> Result<i64> {
    match infer_planner_node_length(node)? {
        None => Ok(UNKNOWN_LENGTH),
        Some(l) => i64::try_from(l).map_err(|_| {
            Error::MalformedPlan(format!("length {} does not fit a signed length", l))
        }),
    }
}

/// What validation learned about a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanInfo {
    pub types: Vec<TypeTag>,
    pub length: Option<u64>,
    pub distinct_nodes: usize,
}

/// Infer the root's type and length and check that every node can be turned
/// into an operator. Structural errors surface here, before any `execute`.
pub fn validate_plan(root: &PNode) -> Result<PlanInfo> {
    let mut inf = Inference::new();
    let types = inf.types(root)?;
    let length = inf.length(root)?;
    let nodes = post_order(root);
    for n in &nodes {
        Registry::make(n)?;
    }
    Ok(PlanInfo {
        types,
        length,
        distinct_nodes: nodes.len(),
    })
}
