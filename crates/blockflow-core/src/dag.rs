//! Planner nodes: the logical plan graph.
//!
//! A plan is a DAG of `PlannerNode`s held through `Arc`. A node may be the
//! input of several parents; there are no back references so the graph is
//! acyclic by construction. Node identity is the `Arc` pointer, and every
//! graph-wide walk memoizes by it (see `node_key`).

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Value;

/// Runtime-only objects attached to a node (tables, evaluator handles).
pub type AuxValue = Arc<dyn Any + Send + Sync>;

pub type PNode = Arc<PlannerNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Constant,
    Range,
    Append,
    Project,
    Union,
    LogicalFilter,
    LambdaTransform,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Source,
        NodeKind::Constant,
        NodeKind::Range,
        NodeKind::Append,
        NodeKind::Project,
        NodeKind::Union,
        NodeKind::LogicalFilter,
        NodeKind::LambdaTransform,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Constant => "constant",
            NodeKind::Range => "range",
            NodeKind::Append => "append",
            NodeKind::Project => "project",
            NodeKind::Union => "union",
            NodeKind::LogicalFilter => "logical_filter",
            NodeKind::LambdaTransform => "lambda_transform",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|k| k.name() == lower)
    }

    pub fn attributes(self) -> OperatorAttributes {
        use NodeKind::*;
        let (flags, num_inputs) = match self {
            Source | Constant | Range => (OperatorFlags::SOURCE, Arity::Fixed(0)),
            Append => (OperatorFlags::NONE, Arity::Fixed(2)),
            Project | LambdaTransform => (OperatorFlags::LINEAR, Arity::Fixed(1)),
            Union => (OperatorFlags::LINEAR, Arity::Variable { min: 1 }),
            LogicalFilter => (OperatorFlags::NONE, Arity::Fixed(2)),
        };
        OperatorAttributes { flags, num_inputs }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability bits of an operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperatorFlags(u32);

impl OperatorFlags {
    pub const NONE: OperatorFlags = OperatorFlags(0);
    /// Produces rows without inputs.
    pub const SOURCE: OperatorFlags = OperatorFlags(1);
    /// Output row i depends only on row i of each input.
    pub const LINEAR: OperatorFlags = OperatorFlags(1 << 1);

    pub fn contains(self, other: OperatorFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for OperatorFlags {
    type Output = OperatorFlags;

    fn bitor(self, rhs: OperatorFlags) -> OperatorFlags {
        OperatorFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variable { min: usize },
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n == k,
            Arity::Variable { min } => n >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(k) => write!(f, "{}", k),
            Arity::Variable { min } => write!(f, "at least {}", min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAttributes {
    pub flags: OperatorFlags,
    pub num_inputs: Arity,
}

pub struct PlannerNode {
    pub kind: NodeKind,
    pub params: BTreeMap<String, Value>,
    pub aux: BTreeMap<String, AuxValue>,
    pub inputs: Vec<PNode>,
}

impl PlannerNode {
    /// Construct a shared node, validating the input count against the kind.
    pub fn make_shared(
        kind: NodeKind,
        params: BTreeMap<String, Value>,
        aux: BTreeMap<String, AuxValue>,
        inputs: Vec<PNode>,
    ) -> Result<PNode> {
        let arity = kind.attributes().num_inputs;
        if !arity.accepts(inputs.len()) {
            return Err(Error::InvalidArity {
                kind: kind.name().to_string(),
                expected: arity.to_string(),
                actual: inputs.len(),
            });
        }
        Ok(Arc::new(PlannerNode {
            kind,
            params,
            aux,
            inputs,
        }))
    }

    pub fn attributes(&self) -> OperatorAttributes {
        self.kind.attributes()
    }

    pub fn input(&self, i: usize) -> Result<&PNode> {
        self.inputs.get(i).ok_or_else(|| {
            Error::MalformedPlan(format!("{}: missing input {}", self.kind, i))
        })
    }

    pub fn param_opt(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param(&self, key: &str) -> Result<&Value> {
        self.params.get(key).ok_or_else(|| {
            Error::MalformedPlan(format!("{}: missing parameter '{}'", self.kind, key))
        })
    }

    pub fn param_int(&self, key: &str) -> Result<i64> {
        self.param(key)?
            .as_int()
            .ok_or_else(|| self.ill_typed(key, "integer"))
    }

    pub fn param_str(&self, key: &str) -> Result<&str> {
        self.param(key)?
            .as_str()
            .ok_or_else(|| self.ill_typed(key, "string"))
    }

    pub fn param_list(&self, key: &str) -> Result<&[Value]> {
        self.param(key)?
            .as_list()
            .ok_or_else(|| self.ill_typed(key, "list"))
    }

    /// Integer flag; absent means `default`.
    pub fn param_flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_int()
                .map(|i| i != 0)
                .ok_or_else(|| self.ill_typed(key, "integer")),
        }
    }

    pub fn aux<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        let value = self.aux.get(key).cloned().ok_or_else(|| {
            Error::MalformedPlan(format!("{}: missing auxiliary '{}'", self.kind, key))
        })?;
        value.downcast::<T>().map_err(|_| {
            Error::MalformedPlan(format!(
                "{}: auxiliary '{}' is not a {}",
                self.kind,
                key,
                std::any::type_name::<T>()
            ))
        })
    }

    fn ill_typed(&self, key: &str, expected: &str) -> Error {
        Error::MalformedPlan(format!(
            "{}: parameter '{}' must be {}",
            self.kind, key, expected
        ))
    }
}

impl fmt::Debug for PlannerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerNode")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("aux", &self.aux.keys().collect::<Vec<_>>())
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

/// Identity of a node for memo maps. Only meaningful while the node is alive.
pub fn node_key(node: &PNode) -> usize {
    Arc::as_ptr(node) as *const () as usize
}

/// Distinct nodes reachable from `root`, inputs before the nodes that use them.
pub fn post_order(root: &PNode) -> Vec<PNode> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(node_key(root));
    let mut stack: Vec<(PNode, usize)> = vec![(root.clone(), 0)];
    while let Some((node, next)) = stack.pop() {
        if next < node.inputs.len() {
            let child = node.inputs[next].clone();
            stack.push((node, next + 1));
            if seen.insert(node_key(&child)) {
                stack.push((child, 0));
            }
        } else {
            out.push(node);
        }
    }
    out
}

/// Assigns `N0`, `N1`, ... to distinct nodes in first-visit order.
#[derive(Default)]
pub struct NodeTagger {
    tags: HashMap<usize, String>,
    // Keeps tagged nodes alive so their keys cannot be reused.
    retained: Vec<PNode>,
}

impl NodeTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, node: &PNode) -> String {
        let key = node_key(node);
        if let Some(t) = self.tags.get(&key) {
            return t.clone();
        }
        let t = format!("N{}", self.tags.len());
        self.tags.insert(key, t.clone());
        self.retained.push(node.clone());
        t
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl fmt::Debug for NodeTagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTagger")
            .field("tagged", &self.tags.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i64, end: i64) -> PNode {
        let mut params = BTreeMap::new();
        params.insert("start".to_string(), Value::Integer(start));
        params.insert("end".to_string(), Value::Integer(end));
        PlannerNode::make_shared(NodeKind::Range, params, BTreeMap::new(), vec![]).unwrap()
    }

    #[test]
    fn arity_is_validated() {
        let a = range(0, 3);
        let err = PlannerNode::make_shared(
            NodeKind::Append,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![a.clone()],
        )
        .unwrap_err();
        match err {
            Error::InvalidArity {
                kind,
                expected,
                actual,
            } => {
                assert_eq!(kind, "append");
                assert_eq!(expected, "2");
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = PlannerNode::make_shared(NodeKind::Union, BTreeMap::new(), BTreeMap::new(), vec![])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArity { .. }));
        assert!(PlannerNode::make_shared(
            NodeKind::Union,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![a.clone(), a.clone(), a]
        )
        .is_ok());
    }

    #[test]
    fn param_accessors_report_malformed() {
        let n = range(1, 4);
        assert_eq!(n.param_int("start").unwrap(), 1);
        assert!(matches!(n.param_str("start"), Err(Error::MalformedPlan(_))));
        assert!(matches!(n.param_int("missing"), Err(Error::MalformedPlan(_))));
        assert!(n.param_flag("missing", true).unwrap());
    }

    #[test]
    fn aux_downcasts() {
        let mut aux: BTreeMap<String, AuxValue> = BTreeMap::new();
        aux.insert("answer".into(), Arc::new(42u32));
        let n = PlannerNode::make_shared(NodeKind::Source, BTreeMap::new(), aux, vec![]).unwrap();
        assert_eq!(*n.aux::<u32>("answer").unwrap(), 42);
        assert!(n.aux::<String>("answer").is_err());
        assert!(n.aux::<u32>("other").is_err());
    }

    #[test]
    fn tagger_is_identity_based() {
        let shared = range(0, 2);
        let twin = range(0, 2);
        let mut tagger = NodeTagger::new();
        let a = tagger.tag(&shared);
        let b = tagger.tag(&twin);
        assert_eq!(tagger.tag(&shared), a);
        assert_ne!(a, b);
        assert_eq!(a, "N0");
        assert_eq!(b, "N1");
    }

    #[test]
    fn post_order_visits_shared_once() {
        let shared = range(0, 2);
        let top = PlannerNode::make_shared(
            NodeKind::Append,
            BTreeMap::new(),
            BTreeMap::new(),
            vec![shared.clone(), shared.clone()],
        )
        .unwrap();
        let order = post_order(&top);
        assert_eq!(order.len(), 2);
        assert_eq!(node_key(&order[0]), node_key(&shared));
        assert_eq!(node_key(&order[1]), node_key(&top));
    }

    #[test]
    fn kinds_parse_by_name() {
        for k in NodeKind::ALL {
            assert_eq!(NodeKind::parse(k.name()), Some(k));
        }
        assert!(NodeKind::Range
            .attributes()
            .flags
            .contains(OperatorFlags::SOURCE));
    }
}
