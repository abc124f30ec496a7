//! YAML plan documents.
//!
//! Example:
//! ```yaml
//! config:
//!   block_size: 128
//! tables:
//!   people:
//!     path: data/people.csv
//!     types: [integer, string]
//!   flags:
//!     types: [integer]
//!     rows: [[1], [0], [1]]
//! nodes:
//!   - { name: ids,   op: range, start: 0, end: 3 }
//!   - { name: both,  op: append, inputs: [ids, ids] }
//!   - { name: names, op: source, table: people, end: 3 }
//!   - { name: mask,  op: source, table: flags }
//!   - { name: kept,  op: logical_filter, input: names, mask: mask }
//! output: both
//! ```
//!
//! Nodes may only refer to nodes defined above them, so documents are
//! acyclic by construction. Naming a node twice as an input shares it.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use blockflow_core::block::RowBlock;
use blockflow_core::config::EngineConfig;
use blockflow_core::dag::PNode;
use blockflow_core::schema::TypeTag;
use blockflow_core::table::MemoryTable;
use blockflow_core::types::Value;
use blockflow_lambda::LambdaClient;
use blockflow_operators::{
    Append, Constant, LambdaTransform, LogicalFilter, Project, Range, Source, Union,
};

use crate::error::{PlanError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub config: ConfigOverrides,
    #[serde(default)]
    pub tables: BTreeMap<String, TableDecl>,
    pub nodes: Vec<NodeDef>,
    /// Defaults to the last node.
    #[serde(default)]
    pub output: Option<String>,
}

/// Engine settings a plan file may pin. Unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub block_size: Option<usize>,
    #[serde(default)]
    pub pool_max_retained: Option<usize>,
    #[serde(default)]
    pub max_queued_blocks: Option<usize>,
    #[serde(default)]
    pub max_parallel_pipelines: Option<usize>,
    #[serde(default)]
    pub lambda_request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub lambda_fast_path: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, mut cfg: EngineConfig) -> EngineConfig {
        if let Some(v) = self.block_size {
            cfg.block_size = v;
        }
        if let Some(v) = self.pool_max_retained {
            cfg.pool_max_retained = v;
        }
        if let Some(v) = self.max_queued_blocks {
            cfg.max_queued_blocks = v;
        }
        if let Some(v) = self.max_parallel_pipelines {
            cfg.max_parallel_pipelines = v;
        }
        if let Some(v) = self.lambda_request_timeout_ms {
            cfg.lambda_request_timeout_ms = v;
        }
        if let Some(v) = self.lambda_fast_path {
            cfg.lambda_fast_path = v;
        }
        cfg
    }
}

/// A table the plan reads. Either loaded from `path` by the caller, or given
/// inline through `rows`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDecl {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default = "default_header")]
    pub header: bool,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub rows: Option<Vec<Vec<YamlValue>>>,
}

fn default_header() -> bool {
    true
}

impl TableDecl {
    /// Declared column types, if any.
    pub fn type_tags(&self, table: &str) -> Result<Option<Vec<TypeTag>>> {
        self.types
            .as_ref()
            .map(|names| {
                names
                    .iter()
                    .map(|n| {
                        TypeTag::parse(n).ok_or_else(|| {
                            PlanError::invalid(table, format!("unknown type '{}'", n))
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    fn inline(&self, table: &str) -> Result<Option<MemoryTable>> {
        let Some(rows) = &self.rows else {
            return Ok(None);
        };
        let types = self.type_tags(table)?;
        let width = match (&types, rows.first()) {
            (Some(t), _) => t.len(),
            (None, Some(r)) => r.len(),
            (None, None) => 0,
        };
        let mut block = RowBlock::with_shape(width, 0);
        for (i, row) in rows.iter().enumerate() {
            let mut values = Vec::with_capacity(row.len());
            for (c, cell) in row.iter().enumerate() {
                let v = yaml_to_value(cell);
                let v = match types.as_ref().and_then(|t| t.get(c)) {
                    Some(tag) => v.coerce_to(*tag).ok_or_else(|| {
                        PlanError::invalid(
                            table,
                            format!("row {} column {}: cannot read {} as {}", i, c, v, tag),
                        )
                    })?,
                    None => v,
                };
                values.push(v);
            }
            block.push_row(values)?;
        }
        Ok(Some(match types {
            Some(t) => MemoryTable::new(t, block)?,
            None => MemoryTable::infer(block),
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(flatten)]
    pub step: Step,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Source {
        table: String,
        #[serde(default)]
        begin: Option<u64>,
        #[serde(default)]
        end: Option<u64>,
    },
    Constant {
        value: YamlValue,
        length: u64,
    },
    Range {
        start: i64,
        end: i64,
    },
    Append {
        inputs: Vec<String>,
    },
    Project {
        input: String,
        indices: Vec<usize>,
    },
    Union {
        inputs: Vec<String>,
    },
    LogicalFilter {
        input: String,
        mask: String,
    },
    LambdaTransform {
        input: String,
        function: String,
        output_type: String,
        #[serde(default)]
        skip_undefined: bool,
    },
}

/// What a document is built against.
#[derive(Default, Clone)]
pub struct PlanEnv {
    /// Tables already loaded by the caller, by name.
    pub tables: HashMap<String, Arc<MemoryTable>>,
    pub evaluator: Option<Arc<LambdaClient>>,
}

impl std::fmt::Debug for PlanEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        f.debug_struct("PlanEnv")
            .field("tables", &names)
            .field("evaluator", &self.evaluator.is_some())
            .finish()
    }
}

pub fn parse_yaml_plan(s: &str) -> Result<PlanDocument> {
    Ok(serde_yaml::from_str(s)?)
}

impl PlanDocument {
    /// Tables that must be loaded from disk before `build`.
    pub fn file_tables(&self) -> impl Iterator<Item = (&str, &TableDecl)> + '_ {
        self.tables
            .iter()
            .filter(|(_, d)| d.rows.is_none() && d.path.is_some())
            .map(|(n, d)| (n.as_str(), d))
    }

    pub fn build(&self, env: &PlanEnv) -> Result<PNode> {
        let mut tables = env.tables.clone();
        let mut built: HashMap<&str, PNode> = HashMap::with_capacity(self.nodes.len());

        for def in &self.nodes {
            let name = def.name.as_str();
            if built.contains_key(name) {
                return Err(PlanError::DuplicateNode(def.name.clone()));
            }
            let node = match &def.step {
                Step::Source { table, begin, end } => {
                    let t = self.table(table, &mut tables)?;
                    let range = match (begin, end) {
                        (Some(b), Some(e)) => Some((*b, *e)),
                        (None, None) => None,
                        (Some(b), None) => Some((*b, t.num_rows() as u64)),
                        (None, Some(e)) => Some((0, *e)),
                    };
                    Source::make_planner_node(t, range)?
                }
                Step::Constant { value, length } => {
                    Constant::make_planner_node(yaml_to_value(value), *length)?
                }
                Step::Range { start, end } => Range::make_planner_node(*start, *end)?,
                Step::Append { inputs } => {
                    let [left, right] = inputs.as_slice() else {
                        return Err(PlanError::invalid(
                            name,
                            format!("append takes 2 inputs, got {}", inputs.len()),
                        ));
                    };
                    Append::make_planner_node(resolve(&built, left)?, resolve(&built, right)?)?
                }
                Step::Project { input, indices } => {
                    Project::make_planner_node(resolve(&built, input)?, indices)?
                }
                Step::Union { inputs } => {
                    let inputs = inputs
                        .iter()
                        .map(|i| resolve(&built, i))
                        .collect::<Result<Vec<_>>>()?;
                    Union::make_planner_node(inputs)?
                }
                Step::LogicalFilter { input, mask } => LogicalFilter::make_planner_node(
                    resolve(&built, input)?,
                    resolve(&built, mask)?,
                )?,
                Step::LambdaTransform {
                    input,
                    function,
                    output_type,
                    skip_undefined,
                } => {
                    let tag = TypeTag::parse(output_type).ok_or_else(|| {
                        PlanError::invalid(name, format!("unknown type '{}'", output_type))
                    })?;
                    let client = env
                        .evaluator
                        .clone()
                        .ok_or_else(|| PlanError::MissingEvaluator(def.name.clone()))?;
                    LambdaTransform::make_planner_node(
                        resolve(&built, input)?,
                        client,
                        function,
                        tag,
                        *skip_undefined,
                    )?
                }
            };
            built.insert(name, node);
        }

        let output = match &self.output {
            Some(o) => o.as_str(),
            None => self
                .nodes
                .last()
                .map(|n| n.name.as_str())
                .ok_or_else(|| PlanError::invalid("<document>", "no nodes"))?,
        };
        resolve(&built, output)
    }

    fn table(
        &self,
        name: &str,
        tables: &mut HashMap<String, Arc<MemoryTable>>,
    ) -> Result<Arc<MemoryTable>> {
        if let Some(t) = tables.get(name) {
            return Ok(t.clone());
        }
        let inline = match self.tables.get(name) {
            Some(decl) => decl.inline(name)?,
            None => None,
        };
        let t = Arc::new(inline.ok_or_else(|| PlanError::UnknownTable(name.to_string()))?);
        tables.insert(name.to_string(), t.clone());
        Ok(t)
    }
}

fn resolve(built: &HashMap<&str, PNode>, name: &str) -> Result<PNode> {
    built
        .get(name)
        .cloned()
        .ok_or_else(|| PlanError::UnknownNode(name.to_string()))
}

/// Plain YAML scalars and collections as engine values. Booleans become
/// 0/1 integers; tagged values are read through their inner value.
pub fn yaml_to_value(v: &YamlValue) -> Value {
    match v {
        YamlValue::Null => Value::Undefined,
        YamlValue::Bool(b) => Value::Integer(*b as i64),
        YamlValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        YamlValue::String(s) => Value::Str(s.clone()),
        YamlValue::Sequence(items) => Value::List(items.iter().map(yaml_to_value).collect()),
        YamlValue::Mapping(m) => Value::Dict(
            m.iter()
                .map(|(k, v)| {
                    let key = match k {
                        YamlValue::String(s) => s.clone(),
                        other => yaml_to_value(other).to_string(),
                    };
                    (key, yaml_to_value(v))
                })
                .collect(),
        ),
        YamlValue::Tagged(t) => yaml_to_value(&t.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockflow_core::dag::{node_key, NodeKind};
    use blockflow_operators::{infer_planner_node_length, infer_planner_node_type};

    const SHARED: &str = r#"
config:
  block_size: 16
nodes:
  - { name: r, op: range, start: 0, end: 5 }
  - { name: twice, op: append, inputs: [r, r] }
"#;

    #[test]
    fn shared_inputs_are_one_node() {
        let doc = parse_yaml_plan(SHARED).unwrap();
        assert_eq!(doc.config.block_size, Some(16));
        let root = doc.build(&PlanEnv::default()).unwrap();
        assert_eq!(root.kind, NodeKind::Append);
        assert_eq!(node_key(&root.inputs[0]), node_key(&root.inputs[1]));
        assert_eq!(infer_planner_node_length(&root).unwrap(), Some(10));
    }

    #[test]
    fn overrides_keep_unset_fields() {
        let base = EngineConfig {
            pool_max_retained: 3,
            ..EngineConfig::default()
        };
        let doc = parse_yaml_plan(SHARED).unwrap();
        let cfg = doc.config.apply(base);
        assert_eq!(cfg.block_size, 16);
        assert_eq!(cfg.pool_max_retained, 3);
    }

    #[test]
    fn inline_table_with_declared_types() {
        let doc = parse_yaml_plan(
            r#"
tables:
  t:
    types: [float, string]
    rows: [[1, a], [2.5, b], [null, c]]
nodes:
  - { name: s, op: source, table: t, begin: 1 }
"#,
        )
        .unwrap();
        let root = doc.build(&PlanEnv::default()).unwrap();
        assert_eq!(
            infer_planner_node_type(&root).unwrap(),
            vec![TypeTag::Float, TypeTag::String]
        );
        assert_eq!(infer_planner_node_length(&root).unwrap(), Some(2));
    }

    #[test]
    fn forward_reference_is_rejected() {
        let doc = parse_yaml_plan(
            r#"
nodes:
  - { name: a, op: project, input: b, indices: [0] }
  - { name: b, op: range, start: 0, end: 1 }
"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&PlanEnv::default()),
            Err(PlanError::UnknownNode(n)) if n == "b"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let doc = parse_yaml_plan(
            r#"
nodes:
  - { name: a, op: range, start: 0, end: 1 }
  - { name: a, op: range, start: 0, end: 2 }
"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&PlanEnv::default()),
            Err(PlanError::DuplicateNode(_))
        ));
    }

    #[test]
    fn lambda_without_evaluator() {
        let doc = parse_yaml_plan(
            r#"
nodes:
  - { name: a, op: range, start: 0, end: 1 }
  - { name: f, op: lambda_transform, input: a, function: double, output_type: integer }
"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&PlanEnv::default()),
            Err(PlanError::MissingEvaluator(n)) if n == "f"
        ));
    }

    #[test]
    fn append_arity_is_checked() {
        let doc = parse_yaml_plan(
            r#"
nodes:
  - { name: a, op: range, start: 0, end: 1 }
  - { name: b, op: append, inputs: [a] }
"#,
        )
        .unwrap();
        assert!(matches!(
            doc.build(&PlanEnv::default()),
            Err(PlanError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_table() {
        let doc = parse_yaml_plan("nodes:\n  - { name: s, op: source, table: nope }\n").unwrap();
        assert!(matches!(
            doc.build(&PlanEnv::default()),
            Err(PlanError::UnknownTable(_))
        ));
    }

    #[test]
    fn yaml_scalars() {
        let v: YamlValue = serde_yaml::from_str("{a: [1, 2.5, true], b: ~}").unwrap();
        let got = yaml_to_value(&v);
        let Value::Dict(d) = got else {
            panic!("expected dict")
        };
        assert_eq!(
            d["a"],
            Value::List(vec![Value::Integer(1), Value::Float(2.5), Value::Integer(1)])
        );
        assert_eq!(d["b"], Value::Undefined);
    }
}
