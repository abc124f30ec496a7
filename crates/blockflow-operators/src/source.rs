//! Source: streams the rows of an in-memory table.

use std::collections::BTreeMap;
use std::sync::Arc;

use blockflow_core::dag::{AuxValue, NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_core::table::MemoryTable;
use blockflow_core::types::Value;

use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, param_count, ExecStatus, Operator, OperatorSpec};

#[derive(Debug, Clone)]
pub struct Source {
    table: Arc<MemoryTable>,
    begin: usize,
    end: usize,
    cursor: usize,
}

impl Source {
    pub fn new(table: Arc<MemoryTable>, begin: usize, end: usize) -> Self {
        Self {
            table,
            begin,
            end,
            cursor: begin,
        }
    }

    /// Planner node over rows `[begin, end)` of `table` (all rows if `None`).
    pub fn make_planner_node(
        table: Arc<MemoryTable>,
        range: Option<(u64, u64)>,
    ) -> Result<PNode> {
        let mut params = BTreeMap::new();
        if let Some((begin, end)) = range {
            params.insert("begin".to_string(), Value::Integer(begin as i64));
            params.insert("end".to_string(), Value::Integer(end as i64));
        }
        let mut aux: BTreeMap<String, AuxValue> = BTreeMap::new();
        aux.insert("table".to_string(), table);
        PlannerNode::make_shared(NodeKind::Source, params, aux, vec![])
    }

    fn bounds(node: &PNode, table: &MemoryTable) -> Result<(usize, usize)> {
        let rows = table.num_rows() as u64;
        let begin = match node.param_opt("begin") {
            Some(_) => param_count(node, "begin")?,
            None => 0,
        };
        let end = match node.param_opt("end") {
            Some(_) => param_count(node, "end")?,
            None => rows,
        };
        if begin > end || end > rows {
            return Err(Error::MalformedPlan(format!(
                "source: row range [{}, {}) outside table of {} rows",
                begin, end, rows
            )));
        }
        Ok((begin as usize, end as usize))
    }
}

impl Operator for Source {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(Source::new(self.table.clone(), self.begin, self.end))
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        if self.cursor >= self.end {
            return Ok(ExecStatus::Finished);
        }
        let n = ctx.block_size().min(self.end - self.cursor);
        let data = self.table.data();
        let mut out = ctx.get_output_buffer();
        out.resize(data.num_columns(), n);
        out.copy_range_from(0, 0, data, self.cursor, n);
        ctx.emit(out);
        self.cursor += n;
        if self.cursor >= self.end {
            Ok(ExecStatus::Finished)
        } else {
            Ok(ExecStatus::Yielded)
        }
    }
}

impl OperatorSpec for Source {
    const KIND: NodeKind = NodeKind::Source;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        let table = node.aux::<MemoryTable>("table")?;
        let (begin, end) = Self::bounds(node, &table)?;
        Ok(Source::new(table, begin, end))
    }

    fn infer_type(node: &PNode, _inf: &mut Inference) -> Result<Vec<TypeTag>> {
        Ok(node.aux::<MemoryTable>("table")?.types().to_vec())
    }

    fn infer_length(node: &PNode, _inf: &mut Inference) -> Result<Option<u64>> {
        let table = node.aux::<MemoryTable>("table")?;
        let (begin, end) = Self::bounds(node, &table)?;
        Ok(Some((end - begin) as u64))
    }

    fn repr(node: &PNode, _tagger: &mut NodeTagger) -> String {
        match node.aux::<MemoryTable>("table") {
            Ok(table) => match Self::bounds(node, &table) {
                Ok((b, e)) => format!("Source[{}:{}]", b, e),
                Err(_) => "Source[?]".to_string(),
            },
            Err(_) => "Source[?]".to_string(),
        }
    }
}
