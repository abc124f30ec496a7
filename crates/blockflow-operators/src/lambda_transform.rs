//! LambdaTransform: one output column computed per row by the evaluator.

use std::collections::BTreeMap;
use std::sync::Arc;

use blockflow_core::dag::{AuxValue, NodeKind, NodeTagger, PNode, PlannerNode};
use blockflow_core::error::{Error, Result};
use blockflow_core::schema::TypeTag;
use blockflow_core::types::Value;
use blockflow_lambda::LambdaClient;
use tracing::trace;

use crate::context::QueryContext;
use crate::infer::Inference;
use crate::traits::{expect_kind, ExecStatus, Operator, OperatorSpec};

#[derive(Debug, Clone)]
pub struct LambdaTransform {
    client: Arc<LambdaClient>,
    function: String,
    output_type: TypeTag,
    skip_undefined: bool,
}

impl LambdaTransform {
    pub fn new(
        client: Arc<LambdaClient>,
        function: impl Into<String>,
        output_type: TypeTag,
        skip_undefined: bool,
    ) -> Self {
        Self {
            client,
            function: function.into(),
            output_type,
            skip_undefined,
        }
    }

    pub fn make_planner_node(
        input: PNode,
        client: Arc<LambdaClient>,
        function: &str,
        output_type: TypeTag,
        skip_undefined: bool,
    ) -> Result<PNode> {
        let mut params = BTreeMap::new();
        params.insert("function".to_string(), Value::from(function));
        params.insert("output_type".to_string(), Value::from(output_type.name()));
        params.insert(
            "skip_undefined".to_string(),
            Value::Integer(skip_undefined as i64),
        );
        let mut aux: BTreeMap<String, AuxValue> = BTreeMap::new();
        aux.insert("evaluator".to_string(), client);
        PlannerNode::make_shared(NodeKind::LambdaTransform, params, aux, vec![input])
    }

    fn output_type(node: &PNode) -> Result<TypeTag> {
        let name = node.param_str("output_type")?;
        TypeTag::parse(name).ok_or_else(|| {
            Error::MalformedPlan(format!("lambda_transform: unknown output type '{}'", name))
        })
    }
}

impl Operator for LambdaTransform {
    fn kind(&self) -> NodeKind {
        NodeKind::LambdaTransform
    }

    fn clone_operator(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }

    fn execute(&mut self, ctx: &mut dyn QueryContext) -> Result<ExecStatus> {
        while let Some(block) = ctx.get_next(0)? {
            let n = block.num_rows();
            if n == 0 {
                continue;
            }
            let rows = block.to_rows();
            drop(block);
            let results = self
                .client
                .eval_rows(&self.function, rows, self.skip_undefined)?;

            let mut out = ctx.get_output_buffer();
            out.resize(1, 0);
            let column = out.column_mut(0);
            column.reserve(n);
            for v in results {
                let coerced = v.coerce_to(self.output_type).ok_or_else(|| {
                    Error::EvaluatorFailure(format!(
                        "{} returned {} where {} was declared",
                        self.function,
                        v.type_tag(),
                        self.output_type
                    ))
                })?;
                column.push(coerced);
            }
            out.resize(1, n);
            trace!(function = %self.function, rows = n, "lambda block");
            ctx.emit(out);
            return Ok(ExecStatus::Yielded);
        }
        Ok(ExecStatus::Finished)
    }
}

impl OperatorSpec for LambdaTransform {
    const KIND: NodeKind = NodeKind::LambdaTransform;

    fn from_planner_node(node: &PNode) -> Result<Self> {
        expect_kind(node, Self::KIND)?;
        Ok(LambdaTransform::new(
            node.aux::<LambdaClient>("evaluator")?,
            node.param_str("function")?,
            Self::output_type(node)?,
            node.param_flag("skip_undefined", false)?,
        ))
    }

    fn infer_type(node: &PNode, inf: &mut Inference) -> Result<Vec<TypeTag>> {
        inf.types(node.input(0)?)?;
        Ok(vec![Self::output_type(node)?])
    }

    fn infer_length(node: &PNode, inf: &mut Inference) -> Result<Option<u64>> {
        inf.length(node.input(0)?)
    }

    fn repr(node: &PNode, tagger: &mut NodeTagger) -> String {
        let function = node.param_str("function").unwrap_or("?");
        match node.inputs.first() {
            Some(input) => format!("LambdaTransform({},{})", function, tagger.tag(input)),
            None => format!("LambdaTransform({})", function),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{ints, MockContext};
    use crate::range::Range;
    use blockflow_lambda::{FunctionRegistry, LambdaConfig, LambdaWorker, SharedBufferTransport};

    fn client() -> Arc<LambdaClient> {
        let reg = FunctionRegistry::new();
        reg.register("square", |args: &[Value]| match args {
            [Value::Integer(i)] => Ok(Value::Integer(i * i)),
            other => Err(format!("square: bad args {:?}", other)),
        });
        reg.register("half", |args: &[Value]| match args {
            [Value::Integer(i)] => Ok(Value::Float(*i as f64 / 2.0)),
            _ => Err("half: bad args".into()),
        });
        let transport = SharedBufferTransport::spawn(Arc::new(LambdaWorker::new(reg))).unwrap();
        Arc::new(LambdaClient::new(Arc::new(transport), &LambdaConfig::default()))
    }

    #[test]
    fn transforms_each_row() {
        let mut op = LambdaTransform::new(client(), "square", TypeTag::Integer, false);
        let mut ctx = MockContext::new(8, vec![vec![ints(1..4), ints(4..5)]]);
        ctx.run(&mut op).unwrap();
        let got: Vec<i64> = ctx.rows().iter().map(|r| r[0].as_int().unwrap()).collect();
        assert_eq!(got, vec![1, 4, 9, 16]);
    }

    #[test]
    fn wrong_result_type_is_evaluator_failure() {
        let mut op = LambdaTransform::new(client(), "half", TypeTag::Integer, false);
        let mut ctx = MockContext::new(8, vec![vec![ints([3])]]);
        assert!(matches!(
            ctx.run(&mut op),
            Err(Error::EvaluatorFailure(_))
        ));
    }

    #[test]
    fn unknown_function_is_evaluator_failure() {
        let mut op = LambdaTransform::new(client(), "nope", TypeTag::Integer, false);
        let mut ctx = MockContext::new(8, vec![vec![ints([3])]]);
        assert!(matches!(
            ctx.run(&mut op),
            Err(Error::EvaluatorFailure(_))
        ));
    }

    #[test]
    fn node_round_trip() {
        let input = Range::make_planner_node(0, 5).unwrap();
        let node =
            LambdaTransform::make_planner_node(input, client(), "square", TypeTag::Integer, true)
                .unwrap();
        let op = LambdaTransform::from_planner_node(&node).unwrap();
        assert!(op.skip_undefined);
        let mut inf = Inference::new();
        assert_eq!(
            LambdaTransform::infer_type(&node, &mut inf).unwrap(),
            vec![TypeTag::Integer]
        );
        assert_eq!(LambdaTransform::infer_length(&node, &mut inf).unwrap(), Some(5));
        let mut tagger = NodeTagger::new();
        assert_eq!(
            LambdaTransform::repr(&node, &mut tagger),
            "LambdaTransform(square,N0)"
        );
    }
}
