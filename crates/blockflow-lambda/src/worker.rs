//! Evaluator side of the contract: named user functions and the framed
//! stream server.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use blockflow_core::types::Value;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::{read_frame, write_frame};
use crate::protocol::{
    FailureKind, LambdaFailure, LambdaRequest, LambdaResponse, Payload, PING_FUNCTION,
};

/// A user function: arguments in, one value or an error message out.
pub type UserFunction = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<HashMap<String, UserFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous function.
    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.write().insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<UserFunction> {
        self.functions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LambdaWorker {
    registry: FunctionRegistry,
}

impl LambdaWorker {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Evaluate a request. The first failing row fails the whole batch.
    pub fn evaluate(
        &self,
        request: &LambdaRequest,
    ) -> std::result::Result<Vec<Value>, LambdaFailure> {
        if request.function == PING_FUNCTION {
            return Ok(Vec::new());
        }
        let f = self.registry.get(&request.function).ok_or_else(|| {
            LambdaFailure::new(
                FailureKind::UnknownFunction,
                format!("no function named '{}'", request.function),
            )
        })?;
        let skip = request.skip_undefined;
        let call = |args: &[Value]| -> std::result::Result<Value, LambdaFailure> {
            if skip && args.iter().any(Value::is_undefined) {
                return Ok(Value::Undefined);
            }
            f(args).map_err(|msg| LambdaFailure::new(FailureKind::UserError, msg))
        };
        match &request.payload {
            Payload::Rows(rows) => rows.iter().map(|row| call(row)).collect(),
            Payload::Values(values) => values
                .iter()
                .map(|v| call(std::slice::from_ref(v)))
                .collect(),
        }
    }

    pub fn handle(&self, request: LambdaRequest) -> LambdaResponse {
        LambdaResponse {
            id: request.id,
            result: self.evaluate(&request),
        }
    }

    /// Serve framed requests from `reader` until the peer closes the stream.
    /// Each request runs on its own thread, so responses may be written out
    /// of order; the client pairs them by id.
    pub fn serve_stream<R, W>(&self, mut reader: R, writer: W) -> Result<()>
    where
        R: Read,
        W: Write + Send,
    {
        let writer = Mutex::new(writer);
        let writer = &writer;
        std::thread::scope(|s| -> Result<()> {
            while let Some(request) = read_frame::<_, LambdaRequest>(&mut reader)? {
                debug!(id = %request.id, function = %request.function, "lambda request");
                s.spawn(move || {
                    let response = self.handle(request);
                    let mut w = writer.lock();
                    if let Err(e) = write_frame(&mut *w, &response) {
                        warn!(id = %response.id, error = %e, "writing lambda response failed");
                    }
                });
            }
            Ok(())
        })
    }
}
