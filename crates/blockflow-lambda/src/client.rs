//! Engine side of the evaluator contract.

use std::sync::Arc;
use std::time::Duration;

use blockflow_core::config::EngineConfig;
use blockflow_core::types::Value;
use tracing::{debug, trace, warn};

use crate::error::{LambdaError, Result};
use crate::protocol::{next_request_id, LambdaRequest, Payload};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaConfig {
    pub request_timeout: Duration,
    pub fast_path: bool,
}

impl LambdaConfig {
    pub fn from_engine(cfg: &EngineConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(cfg.lambda_request_timeout_ms),
            fast_path: cfg.lambda_fast_path,
        }
    }
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self::from_engine(&EngineConfig::default())
    }
}

/// Shared handle to an evaluator. Safe to call from many threads at once.
pub struct LambdaClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl LambdaClient {
    pub fn new(transport: Arc<dyn Transport>, cfg: &LambdaConfig) -> Self {
        Self {
            transport,
            timeout: cfg.request_timeout,
        }
    }

    /// Use `fast_path` if it answers a handshake, otherwise `fallback`.
    pub fn negotiate(
        fast_path: Option<Arc<dyn Transport>>,
        fallback: Arc<dyn Transport>,
        cfg: &LambdaConfig,
    ) -> Result<Self> {
        if cfg.fast_path {
            if let Some(fast) = fast_path {
                match fast.handshake(cfg.request_timeout) {
                    Ok(()) => {
                        debug!(transport = fast.name(), "lambda fast path active");
                        return Ok(Self::new(fast, cfg));
                    }
                    Err(e) => {
                        warn!(error = %e, fallback = fallback.name(), "lambda fast path unavailable");
                    }
                }
            }
        }
        fallback.handshake(cfg.request_timeout)?;
        debug!(transport = fallback.name(), "lambda transport active");
        Ok(Self::new(fallback, cfg))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// One result per row; each row is the argument list.
    pub fn eval_rows(
        &self,
        function: &str,
        rows: Vec<Vec<Value>>,
        skip_undefined: bool,
    ) -> Result<Vec<Value>> {
        self.eval(function, Payload::Rows(rows), skip_undefined)
    }

    /// One result per value; each value is the single argument.
    pub fn eval_values(
        &self,
        function: &str,
        values: Vec<Value>,
        skip_undefined: bool,
    ) -> Result<Vec<Value>> {
        self.eval(function, Payload::Values(values), skip_undefined)
    }

    fn eval(&self, function: &str, payload: Payload, skip_undefined: bool) -> Result<Vec<Value>> {
        let id = next_request_id();
        let expected = payload.len();
        let request = LambdaRequest {
            id,
            function: function.to_string(),
            payload,
            skip_undefined,
        };
        let response = self.transport.call(request, self.timeout)?;
        if response.id != id {
            return Err(LambdaError::Protocol(format!(
                "sent {}, received response for {}",
                id, response.id
            )));
        }
        let values = response.result.map_err(LambdaError::Failure)?;
        if values.len() != expected {
            return Err(LambdaError::Protocol(format!(
                "{} returned {} values for {} inputs",
                function,
                values.len(),
                expected
            )));
        }
        trace!(%id, function, rows = expected, "lambda evaluated");
        Ok(values)
    }
}

impl std::fmt::Debug for LambdaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaClient")
            .field("transport", &self.transport.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
