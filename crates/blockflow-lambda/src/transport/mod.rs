//! Transports carry one `LambdaRequest` to an evaluator and bring back the
//! matching `LambdaResponse`.

mod shared;
mod stream;

pub use shared::SharedBufferTransport;
pub use stream::StreamTransport;

use std::time::Duration;

use crate::error::{LambdaError, Result};
use crate::protocol::{next_request_id, LambdaRequest};
use crate::protocol::LambdaResponse;

pub trait Transport: Send + Sync {
    /// Send `request` and block until its response arrives or `timeout` passes.
    fn call(&self, request: LambdaRequest, timeout: Duration) -> Result<LambdaResponse>;

    /// Check that the evaluator behind this transport answers at all.
    fn handshake(&self, timeout: Duration) -> Result<()> {
        let resp = self.call(LambdaRequest::ping(next_request_id()), timeout)?;
        resp.result.map(|_| ()).map_err(LambdaError::Failure)
    }

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}
