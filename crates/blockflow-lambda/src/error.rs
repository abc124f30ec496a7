use std::time::Duration;

use blockflow_core::id::RequestId;
use thiserror::Error;

use crate::protocol::LambdaFailure;

/// Result type local to blockflow-lambda.
pub type Result<T> = std::result::Result<T, LambdaError>;

#[derive(Debug, Error)]
pub enum LambdaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),

    #[error("{0} timed out after {1:?}")]
    Timeout(RequestId, Duration),

    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("{0}")]
    Failure(LambdaFailure),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<LambdaError> for blockflow_core::error::Error {
    fn from(e: LambdaError) -> Self {
        blockflow_core::error::Error::EvaluatorFailure(e.to_string())
    }
}
