#![forbid(unsafe_code)]
//! blockflow-lambda: per-row user functions evaluated outside the operator.
//!
//! The engine talks to an evaluator through `LambdaClient`, which sends
//! `LambdaRequest`s over a `Transport` and pairs each `LambdaResponse` with
//! its caller by request id. Two transports exist:
//!
//! - `StreamTransport`: length-prefixed JSON frames over any byte stream
//!   (Unix socket, TCP, in-memory pipe). Many callers may be in flight.
//! - `SharedBufferTransport`: a single exchange slot shared with an
//!   in-process worker thread. Lower overhead, one request at a time.
//!
//! `LambdaClient::negotiate` tries the shared buffer first and falls back to
//! the stream transport without the caller noticing.

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use client::{LambdaClient, LambdaConfig};
pub use error::{LambdaError, Result};
pub use protocol::{FailureKind, LambdaFailure, LambdaRequest, LambdaResponse, Payload};
pub use transport::{SharedBufferTransport, StreamTransport, Transport};
pub use worker::{FunctionRegistry, LambdaWorker, UserFunction};
