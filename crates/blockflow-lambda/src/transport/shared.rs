//! Single-slot shared-buffer transport.
//!
//! The caller and an in-process worker thread exchange requests through one
//! byte buffer guarded by a mutex. Callers take turns; each turn writes the
//! request into the slot, flips the state, and waits for the worker to
//! replace it with the response.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use blockflow_core::id::RequestId;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{LambdaError, Result};
use crate::protocol::{FailureKind, LambdaFailure, LambdaRequest, LambdaResponse};
use crate::worker::LambdaWorker;

use super::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Request,
    Processing,
    Response,
    /// The caller gave up; the worker discards its result.
    Abandoned,
    Closed,
}

struct Slot {
    state: SlotState,
    buffer: Vec<u8>,
}

struct Exchange {
    slot: Mutex<Slot>,
    changed: Condvar,
}

pub struct SharedBufferTransport {
    exchange: Arc<Exchange>,
    turn: Mutex<()>,
    worker: Option<JoinHandle<()>>,
}

impl SharedBufferTransport {
    /// Start a worker thread serving `worker` through a fresh slot.
    pub fn spawn(worker: Arc<LambdaWorker>) -> Result<Self> {
        Self::with_capacity(worker, 64 * 1024)
    }

    pub fn with_capacity(worker: Arc<LambdaWorker>, capacity: usize) -> Result<Self> {
        let exchange = Arc::new(Exchange {
            slot: Mutex::new(Slot {
                state: SlotState::Idle,
                buffer: Vec::with_capacity(capacity),
            }),
            changed: Condvar::new(),
        });
        let thread_exchange = exchange.clone();
        let handle = std::thread::Builder::new()
            .name("blockflow-lambda-shared".into())
            .spawn(move || serve_slot(&thread_exchange, &worker))
            .map_err(|e| LambdaError::Unavailable(format!("spawn shared-buffer worker: {}", e)))?;
        debug!(capacity, "shared-buffer transport started");
        Ok(Self {
            exchange,
            turn: Mutex::new(()),
            worker: Some(handle),
        })
    }
}

fn serve_slot(exchange: &Exchange, worker: &LambdaWorker) {
    loop {
        let body = {
            let mut slot = exchange.slot.lock();
            while slot.state != SlotState::Request && slot.state != SlotState::Closed {
                exchange.changed.wait(&mut slot);
            }
            if slot.state == SlotState::Closed {
                return;
            }
            slot.state = SlotState::Processing;
            std::mem::take(&mut slot.buffer)
        };

        let reply = respond(worker, &body);

        let mut slot = exchange.slot.lock();
        match slot.state {
            SlotState::Closed => return,
            SlotState::Abandoned => slot.state = SlotState::Idle,
            _ => {
                slot.buffer = reply;
                slot.state = SlotState::Response;
            }
        }
        exchange.changed.notify_all();
    }
}

fn respond(worker: &LambdaWorker, body: &[u8]) -> Vec<u8> {
    let response = match serde_json::from_slice::<LambdaRequest>(body) {
        Ok(request) => worker.handle(request),
        Err(e) => LambdaResponse {
            id: RequestId::new(0),
            result: Err(LambdaFailure::new(FailureKind::Protocol, e.to_string())),
        },
    };
    let id = response.id;
    serde_json::to_vec(&response).unwrap_or_else(|e| {
        warn!(%id, error = %e, "encoding shared-buffer response failed");
        let fallback = LambdaResponse {
            id,
            result: Err(LambdaFailure::new(FailureKind::Protocol, e.to_string())),
        };
        serde_json::to_vec(&fallback).unwrap_or_default()
    })
}

impl Transport for SharedBufferTransport {
    fn call(&self, request: LambdaRequest, timeout: Duration) -> Result<LambdaResponse> {
        let id = request.id;
        let body = serde_json::to_vec(&request)?;
        let deadline = Instant::now() + timeout;

        let _turn = self
            .turn
            .try_lock_until(deadline)
            .ok_or(LambdaError::Timeout(id, timeout))?;

        let ex = &self.exchange;
        let mut slot = ex.slot.lock();

        // A previous caller may have abandoned a request the worker is still on.
        while slot.state != SlotState::Idle {
            if slot.state == SlotState::Closed {
                return Err(LambdaError::Disconnected("shared buffer closed".into()));
            }
            if ex.changed.wait_until(&mut slot, deadline).timed_out()
                && slot.state != SlotState::Idle
            {
                return Err(LambdaError::Timeout(id, timeout));
            }
        }

        slot.buffer.clear();
        slot.buffer.extend_from_slice(&body);
        slot.state = SlotState::Request;
        ex.changed.notify_all();

        loop {
            match slot.state {
                SlotState::Response => {
                    let decoded = serde_json::from_slice::<LambdaResponse>(&slot.buffer);
                    slot.state = SlotState::Idle;
                    ex.changed.notify_all();
                    let resp = decoded?;
                    if resp.id != id {
                        return Err(LambdaError::Protocol(format!(
                            "expected response for {}, got {}",
                            id, resp.id
                        )));
                    }
                    return Ok(resp);
                }
                SlotState::Closed => {
                    return Err(LambdaError::Disconnected("shared buffer closed".into()));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                slot.state = match slot.state {
                    // Not picked up yet: withdraw it.
                    SlotState::Request => SlotState::Idle,
                    _ => SlotState::Abandoned,
                };
                ex.changed.notify_all();
                return Err(LambdaError::Timeout(id, timeout));
            }
            ex.changed.wait_until(&mut slot, deadline);
        }
    }

    fn name(&self) -> &'static str {
        "shared-buffer"
    }
}

impl Drop for SharedBufferTransport {
    fn drop(&mut self) {
        {
            let mut slot = self.exchange.slot.lock();
            slot.state = SlotState::Closed;
            self.exchange.changed.notify_all();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for SharedBufferTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBufferTransport")
            .field("state", &self.exchange.slot.lock().state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use crate::worker::FunctionRegistry;
    use blockflow_core::types::Value;

    fn transport() -> SharedBufferTransport {
        let reg = FunctionRegistry::new();
        reg.register("echo", |args: &[Value]| Ok(args[0].clone()));
        reg.register("nap", |_args: &[Value]| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Value::Undefined)
        });
        SharedBufferTransport::spawn(Arc::new(LambdaWorker::new(reg))).unwrap()
    }

    fn request(id: u64, function: &str) -> LambdaRequest {
        LambdaRequest {
            id: RequestId::new(id),
            function: function.into(),
            payload: Payload::Values(vec![Value::Integer(id as i64)]),
            skip_undefined: false,
        }
    }

    #[test]
    fn round_trip_and_handshake() {
        let t = transport();
        t.handshake(Duration::from_secs(5)).unwrap();
        let resp = t.call(request(7, "echo"), Duration::from_secs(5)).unwrap();
        assert_eq!(resp.id, RequestId::new(7));
        assert_eq!(resp.result.unwrap(), vec![Value::Integer(7)]);
    }

    #[test]
    fn slot_recovers_after_timeout() {
        let t = transport();
        let err = t
            .call(request(1, "nap"), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, LambdaError::Timeout(..)));
        // The abandoned call finishes in the background, then the slot frees up.
        let resp = t.call(request(2, "echo"), Duration::from_secs(5)).unwrap();
        assert_eq!(resp.result.unwrap(), vec![Value::Integer(2)]);
    }
}
