//! Framed request/response transport over a byte stream.
//!
//! Writes are serialized through a mutex so frames never interleave. A
//! reader thread decodes responses and parks each one in the pending table
//! under its request id; callers wait on a condvar for their own id. Many
//! threads may have requests in flight at once and responses may come back
//! in any order.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use blockflow_core::id::RequestId;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{LambdaError, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{LambdaRequest, LambdaResponse};

use super::Transport;

#[derive(Default)]
struct Pending {
    /// Outstanding requests; `Some` once the response has arrived.
    slots: HashMap<RequestId, Option<LambdaResponse>>,
    /// Set when the reader thread stops; the reason is reported to callers.
    closed: Option<String>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    ready: Condvar,
}

impl Shared {
    fn close(&self, reason: String) {
        let mut p = self.pending.lock();
        if p.closed.is_none() {
            p.closed = Some(reason);
        }
        self.ready.notify_all();
    }
}

type Closer = Box<dyn Fn() + Send + Sync>;

pub struct StreamTransport {
    writer: Mutex<Box<dyn Write + Send>>,
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    closer: Option<Closer>,
}

impl StreamTransport {
    /// Wrap a stream pair. The reader half is consumed by a background thread.
    pub fn new<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("blockflow-lambda-reader".into())
            .spawn(move || reader_loop(reader, &thread_shared))?;
        Ok(Self {
            writer: Mutex::new(Box::new(writer)),
            shared,
            reader: Some(handle),
            closer: None,
        })
    }

    /// Install a hook that unblocks the reader thread (e.g. socket shutdown).
    /// With a closer, dropping the transport joins the reader.
    pub fn with_closer(mut self, closer: impl Fn() + Send + Sync + 'static) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    #[cfg(unix)]
    pub fn from_unix_stream(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Ok(Self::new(reader, stream)?.with_closer(move || {
            let _ = closer.shutdown(std::net::Shutdown::Both);
        }))
    }

    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
            LambdaError::Unavailable(format!("connect {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "lambda stream connected");
        Self::from_unix_stream(stream)
    }

    pub fn connect_tcp(addr: impl std::net::ToSocketAddrs) -> Result<Self> {
        let stream = std::net::TcpStream::connect(addr)
            .map_err(|e| LambdaError::Unavailable(format!("tcp connect: {}", e)))?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Ok(Self::new(reader, stream)?.with_closer(move || {
            let _ = closer.shutdown(std::net::Shutdown::Both);
        }))
    }

    /// Requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.shared.pending.lock().slots.len()
    }
}

fn reader_loop<R: Read>(mut reader: R, shared: &Shared) {
    loop {
        match read_frame::<_, LambdaResponse>(&mut reader) {
            Ok(Some(resp)) => {
                let mut p = shared.pending.lock();
                match p.slots.get_mut(&resp.id) {
                    Some(slot) => {
                        *slot = Some(resp);
                        shared.ready.notify_all();
                    }
                    None => warn!(id = %resp.id, "dropping response for unknown or abandoned request"),
                }
            }
            Ok(None) => {
                shared.close("stream closed by evaluator".into());
                return;
            }
            Err(e) => {
                shared.close(e.to_string());
                return;
            }
        }
    }
}

impl Transport for StreamTransport {
    fn call(&self, request: LambdaRequest, timeout: Duration) -> Result<LambdaResponse> {
        let id = request.id;
        {
            let mut p = self.shared.pending.lock();
            if let Some(reason) = &p.closed {
                return Err(LambdaError::Disconnected(reason.clone()));
            }
            if p.slots.contains_key(&id) {
                return Err(LambdaError::Protocol(format!("{} already in flight", id)));
            }
            p.slots.insert(id, None);
        }

        let sent = {
            let mut w = self.writer.lock();
            write_frame(&mut **w, &request)
        };
        if let Err(e) = sent {
            self.shared.pending.lock().slots.remove(&id);
            return Err(e);
        }

        let deadline = Instant::now() + timeout;
        let mut p = self.shared.pending.lock();
        loop {
            if let Some(Some(_)) = p.slots.get(&id) {
                if let Some(Some(resp)) = p.slots.remove(&id) {
                    return Ok(resp);
                }
            }
            if let Some(reason) = p.closed.clone() {
                p.slots.remove(&id);
                return Err(LambdaError::Disconnected(reason));
            }
            if Instant::now() >= deadline {
                p.slots.remove(&id);
                return Err(LambdaError::Timeout(id, timeout));
            }
            self.shared.ready.wait_until(&mut p, deadline);
        }
    }

    fn name(&self) -> &'static str {
        "stream"
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.shared.close("transport dropped".into());
        if let Some(closer) = &self.closer {
            closer();
            if let Some(handle) = self.reader.take() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
