//! Protocol host loop
//!
//! Line-delimited JSON over a reader/writer pair. The loop greets the host,
//! then reads one message at a time and answers each request with exactly
//! one `{ok}` or `{error, name, stack?}` line.
//!
//! While a synchronous override waits for its completion, [`Channel`]
//! keeps reading: nested requests are dispatched and answered in place, and
//! the wait ends when the matching `{complete: ...}` arrives.

use std::io::{BufRead, Write};

use serde_json::{json, Map, Value as Json};
use tether_engine::Exception;

use crate::api::{Callback, CompleteRequest, Request};
use crate::error::{KernelError, KernelResult};
use crate::kernel::{CallbackChannel, Kernel};

/// Greeting sent before the first read.
pub const GREETING: &str = concat!("tether-kernel@", env!("CARGO_PKG_VERSION"));

/// A classified inbound line.
#[derive(Debug)]
enum Inbound {
    Exit(i32),
    Request(Request),
    Complete(CompleteRequest),
    Malformed(KernelError),
}

fn classify(line: &str) -> Inbound {
    let message: Json = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => return Inbound::Malformed(KernelError::MalformedRequest(format!("invalid JSON: {}", e))),
    };
    let Some(fields) = message.as_object() else {
        return Inbound::Malformed(KernelError::MalformedRequest("message must be a JSON object".to_string()));
    };
    if let Some(code) = fields.get("exit") {
        return match code.as_i64().and_then(|c| i32::try_from(c).ok()) {
            Some(code) => Inbound::Exit(code),
            None => Inbound::Malformed(KernelError::MalformedRequest(format!(
                "exit code must be a 32-bit integer, got {}",
                code
            ))),
        };
    }
    if let Some(body) = fields.get("complete") {
        return match serde_json::from_value(body.clone()) {
            Ok(complete) => Inbound::Complete(complete),
            Err(e) => Inbound::Malformed(KernelError::MalformedRequest(format!("invalid completion: {}", e))),
        };
    }
    if !fields.contains_key("api") {
        return Inbound::Malformed(KernelError::MalformedRequest("missing 'api' field".to_string()));
    }
    match serde_json::from_value(message) {
        Ok(request) => Inbound::Request(request),
        Err(e) => Inbound::Malformed(KernelError::MalformedRequest(e.to_string())),
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Both ends of the protocol stream.
pub struct Channel<R, W> {
    reader: R,
    writer: W,
    exit: Option<i32>,
    trace_wire: bool,
}

impl<R: BufRead, W: Write> Channel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            exit: None,
            trace_wire: false,
        }
    }

    /// Log every line at `trace` level.
    pub fn with_trace_wire(mut self, enabled: bool) -> Self {
        self.trace_wire = enabled;
        self
    }

    /// Exit code received while a callback was outstanding.
    pub fn pending_exit(&self) -> Option<i32> {
        self.exit
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Next non-blank message, or `None` at end of input.
    fn read_inbound(&mut self) -> KernelResult<Option<Inbound>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(None);
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    return Ok(Some(Inbound::Malformed(KernelError::MalformedRequest(format!(
                        "invalid UTF-8: {}",
                        e
                    )))))
                }
            };
            if line.is_empty() {
                continue;
            }
            if self.trace_wire {
                tracing::trace!(target: "tether::wire", "<- {}", line);
            }
            return Ok(Some(classify(line)));
        }
    }

    fn write_message(&mut self, message: &Json) -> KernelResult<()> {
        let line = serde_json::to_string(message)?;
        if self.trace_wire {
            tracing::trace!(target: "tether::wire", "-> {}", line);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_response(&mut self, result: KernelResult<Json>) -> KernelResult<()> {
        match result {
            Ok(value) => self.write_message(&json!({ "ok": value })),
            Err(e) => self.write_error(&e),
        }
    }

    fn write_error(&mut self, error: &KernelError) -> KernelResult<()> {
        tracing::debug!(name = error.name(), error = %error, "request failed");
        let mut message = Map::new();
        message.insert("error".to_string(), Json::String(error.to_string()));
        message.insert("name".to_string(), Json::String(error.name().to_string()));
        if let Some(stack) = error.stack() {
            message.insert("stack".to_string(), Json::String(stack.to_string()));
        }
        self.write_message(&Json::Object(message))
    }
}

impl<R: BufRead, W: Write> CallbackChannel for Channel<R, W> {
    fn round_trip(&mut self, kernel: &mut Kernel, callback: Callback) -> KernelResult<Json> {
        let cbid = callback.cbid.clone();
        if self.exit.is_some() {
            return Err(KernelError::Interrupted(cbid));
        }
        self.write_message(&json!({ "callback": callback }))?;

        loop {
            match self.read_inbound()? {
                None => {
                    tracing::warn!(cbid = %cbid, "input closed while waiting for callback");
                    return Err(KernelError::Interrupted(cbid));
                }
                Some(Inbound::Exit(code)) => {
                    tracing::info!(code, cbid = %cbid, "exit requested during callback");
                    self.exit = Some(code);
                    return Err(KernelError::Interrupted(cbid));
                }
                Some(Inbound::Complete(done)) if done.cbid == cbid => {
                    return match done.err {
                        Some(message) => {
                            let name = done.name.unwrap_or_else(|| "Error".to_string());
                            Err(KernelError::Thrown(Exception::new(name, message)))
                        }
                        None => Ok(done.result.unwrap_or(Json::Null)),
                    };
                }
                Some(Inbound::Complete(other)) => {
                    self.write_error(&KernelError::CallbackNotFound(other.cbid))?;
                }
                Some(Inbound::Request(request)) => {
                    let result = process_request(kernel, self, request, true);
                    self.write_response(result)?;
                    // an exit read by a deeper wait unwinds every wait
                    if self.exit.is_some() {
                        return Err(KernelError::Interrupted(cbid));
                    }
                }
                Some(Inbound::Malformed(e)) => {
                    tracing::warn!(error = %e, "malformed message");
                    self.write_error(&e)?;
                }
            }
        }
    }
}

/// Dispatch one request. Async requests are refused while nested inside a
/// synchronous callback.
fn process_request<R: BufRead, W: Write>(
    kernel: &mut Kernel,
    channel: &mut Channel<R, W>,
    request: Request,
    nested: bool,
) -> KernelResult<Json> {
    if nested && request.is_async() {
        if let (Request::Begin(begin), Some(sync)) = (&request, kernel.sync_in_progress()) {
            return Err(KernelError::AsyncWhileSyncCallback {
                method: begin.method.clone(),
                sync: sync.to_string(),
            });
        }
        return Err(KernelError::NestedAsyncNotAllowed(request.api().to_string()));
    }
    kernel.dispatch(channel, request)
}

// ============================================================================
// HostLoop
// ============================================================================

/// A kernel bound to a channel.
pub struct HostLoop<R, W> {
    kernel: Kernel,
    channel: Channel<R, W>,
}

impl<R: BufRead, W: Write> HostLoop<R, W> {
    pub fn new(kernel: Kernel, channel: Channel<R, W>) -> Self {
        Self { kernel, channel }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn into_channel(self) -> Channel<R, W> {
        self.channel
    }

    /// Serve until `exit` or end of input. Returns the exit code.
    pub fn run(&mut self) -> KernelResult<i32> {
        self.channel.write_message(&json!({ "hello": GREETING }))?;

        loop {
            if let Some(code) = self.channel.pending_exit() {
                tracing::info!(code, "exiting");
                return Ok(code);
            }
            let Some(inbound) = self.channel.read_inbound()? else {
                tracing::info!("input closed");
                return Ok(0);
            };
            match inbound {
                Inbound::Exit(code) => {
                    tracing::info!(code, "exiting");
                    return Ok(code);
                }
                Inbound::Request(request) => {
                    let result = process_request(&mut self.kernel, &mut self.channel, request, false);
                    self.channel.write_response(result)?;
                }
                Inbound::Complete(done) => {
                    tracing::warn!(cbid = %done.cbid, "completion with no callback outstanding");
                    self.channel.write_error(&KernelError::CallbackNotFound(done.cbid))?;
                }
                Inbound::Malformed(e) => {
                    tracing::warn!(error = %e, "malformed message");
                    self.channel.write_error(&e)?;
                }
            }
        }
    }
}
