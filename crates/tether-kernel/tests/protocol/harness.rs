//! Host-side test harness
//!
//! A [`Session`] owns both ends of an in-memory pipe pair and the thread
//! running the kernel. The kernel is built on that thread since its object
//! handles are not `Send`.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{json, Value as Json};
use tether_kernel::{Channel, HostLoop, Kernel, KernelOptions, KernelResult};

use crate::fixtures::{self, Fixture};

/// How long to wait for a reply that is expected to arrive.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Pipes
// ============================================================================

/// Read half of an in-memory pipe. Reads block until data arrives, the
/// writer is dropped (EOF), or the optional timeout expires.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
    timeout: Option<Duration>,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            let next = match self.timeout {
                Some(timeout) => match self.rx.recv_timeout(timeout) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "no reply from kernel"))
                    }
                    Err(RecvTimeoutError::Disconnected) => return Ok(0),
                },
                None => match self.rx.recv() {
                    Ok(chunk) => chunk,
                    Err(_) => return Ok(0),
                },
            };
            self.chunk = next;
            self.pos = 0;
        }
        let n = out.len().min(self.chunk.len() - self.pos);
        out[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Write half of an in-memory pipe.
pub struct PipeWriter(Sender<Vec<u8>>);

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn pipe(timeout: Option<Duration>) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter(tx),
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            timeout,
        },
    )
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    input: Option<PipeWriter>,
    output: BufReader<PipeReader>,
    handle: Option<JoinHandle<KernelResult<i32>>>,
    pub hello: Json,
}

impl Session {
    /// Start a kernel installing into the fixture's directory.
    pub fn start(fixture: &Fixture) -> Session {
        let install_dir = fixture.install_dir();
        let loads = fixture.loads.clone();
        let (input, kernel_in) = pipe(None);
        let (kernel_out, output) = pipe(Some(REPLY_TIMEOUT));

        let handle = std::thread::spawn(move || {
            let kernel = Kernel::new(
                KernelOptions::default().with_install_dir(install_dir),
                fixtures::registry(loads),
            );
            let mut host = HostLoop::new(kernel, Channel::new(BufReader::new(kernel_in), kernel_out));
            host.run()
        });

        let mut session = Session {
            input: Some(input),
            output: BufReader::new(output),
            handle: Some(handle),
            hello: Json::Null,
        };
        session.hello = session.recv();
        session
    }

    /// Start a kernel with the fixture package already loaded.
    pub fn loaded(fixture: &Fixture) -> Session {
        let mut session = Session::start(fixture);
        session.ok(fixture.load_request());
        session
    }

    pub fn send(&mut self, message: Json) {
        let mut line = message.to_string();
        line.push('\n');
        self.input
            .as_mut()
            .expect("session input closed")
            .write_all(line.as_bytes())
            .expect("kernel hung up");
    }

    /// Send raw bytes, for framing tests.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.input
            .as_mut()
            .expect("session input closed")
            .write_all(bytes)
            .expect("kernel hung up");
    }

    /// Next line from the kernel, or `None` if nothing arrives in time.
    pub fn try_recv(&mut self) -> Option<Json> {
        let mut line = String::new();
        match self.output.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(serde_json::from_str(&line).expect("kernel wrote invalid JSON")),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => None,
            Err(e) => panic!("reading kernel output: {}", e),
        }
    }

    /// Assert that the kernel writes nothing for `wait`.
    pub fn assert_silent(&mut self, wait: Duration) {
        let saved = self.output.get_mut().timeout.replace(wait);
        let message = self.try_recv();
        self.output.get_mut().timeout = saved;
        assert!(message.is_none(), "expected no output, got {}", message.unwrap_or_default());
    }

    pub fn recv(&mut self) -> Json {
        self.try_recv().expect("no message from kernel")
    }

    /// Send a request and return its raw response line.
    pub fn request(&mut self, request: Json) -> Json {
        self.send(request);
        self.recv()
    }

    /// Send a request that must succeed; returns the `ok` payload.
    pub fn ok(&mut self, request: Json) -> Json {
        let response = self.request(request.clone());
        match response.get("ok") {
            Some(ok) => ok.clone(),
            None => panic!("{} failed: {}", request, response),
        }
    }

    /// Send a request that must fail; returns the error `name`.
    pub fn error(&mut self, request: Json) -> String {
        let response = self.request(request.clone());
        match response.get("name").and_then(Json::as_str) {
            Some(name) if response.get("error").is_some() => name.to_string(),
            _ => panic!("{} should have failed: {}", request, response),
        }
    }

    /// Close the kernel's input and wait for it to stop.
    pub fn finish(mut self) -> i32 {
        self.input = None;
        self.join()
    }

    /// Send `{exit}` and wait for the kernel to stop.
    pub fn exit(mut self, code: i32) -> i32 {
        self.send(json!({ "exit": code }));
        self.join()
    }

    fn join(&mut self) -> i32 {
        let handle = self.handle.take().expect("session already joined");
        handle
            .join()
            .expect("kernel thread panicked")
            .expect("host loop failed")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.input = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// `{"$kernel.byref": ...}` for a token.
pub fn byref(token: &str) -> Json {
    json!({ "$kernel.byref": token })
}
