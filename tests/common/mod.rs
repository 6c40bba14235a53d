//! Test utilities for libbridge integration tests.
//!
//! [`FakeRemote`] plays the interpreter's side of the channel over an
//! in-memory duplex pipe, so tests can script exactly which messages arrive
//! and in which order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use libbridge::protocol::{CorrelationId, Message, RemoteError, Request, Response};
use libbridge::transport::{FrameReader, FRAME_PREFIX};
use libbridge::{CallbackId, Client, ProtocolOptions, Value};
use tokio::io::{duplex, AsyncWrite, AsyncWriteExt, DuplexStream};

const PIPE_CAPACITY: usize = 256 * 1024;

/// Host write half that counts every byte it forwards.
pub struct CountingWriter {
    inner: DuplexStream,
    written: Arc<AtomicUsize>,
}

impl AsyncWrite for CountingWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.written.fetch_add(n, Ordering::SeqCst);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Scripted interpreter end of a [`Client`] channel.
pub struct FakeRemote {
    reader: FrameReader<DuplexStream>,
    writer: DuplexStream,
    received: Arc<AtomicUsize>,
    next_seq: u64,
}

/// Connect a client to a fresh fake interpreter.
pub fn connect(options: ProtocolOptions) -> (Client, FakeRemote) {
    let (host_read, remote_write) = duplex(PIPE_CAPACITY);
    let (remote_read, host_write) = duplex(PIPE_CAPACITY);
    let received = Arc::new(AtomicUsize::new(0));

    let writer = CountingWriter {
        inner: host_write,
        written: Arc::clone(&received),
    };
    let client = Client::connect(host_read, writer, options);

    let remote = FakeRemote {
        reader: FrameReader::new(remote_read),
        writer: remote_write,
        received,
        next_seq: 1,
    };
    (client, remote)
}

impl FakeRemote {
    /// Total bytes the host has written to the channel so far.
    pub fn bytes_received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Next message from the host; panics at EOF.
    pub async fn next_message(&mut self) -> Message {
        self.reader
            .read_message()
            .await
            .expect("host sent a malformed frame")
            .expect("host closed the channel")
    }

    /// Next request from the host; panics on any other message.
    pub async fn next_request(&mut self) -> (CorrelationId, Request) {
        match self.next_message().await {
            Message::Request { id, request } => (id, request),
            other => panic!("expected a request, got {:?}", other),
        }
    }

    /// Next response from the host (to a callback invocation).
    pub async fn next_response(&mut self) -> (CorrelationId, Response) {
        match self.next_message().await {
            Message::Response { id, response } => (id, response),
            other => panic!("expected a response, got {:?}", other),
        }
    }

    pub async fn send(&mut self, message: &Message) {
        let json = serde_json::to_string(message).expect("message serializes");
        self.send_line(&format!("{}{}", FRAME_PREFIX, json)).await;
    }

    /// Write one raw line, framed or not.
    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("host end is open");
        self.writer.flush().await.expect("host end is open");
    }

    pub async fn respond(&mut self, id: CorrelationId, response: Response) {
        self.send(&Message::Response { id, response }).await;
    }

    pub async fn ok(&mut self, id: CorrelationId, value: Value) {
        self.respond(id, Response::Ok(value)).await;
    }

    pub async fn fail(&mut self, id: CorrelationId, kind: &str, message: &str) {
        self.respond(id, Response::Error(RemoteError::new(kind, message)))
            .await;
    }

    /// Invoke a host callback and return the correlation ID used.
    pub async fn invoke_callback(&mut self, callback_id: CallbackId, args: Vec<Value>) -> CorrelationId {
        let id = CorrelationId::remote(self.next_seq);
        self.next_seq += 1;
        self.send(&Message::CallbackInvocation {
            id,
            callback_id,
            args,
        })
        .await;
        id
    }

    /// Serve property reads and writes from an in-memory store until the
    /// host closes the channel or sends shutdown.
    ///
    /// Unknown properties fail with `AttributeError`; every other operation
    /// fails with `NotImplementedError`.
    pub async fn serve_store(mut self) {
        let mut store: HashMap<(String, String), Value> = HashMap::new();
        loop {
            let message = match self.reader.read_message().await {
                Ok(Some(message)) => message,
                _ => return,
            };
            let (id, request) = match message {
                Message::Request { id, request } => (id, request),
                Message::Shutdown => return,
                other => panic!("unexpected message {:?}", other),
            };
            let response = match request {
                Request::GetProperty { path, member } => {
                    match store.get(&(path.to_string(), member.clone())) {
                        Some(value) => Response::Ok(value.clone()),
                        None => Response::Error(RemoteError::new(
                            "AttributeError",
                            format!("'{}' has no attribute '{}'", path, member),
                        )),
                    }
                }
                Request::SetProperty { path, member, value } => {
                    store.insert((path.to_string(), member), value);
                    Response::Ok(Value::None)
                }
                other => Response::Error(RemoteError::new(
                    "NotImplementedError",
                    other.op_name(),
                )),
            };
            self.respond(id, response).await;
        }
    }
}

/// Whether `program` can be run from PATH.
pub fn has_program(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
