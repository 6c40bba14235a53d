//! Request/response multiplexing over a single framed channel.
//!
//! A background reader task (the pump) owns the read half and handles
//! messages strictly in arrival order:
//!
//! - a response resolves the pending call with the same correlation ID;
//! - a callback invocation runs the registered host function on its own
//!   task and writes its result back as a response.
//!
//! Callers wait on a oneshot channel, so the pump keeps reading while they
//! are suspended. This is what makes reentrancy work: when the interpreter
//! calls back into the host in the middle of evaluating a request, the
//! callback may issue nested requests, and their responses are read by the
//! same pump while the outer call is still waiting.
//!
//! # Call frames
//!
//! With [`RequestOrdering::Serialized`] each request holds its frame's turn
//! until its response arrives. Ordinary calls share the root frame. Every
//! callback invocation runs in a fresh frame (a task-local), so nested calls
//! do not wait for the outer call that is blocked on the callback itself.
//! Tasks spawned from inside a callback do not inherit its frame.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};

use dashmap::DashMap;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};

use super::message::{CorrelationId, Message, Origin};
use super::request::Request;
use super::response::{RemoteError, Response};
use crate::callback::{CallbackContext, CallbackId, CallbackRegistry};
use crate::client::Client;
use crate::config::{ProtocolOptions, RequestOrdering};
use crate::marshal::Value;
use crate::transport::{FrameReader, FrameWriter};
use crate::{Error, Result};

tokio::task_local! {
    static CALL_FRAME: Arc<Mutex<()>>;
}

/// Why the channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseReason {
    /// The remote side went away (EOF or a read error).
    Exited,
    /// The remote side sent something that breaks the protocol.
    Framing(String),
    /// The host shut the bridge down.
    Shutdown,
}

impl CloseReason {
    /// Error delivered to calls still pending at closure.
    ///
    /// A framing failure ends the channel like an exit does; its detail goes
    /// to the exit handlers and the log.
    fn to_error(&self) -> Error {
        match self {
            CloseReason::Exited | CloseReason::Framing(_) => Error::RemoteProcessLost,
            CloseReason::Shutdown => Error::TransportClosed,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Exited => write!(f, "remote process exited"),
            CloseReason::Framing(message) => write!(f, "protocol error: {}", message),
            CloseReason::Shutdown => write!(f, "shut down by host"),
        }
    }
}

type ExitHandler = Box<dyn FnOnce(&CloseReason) + Send>;

#[derive(Default)]
struct ExitState {
    reason: Option<CloseReason>,
    handlers: Vec<ExitHandler>,
}

/// Shared protocol state behind every [`Client`] handle.
pub(crate) struct Engine {
    writer: Mutex<FrameWriter>,
    pending: DashMap<u64, oneshot::Sender<Result<Response>>>,
    callbacks: CallbackRegistry,
    next_seq: AtomicU64,
    root_frame: Arc<Mutex<()>>,
    closed: AtomicBool,
    suspect: AtomicBool,
    exit: StdMutex<ExitState>,
    options: ProtocolOptions,
}

impl Engine {
    /// Take over a channel and spawn its reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start<R, W>(reader: FrameReader<R>, writer: W, options: ProtocolOptions) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let engine = Arc::new(Self {
            writer: Mutex::new(FrameWriter::new(writer)),
            pending: DashMap::new(),
            callbacks: CallbackRegistry::new(),
            next_seq: AtomicU64::new(1),
            root_frame: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
            suspect: AtomicBool::new(false),
            exit: StdMutex::new(ExitState::default()),
            options,
        });

        tokio::spawn(pump(Arc::downgrade(&engine), reader));
        engine
    }

    pub(crate) fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::TransportClosed)
        } else if self.is_suspect() {
            Err(Error::TransportSuspect)
        } else {
            Ok(())
        }
    }

    /// Send a request and wait for its result.
    pub(crate) async fn call(&self, request: Request) -> Result<Value> {
        self.ensure_open()?;

        let frame = CALL_FRAME
            .try_with(Arc::clone)
            .unwrap_or_else(|_| Arc::clone(&self.root_frame));
        let _turn = match self.options.ordering {
            RequestOrdering::Serialized => Some(frame.lock_owned().await),
            RequestOrdering::Pipelined => None,
        };
        self.ensure_open()?;

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = CorrelationId::host(seq);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        // close() sets the flag before draining, so an entry inserted after
        // the drain is caught here.
        if self.is_closed() {
            self.pending.remove(&seq);
            return Err(Error::TransportClosed);
        }

        if let Some(observer) = &self.options.observer {
            observer.on_request(id, &request);
        }

        if let Err(err) = self.send(&Message::Request { id, request }).await {
            self.pending.remove(&seq);
            return Err(err);
        }

        let outcome = match self.options.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.remove(&seq);
                    self.suspect.store(true, Ordering::SeqCst);
                    tracing::warn!(id = %id, ?limit, "call timed out; bridge is now suspect");
                    return Err(Error::Timeout(limit));
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(result) => result?.into_result(),
            Err(_) => Err(Error::RemoteProcessLost),
        }
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.writer.lock().await.write_message(message).await
    }

    /// Handle one message from the reader. Errors are protocol violations.
    fn dispatch(self: &Arc<Self>, message: Message) -> Result<()> {
        match message {
            Message::Response { id, response } => {
                if id.origin != Origin::Host {
                    return Err(Error::ProtocolFraming(format!(
                        "response to remote-originated id {}",
                        id
                    )));
                }
                if let Some(observer) = &self.options.observer {
                    observer.on_response(id, &response);
                }
                match self.pending.remove(&id.seq) {
                    Some((_, tx)) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => tracing::debug!(id = %id, "dropping late response"),
                }
                Ok(())
            }
            Message::CallbackInvocation {
                id,
                callback_id,
                args,
            } => {
                if id.origin != Origin::Remote {
                    return Err(Error::ProtocolFraming(format!(
                        "callback invocation with host id {}",
                        id
                    )));
                }
                if let Some(observer) = &self.options.observer {
                    observer.on_callback(id, callback_id, &args);
                }
                let engine = Arc::clone(self);
                let fresh_frame = Arc::new(Mutex::new(()));
                tokio::spawn(CALL_FRAME.scope(fresh_frame, async move {
                    let response = engine.run_callback(callback_id, args).await;
                    if let Err(err) = engine.send(&Message::Response { id, response }).await {
                        tracing::debug!(id = %id, error = %err, "could not answer callback");
                    }
                }));
                Ok(())
            }
            Message::Ready { .. } => {
                tracing::debug!("ignoring repeated ready message");
                Ok(())
            }
            other => Err(Error::ProtocolFraming(format!(
                "unexpected {} message from remote",
                other.kind()
            ))),
        }
    }

    async fn run_callback(self: &Arc<Self>, callback_id: CallbackId, args: Vec<Value>) -> Response {
        let Some(callback) = self.callbacks.get(callback_id) else {
            tracing::warn!(callback_id = %callback_id, "interpreter invoked an unknown callback");
            return Response::Error(RemoteError::new(
                "UnknownCallback",
                format!("no host callback registered as {}", callback_id),
            ));
        };

        let ctx = CallbackContext::new(Client::from_engine(Arc::clone(self)), callback_id, args);
        match AssertUnwindSafe(callback.invoke(ctx)).catch_unwind().await {
            Ok(result) => Response::from(result),
            Err(_) => {
                tracing::warn!(callback_id = %callback_id, "callback panicked");
                Response::Error(RemoteError::new("HostPanic", "host callback panicked"))
            }
        }
    }

    /// Close the channel: fail pending calls, drop callbacks, run exit handlers.
    ///
    /// Idempotent; only the first reason is kept.
    pub(crate) fn close(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match reason {
            CloseReason::Shutdown => tracing::debug!("bridge closed: {}", reason),
            _ => tracing::info!("bridge closed: {}", reason),
        }

        let seqs: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for seq in seqs {
            if let Some((_, tx)) = self.pending.remove(&seq) {
                let _ = tx.send(Err(reason.to_error()));
            }
        }
        self.callbacks.clear();

        let handlers = {
            let mut exit = lock(&self.exit);
            exit.reason = Some(reason.clone());
            std::mem::take(&mut exit.handlers)
        };
        for handler in handlers {
            handler(&reason);
        }
    }

    /// Run `handler` once when the channel closes, or now if it already has.
    pub(crate) fn on_exit(&self, handler: ExitHandler) {
        let mut exit = lock(&self.exit);
        let reason = exit.reason.clone();
        match reason {
            Some(reason) => {
                drop(exit);
                handler(&reason);
            }
            None => exit.handlers.push(handler),
        }
    }

    /// Ask the server script to exit and close the write half.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let sent = {
            let mut writer = self.writer.lock().await;
            let sent = writer.write_message(&Message::Shutdown).await;
            if let Err(err) = writer.shutdown().await {
                tracing::debug!(error = %err, "closing request channel failed");
            }
            sent
        };
        self.close(CloseReason::Shutdown);
        sent
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reader task. Holds the engine weakly so dropping every handle stops it.
async fn pump<R>(engine: Weak<Engine>, mut reader: FrameReader<R>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = reader.read_message().await;
        let Some(engine) = engine.upgrade() else {
            tracing::debug!("all bridge handles dropped; reader stopping");
            return;
        };

        let reason = match next {
            Ok(Some(message)) => match engine.dispatch(message) {
                Ok(()) => continue,
                Err(err) => CloseReason::Framing(err.to_string()),
            },
            Ok(None) => CloseReason::Exited,
            Err(err @ Error::JsonParse { .. }) => CloseReason::Framing(err.to_string()),
            Err(err) => {
                tracing::debug!(error = %err, "read from remote failed");
                CloseReason::Exited
            }
        };

        engine.close(reason);
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Index;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn engine_over_duplex(
        options: ProtocolOptions,
    ) -> (Arc<Engine>, tokio::io::DuplexStream, tokio::io::DuplexStream) {
        let (host_read, remote_write) = tokio::io::duplex(64 * 1024);
        let (host_write, remote_read) = tokio::io::duplex(64 * 1024);
        let engine = Engine::start(FrameReader::new(host_read), host_write, options);
        (engine, remote_read, remote_write)
    }

    #[test]
    fn engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
        assert_send_sync::<CloseReason>();
    }

    #[test]
    fn close_reason_maps_to_errors() {
        assert!(matches!(
            CloseReason::Exited.to_error(),
            Error::RemoteProcessLost
        ));
        assert!(matches!(
            CloseReason::Shutdown.to_error(),
            Error::TransportClosed
        ));
        assert!(matches!(
            CloseReason::Framing("x".into()).to_error(),
            Error::RemoteProcessLost
        ));
    }

    #[tokio::test]
    async fn call_resolves_by_id() {
        let (engine, remote_read, mut remote_write) = engine_over_duplex(ProtocolOptions::new());

        let call = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move {
                engine
                    .call(Request::IndexAccess {
                        path: "bpy.data.objects".into(),
                        index: Index::Position(0),
                    })
                    .await
            }
        });

        let mut lines = BufReader::new(remote_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(line.starts_with('\u{1e}'));
        let Message::Request { id, .. } = serde_json::from_str::<Message>(&line[1..]).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(id, CorrelationId::host(1));

        let reply = Message::Response {
            id,
            response: Response::Ok(Value::Reference("bpy.data.objects[0]".into())),
        };
        let frame = format!("\u{1e}{}\n", serde_json::to_string(&reply).unwrap());
        remote_write.write_all(frame.as_bytes()).await.unwrap();

        let value = call.await.unwrap().unwrap();
        assert_eq!(value, Value::Reference("bpy.data.objects[0]".into()));
        assert_eq!(engine.pending_len(), 0);
    }

    #[tokio::test]
    async fn eof_fails_pending_and_runs_exit_handlers() {
        let (engine, _remote_read, remote_write) = engine_over_duplex(ProtocolOptions::new());
        let (tx, rx) = oneshot::channel();
        engine.on_exit(Box::new(move |reason| {
            let _ = tx.send(reason.clone());
        }));

        let call = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move {
                engine
                    .call(Request::EnumerateLength {
                        path: "bpy.data.objects".into(),
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;
        drop(remote_write);

        assert!(matches!(call.await.unwrap(), Err(Error::RemoteProcessLost) | Err(Error::TransportClosed)));
        assert_eq!(rx.await.unwrap(), CloseReason::Exited);
        assert!(engine.is_closed());

        let late = engine
            .call(Request::EnumerateLength {
                path: "bpy.data.objects".into(),
            })
            .await;
        assert!(matches!(late, Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn exit_handler_registered_after_close_runs_immediately() {
        let (engine, _remote_read, _remote_write) = engine_over_duplex(ProtocolOptions::new());
        engine.close(CloseReason::Shutdown);

        let (tx, rx) = oneshot::channel();
        engine.on_exit(Box::new(move |reason| {
            let _ = tx.send(reason.clone());
        }));
        assert_eq!(rx.await.unwrap(), CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn close_clears_callbacks() {
        let (engine, _remote_read, _remote_write) = engine_over_duplex(ProtocolOptions::new());
        engine.callbacks().register(|_ctx| async { Ok(Value::None) });
        assert_eq!(engine.callbacks().len(), 1);

        engine.close(CloseReason::Exited);
        engine.close(CloseReason::Shutdown);
        assert!(engine.callbacks().is_empty());
    }

    #[tokio::test]
    async fn request_from_remote_is_a_framing_error() {
        let (engine, _remote_read, mut remote_write) = engine_over_duplex(ProtocolOptions::new());
        let (tx, rx) = oneshot::channel();
        engine.on_exit(Box::new(move |reason| {
            let _ = tx.send(reason.clone());
        }));

        let bogus = Message::Request {
            id: CorrelationId::remote(1),
            request: Request::EnumerateLength {
                path: "bpy.data.objects".into(),
            },
        };
        let frame = format!("\u{1e}{}\n", serde_json::to_string(&bogus).unwrap());
        remote_write.write_all(frame.as_bytes()).await.unwrap();

        assert!(matches!(rx.await.unwrap(), CloseReason::Framing(_)));
    }
}
