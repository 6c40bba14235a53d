//! Observation of traffic on the bridge.
//!
//! An observer sees every request the host sends, every response it
//! receives, and every callback invocation the interpreter makes. It is for
//! observation only and cannot alter the traffic.

use crate::callback::CallbackId;
use crate::marshal::Value;
use crate::protocol::{CorrelationId, Request, Response};

/// Observer for bridge traffic.
///
/// # Implementation Notes
///
/// - Methods are called synchronously from the calling task or the reader
///   task; a slow observer delays every call.
/// - Methods have default empty implementations for selective observation.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use libbridge::{BridgeObserver, CorrelationId, Request};
///
/// #[derive(Default)]
/// struct CountingObserver {
///     requests: AtomicUsize,
/// }
///
/// impl BridgeObserver for CountingObserver {
///     fn on_request(&self, _id: CorrelationId, _request: &Request) {
///         self.requests.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait BridgeObserver: Send + Sync {
    /// Called just before a request is written.
    fn on_request(&self, id: CorrelationId, request: &Request) {
        let _ = (id, request);
    }

    /// Called when a response to a host request arrives, including late
    /// responses to abandoned calls.
    fn on_response(&self, id: CorrelationId, response: &Response) {
        let _ = (id, response);
    }

    /// Called when the interpreter invokes a host callback.
    fn on_callback(&self, id: CorrelationId, callback_id: CallbackId, args: &[Value]) {
        let _ = (id, callback_id, args);
    }
}

/// Observer that logs bridge traffic using tracing.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use libbridge::{Bridge, LogLevel, LoggingObserver};
///
/// let bridge = Bridge::builder()
///     .observer(Arc::new(LoggingObserver::with_level(LogLevel::Info)))
///     .start()
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver {
    level: LogLevel,
}

/// Log level for LoggingObserver.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
}

impl LoggingObserver {
    /// Create a new logging observer with debug level.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
        }
    };
}

impl BridgeObserver for LoggingObserver {
    fn on_request(&self, id: CorrelationId, request: &Request) {
        log_at!(
            self.level,
            id = %id,
            op = request.op_name(),
            path = %request.path(),
            "request"
        );
    }

    fn on_response(&self, id: CorrelationId, response: &Response) {
        match response {
            Response::Ok(value) => log_at!(
                self.level,
                id = %id,
                value_type = value.type_name(),
                "response"
            ),
            Response::Error(err) => log_at!(
                self.level,
                id = %id,
                kind = %err.kind,
                message = %truncate(&err.message),
                "error response"
            ),
        }
    }

    fn on_callback(&self, id: CorrelationId, callback_id: CallbackId, args: &[Value]) {
        log_at!(
            self.level,
            id = %id,
            callback_id = %callback_id,
            argc = args.len(),
            "callback invocation"
        );
    }
}

fn truncate(message: &str) -> String {
    const MAX: usize = 200;
    match message.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}... ({} bytes total)", &message[..cut], message.len()),
        None => message.to_string(),
    }
}
