use std::time::Duration;

/// Errors that can occur when using libbridge.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` time
/// - Spawn errors: the remote application failed to start or signal readiness
/// - Transport errors: the pipe or the remote process went away
/// - Protocol errors: malformed or unexpected messages on the wire
/// - Validation errors: rejected on the host before anything is sent
/// - Remote errors: the interpreter raised while executing a request
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors (detected at build() time)
    // -------------------------------------------------------------------------
    /// Invalid configuration provided to builder.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Environment variable required by the configuration is not set.
    #[error("environment variable {var} not set")]
    EnvVarNotFound { var: &'static str },

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// Remote application executable not found.
    #[error("remote executable not found (searched: {searched})")]
    ExecutableNotFound { searched: String },

    /// Failed to spawn the remote process.
    #[error("failed to spawn remote process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    /// The remote process exited before writing the ready sentinel.
    #[error("remote process exited before signaling readiness (status: {status:?}): {stderr}")]
    ExitedBeforeReady {
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Last lines the process wrote to stderr.
        stderr: String,
    },

    /// The ready sentinel did not arrive in time.
    #[error("remote process did not signal readiness within {0:?}")]
    ReadyTimeout(Duration),

    // -------------------------------------------------------------------------
    // Transport errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the remote process.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// The transport is closed; a fresh bridge is required.
    #[error("transport closed")]
    TransportClosed,

    /// The remote process went away while this call was pending.
    #[error("remote process lost")]
    RemoteProcessLost,

    /// A previous call timed out and the remote can no longer be trusted to
    /// answer in order.
    #[error("transport is suspect after an abandoned call")]
    TransportSuspect,

    /// A call did not receive its response in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// Failed to parse JSON from a protocol line.
    #[error("failed to parse JSON: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// A well-formed message that violates the protocol.
    #[error("protocol framing error: {0}")]
    ProtocolFraming(String),

    /// The server script speaks a different protocol version.
    #[error("protocol version mismatch: host speaks {expected}, remote speaks {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },

    /// A response did not have the shape the call site expected.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },

    // -------------------------------------------------------------------------
    // Validation errors
    // -------------------------------------------------------------------------
    /// A value was rejected on the host before any message was sent.
    #[error("validation failed: {0}")]
    LocalValidation(#[from] ValidationError),

    // -------------------------------------------------------------------------
    // Remote errors
    // -------------------------------------------------------------------------
    /// The interpreter raised while resolving a path, calling a method, or
    /// assigning a value.
    #[error("remote {kind}: {message}")]
    RemoteEvaluation {
        message: String,
        /// Exception class name reported by the interpreter.
        kind: String,
    },
}

/// Reasons a value is rejected before it reaches the remote process.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Enum value outside its declared set.
    #[error("{value:?} is not one of {allowed:?}")]
    InvalidEnum {
        value: String,
        allowed: Vec<String>,
    },

    /// Fixed-size array with the wrong number of items.
    #[error("expected array of length {expected}, got {actual}")]
    ArrayLength { expected: usize, actual: usize },

    /// 2-D array with the wrong shape.
    #[error("expected {expected_rows}x{expected_cols} matrix, got {actual_rows}x{actual_cols}")]
    MatrixShape {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// NaN or an infinity, which the wire format cannot carry.
    #[error("{value} is not a finite number")]
    NonFiniteFloat { value: String },
}

/// A specialized Result type for libbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a JSON parse error with context.
    pub fn json_parse(source: serde_json::Error, raw: &str) -> Self {
        Self::JsonParse {
            message: format!(
                "at position {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Create an unexpected-response error.
    pub fn unexpected(expected: &'static str, actual: impl std::fmt::Debug) -> Self {
        Self::UnexpectedResponse {
            expected,
            actual: format!("{:?}", actual),
        }
    }

    /// Check if this error happened while starting the remote process.
    pub fn is_spawn_error(&self) -> bool {
        matches!(
            self,
            Error::ExecutableNotFound { .. }
                | Error::ProcessSpawn(_)
                | Error::ExitedBeforeReady { .. }
                | Error::ReadyTimeout(_)
        )
    }

    /// Check if this error was raised on the host without contacting the
    /// remote process.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::LocalValidation(_) | Error::InvalidConfig(_))
    }

    /// Check if this error was raised by the remote interpreter.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteEvaluation { .. })
    }

    /// Check if the bridge is unusable after this error.
    ///
    /// Fatal errors are never retried; a new bridge must be started.
    pub fn is_fatal(&self) -> bool {
        self.is_spawn_error()
            || matches!(
                self,
                Error::TransportClosed
                    | Error::Io(_)
                    | Error::RemoteProcessLost
                    | Error::TransportSuspect
                    | Error::Timeout(_)
                    | Error::ProtocolFraming(_)
                    | Error::JsonParse { .. }
                    | Error::ProtocolMismatch { .. }
            )
    }

    /// Remote exception class name, if this is a remote error.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            Error::RemoteEvaluation { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
        assert_send_sync::<ValidationError>();
    }

    #[test]
    fn spawn_error_detection() {
        assert!(Error::ExecutableNotFound {
            searched: "blender".into()
        }
        .is_spawn_error());
        assert!(Error::ReadyTimeout(Duration::from_secs(1)).is_spawn_error());
        assert!(Error::ExitedBeforeReady {
            status: Some(1),
            stderr: String::new()
        }
        .is_spawn_error());
        assert!(!Error::TransportClosed.is_spawn_error());
    }

    #[test]
    fn local_and_remote_detection() {
        let local: Error = ValidationError::ArrayLength {
            expected: 3,
            actual: 2,
        }
        .into();
        assert!(local.is_local());
        assert!(!local.is_remote());
        assert!(!local.is_fatal());

        let remote = Error::RemoteEvaluation {
            message: "no attribute 'foo'".into(),
            kind: "AttributeError".into(),
        };
        assert!(remote.is_remote());
        assert!(!remote.is_fatal());
        assert_eq!(remote.remote_kind(), Some("AttributeError"));
    }

    #[test]
    fn transport_errors_are_fatal() {
        assert!(Error::RemoteProcessLost.is_fatal());
        assert!(Error::TransportClosed.is_fatal());
        assert!(Error::TransportSuspect.is_fatal());
        assert!(Error::ProtocolFraming("bad".into()).is_fatal());
    }

    #[test]
    fn display_includes_remote_kind() {
        let err = Error::RemoteEvaluation {
            message: "bpy_struct has no attribute 'nme'".into(),
            kind: "AttributeError".into(),
        };
        assert_eq!(
            err.to_string(),
            "remote AttributeError: bpy_struct has no attribute 'nme'"
        );
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::JsonParse { .. }));
    }

    #[test]
    fn question_mark_operator_json() {
        fn fallible_json() -> Result<()> {
            let _: serde_json::Value = serde_json::from_str("not valid json")?;
            Ok(())
        }
        assert!(matches!(fallible_json(), Err(Error::JsonParse { .. })));
    }
}
