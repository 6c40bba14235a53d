//! Type-safe options and defaults for the bridge.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observer::BridgeObserver;

/// Environment variable read by `executable_from_env`.
pub const ENV_EXECUTABLE: &str = "LIBBRIDGE_EXECUTABLE";

/// Executable looked up on `PATH` when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "blender";

/// Arguments that start the application without a UI.
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &["--background"];

/// Flag that makes the application evaluate the next argument as a script.
pub const DEFAULT_SCRIPT_FLAG: &str = "--python-expr";

/// How long to wait for the server script to report readiness.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `shutdown` waits for a clean exit before killing the process.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How requests share the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrdering {
    /// At most one request per call frame is on the wire at a time.
    ///
    /// Required by the bundled server script, which evaluates requests one
    /// after another on the application's main thread.
    #[default]
    Serialized,
    /// Requests go out as soon as they are issued and are matched back by
    /// correlation ID. Only for remote servers that answer concurrently.
    Pipelined,
}

impl fmt::Display for RequestOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestOrdering::Serialized => write!(f, "serialized"),
            RequestOrdering::Pipelined => write!(f, "pipelined"),
        }
    }
}

/// Protocol-level settings, independent of how the channel was obtained.
///
/// Used directly with [`Client::connect`](crate::Client::connect); a
/// [`BridgeConfig`](super::BridgeConfig) derives one for spawned processes.
#[derive(Clone, Default)]
pub struct ProtocolOptions {
    pub call_timeout: Option<Duration>,
    pub ordering: RequestOrdering,
    pub observer: Option<Arc<dyn BridgeObserver>>,
}

impl ProtocolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail calls that get no response within `timeout`.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn ordering(mut self, ordering: RequestOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for ProtocolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolOptions")
            .field("call_timeout", &self.call_timeout)
            .field("ordering", &self.ordering)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
