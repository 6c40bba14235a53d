//! Bridge configuration and builder.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use libbridge::BridgeConfig;
//!
//! let config = BridgeConfig::builder()
//!     .executable("/opt/blender/blender")
//!     .launch_arg("--factory-startup")
//!     .ready_timeout(Duration::from_secs(120))
//!     .call_timeout(Duration::from_secs(30))
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::options::{
    ProtocolOptions, RequestOrdering, DEFAULT_EXECUTABLE, DEFAULT_LAUNCH_ARGS,
    DEFAULT_READY_TIMEOUT, DEFAULT_SCRIPT_FLAG, DEFAULT_SHUTDOWN_GRACE, ENV_EXECUTABLE,
};
use crate::observer::BridgeObserver;
use crate::transport::SERVER_SCRIPT;
use crate::{Error, Result};

/// Configuration for launching the remote application.
///
/// Use [`BridgeConfig::builder()`] to create a new configuration.
#[derive(Clone)]
pub struct BridgeConfig {
    // Process options
    pub(crate) executable: PathBuf,
    pub(crate) launch_args: Vec<String>,
    pub(crate) script_flag: String,
    pub(crate) server_script: String,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,

    // Timing
    pub(crate) ready_timeout: Duration,
    pub(crate) call_timeout: Option<Duration>,
    pub(crate) shutdown_grace: Duration,

    // Protocol
    pub(crate) ordering: RequestOrdering,
    pub(crate) observer: Option<Arc<dyn BridgeObserver>>,
}

impl BridgeConfig {
    /// Create a new builder for BridgeConfig.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    pub fn working_directory(&self) -> Option<&PathBuf> {
        self.working_directory.as_ref()
    }

    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn ordering(&self) -> RequestOrdering {
        self.ordering
    }

    /// Protocol settings for the channel to the spawned process.
    pub fn protocol_options(&self) -> ProtocolOptions {
        ProtocolOptions {
            call_timeout: self.call_timeout,
            ordering: self.ordering,
            observer: self.observer.clone(),
        }
    }

    /// Command line arguments: launch args, then the script flag and source.
    pub(crate) fn build_args(&self) -> Vec<String> {
        let mut args = self.launch_args.clone();
        args.push(self.script_flag.clone());
        args.push(self.server_script.clone());
        args
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("executable", &self.executable)
            .field("launch_args", &self.launch_args)
            .field("script_flag", &self.script_flag)
            .field("server_script_len", &self.server_script.len())
            .field("working_directory", &self.working_directory)
            .field("env_vars", &self.env_vars.keys().collect::<Vec<_>>())
            .field("inherit_env", &self.inherit_env)
            .field("ready_timeout", &self.ready_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("ordering", &self.ordering)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Builder for [`BridgeConfig`].
///
/// Validation happens in [`build()`](BridgeConfigBuilder::build); the
/// executable itself is only looked up at spawn time.
#[derive(Clone)]
pub struct BridgeConfigBuilder {
    executable: Option<PathBuf>,
    executable_from_env: bool,
    launch_args: Vec<String>,
    script_flag: String,
    server_script: Option<String>,
    working_directory: Option<PathBuf>,
    env_vars: HashMap<String, String>,
    inherit_env: bool,
    ready_timeout: Duration,
    call_timeout: Option<Duration>,
    shutdown_grace: Duration,
    ordering: RequestOrdering,
    observer: Option<Arc<dyn BridgeObserver>>,
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self {
            executable: None,
            executable_from_env: false,
            launch_args: DEFAULT_LAUNCH_ARGS.iter().map(|s| s.to_string()).collect(),
            script_flag: DEFAULT_SCRIPT_FLAG.to_string(),
            server_script: None,
            working_directory: None,
            env_vars: HashMap::new(),
            inherit_env: true,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            call_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            ordering: RequestOrdering::default(),
            observer: None,
        }
    }
}

impl BridgeConfigBuilder {
    // -------------------------------------------------------------------------
    // Process options
    // -------------------------------------------------------------------------

    /// Path to the application binary (default: search PATH for "blender").
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self.executable_from_env = false;
        self
    }

    /// Read the application path from `LIBBRIDGE_EXECUTABLE` at build time.
    pub fn executable_from_env(mut self) -> Self {
        self.executable = None;
        self.executable_from_env = true;
        self
    }

    /// Replace the launch arguments (default: `--background`).
    pub fn launch_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append one launch argument.
    pub fn launch_arg(mut self, arg: impl Into<String>) -> Self {
        self.launch_args.push(arg.into());
        self
    }

    /// Flag preceding the injected script source (default: `--python-expr`).
    pub fn script_flag(mut self, flag: impl Into<String>) -> Self {
        self.script_flag = flag.into();
        self
    }

    /// Replace the bundled server script.
    pub fn server_script(mut self, source: impl Into<String>) -> Self {
        self.server_script = Some(source.into());
        self
    }

    /// Working directory for the application process.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Add/override environment variable for the application process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Don't inherit parent environment (default: inherit).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    // -------------------------------------------------------------------------
    // Timing
    // -------------------------------------------------------------------------

    /// How long to wait for the ready message (default: 60s).
    pub fn ready_timeout(mut self, duration: Duration) -> Self {
        self.ready_timeout = duration;
        self
    }

    /// Fail calls that get no response in time (default: wait forever).
    ///
    /// An expired call leaves the bridge suspect; later calls fail fast.
    pub fn call_timeout(mut self, duration: Duration) -> Self {
        self.call_timeout = Some(duration);
        self
    }

    /// Grace period between the shutdown request and a forced kill (default: 5s).
    pub fn shutdown_grace(mut self, duration: Duration) -> Self {
        self.shutdown_grace = duration;
        self
    }

    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------

    pub fn ordering(mut self, ordering: RequestOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Observe requests, responses and callback invocations.
    pub fn observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Build the configuration.
    ///
    /// This validates:
    /// - The executable can be resolved (env var set, path non-empty)
    /// - Timeouts are non-zero
    /// - The working directory exists if set
    pub fn build(self) -> Result<BridgeConfig> {
        let executable = if self.executable_from_env {
            let value = std::env::var(ENV_EXECUTABLE).map_err(|_| Error::EnvVarNotFound {
                var: ENV_EXECUTABLE,
            })?;
            PathBuf::from(value)
        } else {
            self.executable
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE))
        };

        if executable.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("executable must not be empty".into()));
        }

        if self.ready_timeout.is_zero() {
            return Err(Error::InvalidConfig("ready_timeout must be non-zero".into()));
        }

        if self.call_timeout.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidConfig("call_timeout must be non-zero".into()));
        }

        if self.script_flag.is_empty() {
            return Err(Error::InvalidConfig("script_flag must not be empty".into()));
        }

        if let Some(ref dir) = self.working_directory {
            if !dir.exists() {
                return Err(Error::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(BridgeConfig {
            executable,
            launch_args: self.launch_args,
            script_flag: self.script_flag,
            server_script: self
                .server_script
                .unwrap_or_else(|| SERVER_SCRIPT.to_string()),
            working_directory: self.working_directory,
            env_vars: self.env_vars,
            inherit_env: self.inherit_env,
            ready_timeout: self.ready_timeout,
            call_timeout: self.call_timeout,
            shutdown_grace: self.shutdown_grace,
            ordering: self.ordering,
            observer: self.observer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::builder().build().unwrap();
        assert_eq!(config.executable(), &PathBuf::from("blender"));
        assert_eq!(config.ready_timeout(), DEFAULT_READY_TIMEOUT);
        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.shutdown_grace(), DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.ordering(), RequestOrdering::Serialized);
        assert!(config.inherit_env, "inherit_env should default to true");
    }

    #[test]
    fn build_args_inject_script_last() {
        let config = BridgeConfig::builder()
            .launch_arg("--factory-startup")
            .server_script("print('hi')")
            .build()
            .unwrap();

        assert_eq!(
            config.build_args(),
            [
                "--background",
                "--factory-startup",
                "--python-expr",
                "print('hi')"
            ]
        );
    }

    #[test]
    fn default_script_is_bundled() {
        let config = BridgeConfig::builder().build().unwrap();
        let args = config.build_args();
        assert_eq!(args.last().map(String::as_str), Some(SERVER_SCRIPT));
    }

    #[test]
    fn launch_args_can_be_replaced() {
        let config = BridgeConfig::builder()
            .launch_args(["-b", "scene.blend"])
            .script_flag("--python")
            .server_script("/tmp/server.py")
            .build()
            .unwrap();
        assert_eq!(
            config.build_args(),
            ["-b", "scene.blend", "--python", "/tmp/server.py"]
        );
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let result = BridgeConfig::builder()
            .ready_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = BridgeConfig::builder()
            .call_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn invalid_working_directory() {
        let result = BridgeConfig::builder()
            .working_directory("/nonexistent/path/that/does/not/exist")
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn empty_executable_is_rejected() {
        let result = BridgeConfig::builder().executable("").build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn executable_from_env() {
        // Only this test touches the variable.
        std::env::remove_var(ENV_EXECUTABLE);
        let result = BridgeConfig::builder().executable_from_env().build();
        assert!(matches!(
            result,
            Err(Error::EnvVarNotFound {
                var: ENV_EXECUTABLE
            })
        ));

        std::env::set_var(ENV_EXECUTABLE, "/opt/blender/blender");
        let config = BridgeConfig::builder().executable_from_env().build().unwrap();
        assert_eq!(config.executable(), &PathBuf::from("/opt/blender/blender"));
        std::env::remove_var(ENV_EXECUTABLE);
    }

    #[test]
    fn protocol_options_follow_config() {
        let config = BridgeConfig::builder()
            .call_timeout(Duration::from_secs(3))
            .ordering(RequestOrdering::Pipelined)
            .build()
            .unwrap();
        let options = config.protocol_options();
        assert_eq!(options.call_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.ordering, RequestOrdering::Pipelined);
    }

    #[test]
    fn env_vars_are_kept() {
        let config = BridgeConfig::builder()
            .env("BLENDER_USER_SCRIPTS", "/tmp/scripts")
            .inherit_env(false)
            .build()
            .unwrap();
        assert_eq!(
            config.env_vars.get("BLENDER_USER_SCRIPTS"),
            Some(&"/tmp/scripts".to_string())
        );
        assert!(!config.inherit_env);
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BridgeConfig>();
        assert_send_sync::<BridgeConfigBuilder>();
    }
}
