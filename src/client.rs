//! Host-facing API: typed reads, writes and calls against accessor paths.
//!
//! This module provides [`Client`], a cheap handle onto one protocol channel,
//! and [`Bridge`], which launches the remote application and owns both the
//! channel and the process.
//!
//! # Example
//!
//! ```ignore
//! use libbridge::{AccessorPath, Args, Bridge, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::launch().await?;
//!
//!     let scene = AccessorPath::new("bpy.context.scene");
//!     let frame = bridge.get_integer(&scene, "frame_current").await?;
//!     bridge.set_integer(&scene, "frame_current", frame + 1).await?;
//!
//!     let objects = scene.member("objects");
//!     let count = bridge.enumerate_length(&objects).await?;
//!     println!("{} objects at frame {}", count, frame + 1);
//!
//!     bridge.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::callback::CallbackId;
use crate::config::{BridgeConfig, BridgeConfigBuilder, ProtocolOptions, RequestOrdering};
use crate::marshal::{
    decode, decode_array, decode_enum, decode_enum_set, decode_matrix, decode_optional_reference,
    decode_reference, encode, encode_args, Arg, Args, FromValue, Value,
};
use crate::observer::BridgeObserver;
use crate::path::AccessorPath;
use crate::protocol::{CloseReason, Engine, Index, Request};
use crate::proxy::{Object, RemoteObject};
use crate::transport::{FrameReader, RemoteProcess};
use crate::Result;

/// Handle onto one protocol channel.
///
/// `Client` is `Send + Sync` and cheap to clone; every clone talks to the
/// same remote interpreter. Proxies and callback contexts carry one.
///
/// Each method is exactly one round trip. Arguments are validated before
/// anything is written, so a [`LocalValidation`](crate::Error::LocalValidation)
/// error means nothing reached the remote side.
#[derive(Clone)]
pub struct Client {
    engine: Arc<Engine>,
}

impl Client {
    pub(crate) fn from_engine(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Run the protocol over an arbitrary byte channel.
    ///
    /// `reader` carries framed messages from the interpreter and `writer`
    /// carries requests to it. No ready message is expected. Must be called
    /// from within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W, options: ProtocolOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_engine(Engine::start(FrameReader::new(reader), writer, options))
    }

    /// Run `handler` once when the channel closes, for whatever reason.
    ///
    /// If the channel is already closed the handler runs immediately.
    pub fn on_exit<F>(&self, handler: F)
    where
        F: FnOnce(&CloseReason) + Send + 'static,
    {
        self.engine.on_exit(Box::new(handler));
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// Whether a call timed out. A suspect channel rejects further calls.
    pub fn is_suspect(&self) -> bool {
        self.engine.is_suspect()
    }

    /// Number of host functions the interpreter can currently invoke.
    pub fn registered_callbacks(&self) -> usize {
        self.engine.callbacks().len()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.engine.pending_len()
    }

    /// Typed proxy for `path`, without a round trip.
    pub fn wrap<T: RemoteObject>(&self, path: impl Into<AccessorPath>) -> T {
        T::from_remote(self.clone(), path.into())
    }

    /// Untyped proxy for `path`, for example `"bpy.data"`.
    pub fn root(&self, path: impl Into<AccessorPath>) -> Object {
        self.wrap(path)
    }

    /// Send a raw request and wait for its result.
    pub async fn request(&self, request: Request) -> Result<Value> {
        self.engine.call(request).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read `path.member` as an opaque value.
    pub async fn get_value(&self, path: &AccessorPath, member: &str) -> Result<Value> {
        self.request(Request::GetProperty {
            path: path.clone(),
            member: member.to_string(),
        })
        .await
    }

    pub async fn get_string(&self, path: &AccessorPath, member: &str) -> Result<String> {
        decode(self.get_value(path, member).await?)
    }

    pub async fn get_integer(&self, path: &AccessorPath, member: &str) -> Result<i64> {
        decode(self.get_value(path, member).await?)
    }

    pub async fn get_float(&self, path: &AccessorPath, member: &str) -> Result<f64> {
        decode(self.get_value(path, member).await?)
    }

    pub async fn get_boolean(&self, path: &AccessorPath, member: &str) -> Result<bool> {
        decode(self.get_value(path, member).await?)
    }

    /// Read an enum property as its identifier.
    pub async fn get_enum(&self, path: &AccessorPath, member: &str) -> Result<String> {
        decode_enum(self.get_value(path, member).await?)
    }

    /// Read an enum-flag property as the set of enabled identifiers.
    pub async fn get_enum_set(&self, path: &AccessorPath, member: &str) -> Result<BTreeSet<String>> {
        decode_enum_set(self.get_value(path, member).await?)
    }

    /// Read a fixed-size array, failing unless it has exactly `len` items.
    pub async fn get_array<T: FromValue>(
        &self,
        path: &AccessorPath,
        member: &str,
        len: usize,
    ) -> Result<Vec<T>> {
        decode_array(self.get_value(path, member).await?, len)
    }

    /// Read a matrix as rows, failing unless it is `rows` x `cols`.
    pub async fn get_matrix<T: FromValue>(
        &self,
        path: &AccessorPath,
        member: &str,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec<T>>> {
        decode_matrix(self.get_value(path, member).await?, rows, cols)
    }

    /// Read a property that always holds an object.
    pub async fn get_class<T: RemoteObject>(&self, path: &AccessorPath, member: &str) -> Result<T> {
        let target = decode_reference(self.get_value(path, member).await?)?;
        Ok(self.wrap(target))
    }

    /// Read a pointer property that may be unset.
    pub async fn get_object<T: RemoteObject>(
        &self,
        path: &AccessorPath,
        member: &str,
    ) -> Result<Option<T>> {
        let target = decode_optional_reference(self.get_value(path, member).await?)?;
        Ok(target.map(|target| self.wrap(target)))
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Assign `path.member`, validating and encoding `value` first.
    pub async fn set(&self, path: &AccessorPath, member: &str, value: impl Into<Arg>) -> Result<()> {
        let value = encode(value.into(), self.engine.callbacks())?;
        self.set_value(path, member, value).await
    }

    /// Assign an opaque value as-is.
    pub async fn set_value(&self, path: &AccessorPath, member: &str, value: Value) -> Result<()> {
        self.request(Request::SetProperty {
            path: path.clone(),
            member: member.to_string(),
            value,
        })
        .await?;
        Ok(())
    }

    pub async fn set_string(
        &self,
        path: &AccessorPath,
        member: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.set_value(path, member, Value::String(value.into())).await
    }

    pub async fn set_integer(&self, path: &AccessorPath, member: &str, value: i64) -> Result<()> {
        self.set_value(path, member, Value::Integer(value)).await
    }

    pub async fn set_float(&self, path: &AccessorPath, member: &str, value: f64) -> Result<()> {
        self.set(path, member, value).await
    }

    pub async fn set_boolean(&self, path: &AccessorPath, member: &str, value: bool) -> Result<()> {
        self.set_value(path, member, Value::Boolean(value)).await
    }

    /// Assign an enum, rejecting values outside `allowed` before sending.
    pub async fn set_enum(
        &self,
        path: &AccessorPath,
        member: &str,
        value: impl Into<String>,
        allowed: &'static [&'static str],
    ) -> Result<()> {
        self.set(path, member, Arg::enumeration(value, allowed)).await
    }

    pub async fn set_enum_set<I, S>(
        &self,
        path: &AccessorPath,
        member: &str,
        values: I,
        allowed: &'static [&'static str],
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(path, member, Arg::enum_set(values, allowed)).await
    }

    /// Assign a fixed-size array, rejecting any other length before sending.
    pub async fn set_array<I, T>(
        &self,
        path: &AccessorPath,
        member: &str,
        items: I,
        len: usize,
    ) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.set(path, member, Arg::array(items, len)).await
    }

    pub async fn set_matrix<R, T>(
        &self,
        path: &AccessorPath,
        member: &str,
        rows: impl IntoIterator<Item = R>,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<()>
    where
        R: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.set(path, member, Arg::matrix(rows, n_rows, n_cols)).await
    }

    /// Point `path.member` at `object`, or clear it with `None`.
    pub async fn set_object<T: RemoteObject>(
        &self,
        path: &AccessorPath,
        member: &str,
        object: Option<&T>,
    ) -> Result<()> {
        let value = match object {
            Some(object) => Value::Reference(object.path().clone()),
            None => Value::None,
        };
        self.set_value(path, member, value).await
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// Call `path.member(**args)` and return the raw result.
    pub async fn call_value(&self, path: &AccessorPath, member: &str, args: Args) -> Result<Value> {
        let args = encode_args(args, self.engine.callbacks())?;
        self.request(Request::CallMethod {
            path: path.clone(),
            member: member.to_string(),
            args,
        })
        .await
    }

    pub async fn call_void(&self, path: &AccessorPath, member: &str, args: Args) -> Result<()> {
        self.call_value(path, member, args).await?;
        Ok(())
    }

    pub async fn call_string(&self, path: &AccessorPath, member: &str, args: Args) -> Result<String> {
        decode(self.call_value(path, member, args).await?)
    }

    /// Call a method that returns an object.
    pub async fn call_class<T: RemoteObject>(
        &self,
        path: &AccessorPath,
        member: &str,
        args: Args,
    ) -> Result<T> {
        let target = decode_reference(self.call_value(path, member, args).await?)?;
        Ok(self.wrap(target))
    }

    /// Call a method that returns an object or `None`.
    pub async fn call_object<T: RemoteObject>(
        &self,
        path: &AccessorPath,
        member: &str,
        args: Args,
    ) -> Result<Option<T>> {
        let target = decode_optional_reference(self.call_value(path, member, args).await?)?;
        Ok(target.map(|target| self.wrap(target)))
    }

    /// Call the remote unregistration method, then forget `callback`.
    ///
    /// The registry entry is only dropped once the remote side confirmed.
    pub async fn unregister_callback(
        &self,
        path: &AccessorPath,
        member: &str,
        args: Args,
        callback: CallbackId,
    ) -> Result<()> {
        self.call_void(path, member, args).await?;
        self.engine.callbacks().remove(callback);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Collections
    // -------------------------------------------------------------------------

    /// Evaluate `len(path)`.
    pub async fn enumerate_length(&self, path: &AccessorPath) -> Result<usize> {
        decode(
            self.request(Request::EnumerateLength { path: path.clone() })
                .await?,
        )
    }

    /// Evaluate `path[index]` and return the raw element.
    pub async fn index_access(&self, path: &AccessorPath, index: impl Into<Index>) -> Result<Value> {
        self.request(Request::IndexAccess {
            path: path.clone(),
            index: index.into(),
        })
        .await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .field("suspect", &self.is_suspect())
            .field("pending_calls", &self.pending_calls())
            .field("registered_callbacks", &self.registered_callbacks())
            .finish()
    }
}

/// A running remote application and the channel to its interpreter.
///
/// `Bridge` dereferences to [`Client`], so every client method is available
/// directly. Use [`client()`](Self::client) to get a handle that outlives the
/// bridge value.
///
/// # Cancellation
///
/// Dropping a `Bridge` kills the application. Call
/// [`shutdown`](Self::shutdown) for an orderly exit.
pub struct Bridge {
    client: Client,
    process: RemoteProcess,
    shutdown_grace: Duration,
}

impl Bridge {
    /// Launch the application with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns a spawn error (see [`Error::is_spawn_error`](crate::Error::is_spawn_error))
    /// if the application cannot be started or never reports ready.
    pub async fn launch() -> Result<Self> {
        Self::start(BridgeConfig::builder().build()?).await
    }

    /// Launch the application and wait until its interpreter is ready.
    pub async fn start(config: BridgeConfig) -> Result<Self> {
        let (process, reader, stdin) = RemoteProcess::spawn(&config).await?;
        let engine = Engine::start(reader, stdin, config.protocol_options());
        Ok(Self {
            client: Client::from_engine(engine),
            process,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn process(&self) -> &RemoteProcess {
        &self.process
    }

    /// Application version reported at startup, if any.
    pub fn app_version(&self) -> Option<&str> {
        self.process.ready_info().app_version.as_deref()
    }

    /// Ask the interpreter to exit, then wait for the process.
    ///
    /// The process is killed if it has not exited within the configured
    /// shutdown grace period. Calls still pending fail with
    /// [`TransportClosed`](crate::Error::TransportClosed).
    pub async fn shutdown(mut self) -> Result<ExitStatus> {
        if let Err(err) = self.client.engine.shutdown().await {
            tracing::debug!(error = %err, "shutdown message not delivered");
        }
        self.process.wait_or_kill(self.shutdown_grace).await
    }
}

impl Deref for Bridge {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("pid", &self.process.pid())
            .field("app_version", &self.app_version())
            .field("client", &self.client)
            .finish()
    }
}

/// Builder for [`Bridge`].
///
/// This wraps [`BridgeConfigBuilder`] and starts the bridge directly.
///
/// # Example
///
/// ```ignore
/// let bridge = Bridge::builder()
///     .executable("/opt/blender/blender")
///     .call_timeout(Duration::from_secs(30))
///     .start()
///     .await?;
/// ```
#[derive(Clone, Default)]
pub struct BridgeBuilder {
    inner: BridgeConfigBuilder,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and launch the application.
    pub async fn start(self) -> Result<Bridge> {
        Bridge::start(self.inner.build()?).await
    }

    pub fn executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.executable(path);
        self
    }

    pub fn executable_from_env(mut self) -> Self {
        self.inner = self.inner.executable_from_env();
        self
    }

    pub fn launch_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner = self.inner.launch_args(args);
        self
    }

    pub fn launch_arg(mut self, arg: impl Into<String>) -> Self {
        self.inner = self.inner.launch_arg(arg);
        self
    }

    pub fn script_flag(mut self, flag: impl Into<String>) -> Self {
        self.inner = self.inner.script_flag(flag);
        self
    }

    pub fn server_script(mut self, source: impl Into<String>) -> Self {
        self.inner = self.inner.server_script(source);
        self
    }

    pub fn working_directory(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.working_directory(path);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.env(key, value);
        self
    }

    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inner = self.inner.inherit_env(inherit);
        self
    }

    pub fn ready_timeout(mut self, duration: Duration) -> Self {
        self.inner = self.inner.ready_timeout(duration);
        self
    }

    pub fn call_timeout(mut self, duration: Duration) -> Self {
        self.inner = self.inner.call_timeout(duration);
        self
    }

    pub fn shutdown_grace(mut self, duration: Duration) -> Self {
        self.inner = self.inner.shutdown_grace(duration);
        self
    }

    pub fn ordering(mut self, ordering: RequestOrdering) -> Self {
        self.inner = self.inner.ordering(ordering);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn BridgeObserver>) -> Self {
        self.inner = self.inner.observer(observer);
        self
    }
}
