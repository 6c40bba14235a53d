//! Host functions the remote interpreter can call back into.
//!
//! When a proxy method takes a function argument (a draw hook, a timer, a
//! property update handler), the function itself never crosses the process
//! boundary. The marshaller registers it here and sends only its
//! [`CallbackId`]; the interpreter later sends a callback invocation carrying
//! that ID, and the protocol engine runs the function and replies with its
//! return value.
//!
//! # Example
//!
//! ```ignore
//! use libbridge::{Arg, Args, Value};
//!
//! let args = Args::new()
//!     .arg("callback", Arg::callback(|ctx| async move {
//!         let frame = ctx.client().get_integer(&"bpy.context.scene".into(), "frame_current").await?;
//!         tracing::info!(frame, "redraw");
//!         Ok(Value::None)
//!     }))
//!     .arg("region_type", "WINDOW");
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::marshal::Value;
use crate::Result;

/// Opaque identifier of a registered host function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

/// Everything a host function receives when the interpreter invokes it.
pub struct CallbackContext {
    client: Client,
    callback_id: CallbackId,
    args: Vec<Value>,
}

impl CallbackContext {
    pub(crate) fn new(client: Client, callback_id: CallbackId, args: Vec<Value>) -> Self {
        Self {
            client,
            callback_id,
            args,
        }
    }

    /// Client for issuing nested calls while the interpreter waits.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }

    /// Positional arguments passed by the interpreter.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }
}

/// A host function callable from the remote interpreter.
///
/// Implemented for every `Fn(CallbackContext) -> impl Future<Output = Result<Value>>`.
/// The returned future may issue further calls through
/// [`CallbackContext::client`]; they are answered while the interpreter is
/// blocked waiting for this callback.
pub trait Callback: Send + Sync + 'static {
    fn invoke(&self, ctx: CallbackContext) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut> Callback for F
where
    F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn invoke(&self, ctx: CallbackContext) -> BoxFuture<'static, Result<Value>> {
        Box::pin((self)(ctx))
    }
}

/// Table of registered host functions keyed by [`CallbackId`].
///
/// IDs are allocated monotonically starting from 1 and never reused.
pub struct CallbackRegistry {
    entries: DashMap<CallbackId, Arc<dyn Callback>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a host function and return its ID.
    pub fn register<F, Fut>(&self, f: F) -> CallbackId
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_shared(Arc::new(f))
    }

    /// Register an already shared host function and return its ID.
    pub fn register_shared(&self, callback: Arc<dyn Callback>) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, callback);
        tracing::trace!(callback_id = %id, "registered callback");
        id
    }

    /// Look up a host function.
    pub fn get(&self, id: CallbackId) -> Option<Arc<dyn Callback>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a host function. Returns whether it was registered.
    pub fn remove(&self, id: CallbackId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: CallbackId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<CallbackRegistry>();
        assert_send_sync::<dyn Callback>();
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let registry = CallbackRegistry::new();
        let a = registry.register(|_ctx| async { Ok(Value::None) });
        let b = registry.register(|_ctx| async { Ok(Value::None) });
        assert_eq!(a, CallbackId(1));
        assert_eq!(b, CallbackId(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_and_clear() {
        let registry = CallbackRegistry::new();
        let a = registry.register(|_ctx| async { Ok(Value::None) });
        let b = registry.register(|_ctx| async { Ok(Value::None) });

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert!(!registry.contains(a));
        assert!(registry.contains(b));

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(b).is_none());

        // IDs are not reused after a clear
        let c = registry.register(|_ctx| async { Ok(Value::None) });
        assert_eq!(c, CallbackId(3));
    }

    #[test]
    fn callback_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&CallbackId(42)).unwrap(), "42");
        assert_eq!(CallbackId(42).to_string(), "cb#42");
    }
}
