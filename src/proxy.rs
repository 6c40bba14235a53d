//! Proxies for remote objects.
//!
//! A proxy is a [`Client`] handle plus an [`AccessorPath`]. It caches nothing:
//! every property read, assignment, and method call is a round trip that
//! re-evaluates the path in the interpreter. Two proxies refer to the same
//! remote object exactly when their paths are equal.
//!
//! Typed proxies implement [`RemoteObject`]; the [`remote_object!`] macro
//! declares one. [`Object`] is the untyped proxy for anything without a
//! generated type.

use std::fmt;

use crate::client::Client;
use crate::marshal::{decode, Arg, Args, FromValue, Value};
use crate::path::AccessorPath;
use crate::Result;

/// A typed proxy for an object living in the remote interpreter.
pub trait RemoteObject: Send + Sync + Sized {
    /// Wrap a path the caller knows to hold an object of this type.
    fn from_remote(client: Client, path: AccessorPath) -> Self;

    fn client(&self) -> &Client;

    fn path(&self) -> &AccessorPath;

    /// Check whether both proxies address the same remote object.
    fn same_remote<O: RemoteObject>(&self, other: &O) -> bool {
        self.path() == other.path()
    }
}

/// Declare a typed proxy struct implementing [`RemoteObject`].
///
/// ```
/// libbridge::remote_object! {
///     /// A mesh datablock.
///     pub struct Mesh;
/// }
/// ```
#[macro_export]
macro_rules! remote_object {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            client: $crate::Client,
            path: $crate::AccessorPath,
        }

        impl $crate::RemoteObject for $name {
            fn from_remote(client: $crate::Client, path: $crate::AccessorPath) -> Self {
                Self { client, path }
            }

            fn client(&self) -> &$crate::Client {
                &self.client
            }

            fn path(&self) -> &$crate::AccessorPath {
                &self.path
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.path).finish()
            }
        }
    };
}

/// Untyped proxy.
#[derive(Clone)]
pub struct Object {
    client: Client,
    path: AccessorPath,
}

impl RemoteObject for Object {
    fn from_remote(client: Client, path: AccessorPath) -> Self {
        Self { client, path }
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn path(&self) -> &AccessorPath {
        &self.path
    }
}

impl Object {
    /// Proxy for `self.name`, without a round trip.
    pub fn member(&self, name: &str) -> Object {
        Object::from_remote(self.client.clone(), self.path.member(name))
    }

    /// Reinterpret as a typed proxy.
    pub fn cast<T: RemoteObject>(self) -> T {
        T::from_remote(self.client, self.path)
    }

    /// Read a scalar property.
    pub async fn get<T: FromValue>(&self, member: &str) -> Result<T> {
        decode(self.client.get_value(&self.path, member).await?)
    }

    /// Assign a property.
    pub async fn set(&self, member: &str, value: impl Into<Arg>) -> Result<()> {
        self.client.set(&self.path, member, value).await
    }

    /// Call a method and return its raw result.
    pub async fn call(&self, member: &str, args: Args) -> Result<Value> {
        self.client.call_value(&self.path, member, args).await
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.path).finish()
    }
}
