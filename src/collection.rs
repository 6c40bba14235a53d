//! Proxies for ordered remote collections.
//!
//! Element access composes paths, so `at` and `by_key` never touch the
//! wire. `len`, `get`, `find` and iteration make exactly the round trips
//! their names suggest, and the mutators of [`MutableCollection`] are one
//! remote method call each with no local bookkeeping.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use futures::stream::{self, Stream, StreamExt};

use crate::client::Client;
use crate::marshal::{decode_reference, Arg, Args};
use crate::path::AccessorPath;
use crate::protocol::Index;
use crate::proxy::RemoteObject;
use crate::{Error, Result};

/// Read-only view of a remote ordered collection of `T`.
pub struct Collection<T> {
    client: Client,
    path: AccessorPath,
    _element: PhantomData<fn() -> T>,
}

impl<T> RemoteObject for Collection<T> {
    fn from_remote(client: Client, path: AccessorPath) -> Self {
        Self {
            client,
            path,
            _element: PhantomData,
        }
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn path(&self) -> &AccessorPath {
        &self.path
    }
}

impl<T: RemoteObject> Collection<T> {
    /// Number of elements (one round trip).
    pub async fn len(&self) -> Result<usize> {
        self.client.enumerate_length(&self.path).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Proxy for the element at `index`; negative indices count from the end.
    pub fn at(&self, index: i64) -> T {
        T::from_remote(self.client.clone(), self.path.index(index))
    }

    /// Proxy for the element named `key`.
    pub fn by_key(&self, key: &str) -> T {
        T::from_remote(self.client.clone(), self.path.key(key))
    }

    /// Look an element up remotely, failing if it does not exist.
    pub async fn get(&self, index: impl Into<Index>) -> Result<T> {
        let value = self.client.index_access(&self.path, index).await?;
        Ok(T::from_remote(self.client.clone(), decode_reference(value)?))
    }

    /// Look an element up by name; a missing key is `None`.
    pub async fn find(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await {
            Ok(item) => Ok(Some(item)),
            Err(Error::RemoteEvaluation { ref kind, .. }) if kind == "KeyError" => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Proxies for every element, from one length query.
    pub async fn items(&self) -> Result<Vec<T>> {
        let len = self.len().await?;
        Ok((0..len as i64).map(|i| self.at(i)).collect())
    }

    /// Stream of element proxies, from one length query.
    pub fn stream(&self) -> impl Stream<Item = Result<T>> + '_ {
        stream::once(self.len()).flat_map(move |len| {
            let items: Vec<Result<T>> = match len {
                Ok(len) => (0..len as i64).map(|i| Ok(self.at(i))).collect(),
                Err(err) => vec![Err(err)],
            };
            stream::iter(items)
        })
    }
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path: self.path.clone(),
            _element: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Collection").field(&self.path).finish()
    }
}

/// A remote collection that also supports creation, removal and reordering.
pub struct MutableCollection<T> {
    inner: Collection<T>,
}

impl<T> RemoteObject for MutableCollection<T> {
    fn from_remote(client: Client, path: AccessorPath) -> Self {
        Self {
            inner: Collection::from_remote(client, path),
        }
    }

    fn client(&self) -> &Client {
        &self.inner.client
    }

    fn path(&self) -> &AccessorPath {
        &self.inner.path
    }
}

impl<T: RemoteObject> MutableCollection<T> {
    /// Create an element remotely and return a proxy for it.
    pub async fn new(&self, args: Args) -> Result<T> {
        let value = self.client().call_value(self.path(), "new", args).await?;
        Ok(T::from_remote(self.client().clone(), decode_reference(value)?))
    }

    /// Call the collection's `remove` with arbitrary arguments.
    pub async fn remove(&self, args: Args) -> Result<()> {
        self.client().call_void(self.path(), "remove", args).await
    }

    /// Remove `item`, passed as the named parameter `param`.
    pub async fn remove_item(&self, param: &str, item: &T) -> Result<()> {
        self.remove(Args::new().arg(param, Arg::object(item))).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.client().call_void(self.path(), "clear", Args::new()).await
    }

    /// Move the element at `from` to position `to`.
    pub async fn move_item(&self, from: i64, to: i64) -> Result<()> {
        let args = Args::new().arg("from_index", from).arg("to_index", to);
        self.client().call_void(self.path(), "move", args).await
    }
}

impl<T> Deref for MutableCollection<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Collection<T> {
        &self.inner
    }
}

impl<T> Clone for MutableCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for MutableCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableCollection").field(&self.inner.path).finish()
    }
}

