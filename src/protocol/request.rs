//! Requests the host sends to the interpreter.

use serde::{Deserialize, Serialize};

use crate::marshal::{ArgMap, Value};
use crate::path::AccessorPath;

/// Subscript used by [`Request::IndexAccess`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Index {
    /// Integer position; negative positions count from the end.
    Position(i64),
    /// String key (collections keyed by name).
    Key(String),
}

impl From<i64> for Index {
    fn from(i: i64) -> Self {
        Index::Position(i)
    }
}

impl From<usize> for Index {
    fn from(i: usize) -> Self {
        Index::Position(i as i64)
    }
}

impl From<&str> for Index {
    fn from(key: &str) -> Self {
        Index::Key(key.to_string())
    }
}

impl From<String> for Index {
    fn from(key: String) -> Self {
        Index::Key(key)
    }
}

/// One operation evaluated remotely against an [`AccessorPath`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Evaluate `path.member`.
    GetProperty { path: AccessorPath, member: String },
    /// Assign `path.member = value`.
    SetProperty {
        path: AccessorPath,
        member: String,
        value: Value,
    },
    /// Call `path.member(**args)`.
    CallMethod {
        path: AccessorPath,
        member: String,
        #[serde(default)]
        args: ArgMap,
    },
    /// Evaluate `len(path)`.
    EnumerateLength { path: AccessorPath },
    /// Evaluate `path[index]`.
    IndexAccess { path: AccessorPath, index: Index },
}

impl Request {
    /// Path the request is evaluated against.
    pub fn path(&self) -> &AccessorPath {
        match self {
            Request::GetProperty { path, .. }
            | Request::SetProperty { path, .. }
            | Request::CallMethod { path, .. }
            | Request::EnumerateLength { path }
            | Request::IndexAccess { path, .. } => path,
        }
    }

    /// Wire name of the operation.
    pub fn op_name(&self) -> &'static str {
        match self {
            Request::GetProperty { .. } => "get_property",
            Request::SetProperty { .. } => "set_property",
            Request::CallMethod { .. } => "call_method",
            Request::EnumerateLength { .. } => "enumerate_length",
            Request::IndexAccess { .. } => "index_access",
        }
    }
}
