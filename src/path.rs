//! Accessor paths: textual addresses into the remote object graph.
//!
//! Remote objects are never held as handles. Each proxy stores the expression
//! that locates its object in the interpreter's global namespace, and every
//! operation re-evaluates that expression remotely. A deleted object therefore
//! surfaces as a remote evaluation error instead of a dangling reference.
//!
//! # Example
//!
//! ```
//! use libbridge::AccessorPath;
//!
//! let objects = AccessorPath::new("bpy.data.objects");
//! let cube = objects.key("Cube");
//! assert_eq!(cube.as_str(), "bpy.data.objects['Cube']");
//! assert_eq!(cube.member("location").as_str(), "bpy.data.objects['Cube'].location");
//! assert_eq!(objects.index(-1).as_str(), "bpy.data.objects[-1]");
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An immutable expression locating a live object in the remote namespace.
///
/// Cloning is cheap (the text is shared). Two paths are equal iff their text
/// is equal; equal paths address the same remote object but carry no identity
/// of their own.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessorPath(Arc<str>);

impl AccessorPath {
    /// Create a path from a raw expression.
    pub fn new(expr: impl AsRef<str>) -> Self {
        AccessorPath(Arc::from(expr.as_ref()))
    }

    /// Get the expression text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compose `self.name`.
    pub fn member(&self, name: &str) -> Self {
        Self::new(format!("{}.{}", self.0, name))
    }

    /// Compose `self[index]`.
    pub fn index(&self, index: i64) -> Self {
        Self::new(format!("{}[{}]", self.0, index))
    }

    /// Compose `self['key']` with the key quoted as a remote string literal.
    pub fn key(&self, key: &str) -> Self {
        Self::new(format!("{}[{}]", self.0, quote(key)))
    }

    /// Compose `self[index]` for either kind of index.
    pub fn subscript(&self, index: &crate::protocol::Index) -> Self {
        match index {
            crate::protocol::Index::Position(i) => self.index(*i),
            crate::protocol::Index::Key(k) => self.key(k),
        }
    }
}

/// Quote a string as a single-quoted remote literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for AccessorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccessorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessorPath({})", self.0)
    }
}

impl From<&str> for AccessorPath {
    fn from(s: &str) -> Self {
        AccessorPath::new(s)
    }
}

impl From<String> for AccessorPath {
    fn from(s: String) -> Self {
        AccessorPath(Arc::from(s))
    }
}

impl AsRef<str> for AccessorPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for AccessorPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccessorPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(AccessorPath::from)
    }
}
