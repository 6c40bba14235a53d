//! Wire values exchanged with the interpreter.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::callback::CallbackId;
use crate::path::AccessorPath;

/// A typed value as it travels on the wire.
///
/// Values are adjacently tagged: `{"type": "integer", "value": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent value (the remote `None`, or a void return).
    #[default]
    None,
    /// String scalar.
    String(String),
    /// Integer scalar.
    Integer(i64),
    /// Floating point scalar.
    Float(f64),
    /// Boolean scalar.
    Boolean(bool),
    /// A single enum identifier.
    Enum(String),
    /// A set of enum identifiers (flag enums).
    EnumSet(Vec<String>),
    /// A fixed-size array.
    Array(Vec<Value>),
    /// A 2-D fixed array.
    Matrix(Matrix),
    /// A remote object, addressed by path.
    Reference(AccessorPath),
    /// A remote ordered collection, addressed by path.
    Collection(AccessorPath),
    /// A host function registered in the callback registry.
    Callback(CallbackId),
}

/// Row-major 2-D array payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Value>,
}

impl Matrix {
    /// Split the flat payload into rows, checking the declared shape.
    pub fn into_rows(self) -> Option<Vec<Vec<Value>>> {
        if Some(self.data.len()) != self.rows.checked_mul(self.cols) {
            return None;
        }
        if self.cols == 0 {
            return Some(vec![Vec::new(); self.rows]);
        }
        let cols = self.cols;
        let mut rows = Vec::with_capacity(self.rows);
        let mut data = self.data.into_iter();
        for _ in 0..self.rows {
            rows.push(data.by_ref().take(cols).collect());
        }
        Some(rows)
    }
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Enum(_) => "enum",
            Value::EnumSet(_) => "enum_set",
            Value::Array(_) => "array",
            Value::Matrix(_) => "matrix",
            Value::Reference(_) => "reference",
            Value::Collection(_) => "collection",
            Value::Callback(_) => "callback",
        }
    }

    /// Check if this is the absent value.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The remote path, for references and collections.
    pub fn as_path(&self) -> Option<&AccessorPath> {
        match self {
            Value::Reference(p) | Value::Collection(p) => Some(p),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<AccessorPath> for Value {
    fn from(path: AccessorPath) -> Self {
        Value::Reference(path)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::None)
    }
}

/// Encoded named arguments, in call-site order.
///
/// Serialized as a JSON object whose key order is the insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgMap(Vec<(String, Value)>);

impl ArgMap {
    /// Create an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named value, keeping the first position of `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate in call-site order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ArgMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = ArgMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl Serialize for ArgMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ArgMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ArgMapVisitor;

        impl<'de> Visitor<'de> for ArgMapVisitor {
            type Value = ArgMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of argument names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<ArgMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    entries.push((name, value));
                }
                Ok(entries.into_iter().collect())
            }
        }

        deserializer.deserialize_map(ArgMapVisitor)
    }
}
