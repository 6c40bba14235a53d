//! Host values → wire values.
//!
//! Arguments are collected as [`Arg`]s, which may still need checking (enums
//! against their declared set, arrays against their declared length). The
//! encoder validates every argument of a call before it allocates any
//! callback ID, so a rejected call leaves no trace in the registry and sends
//! nothing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::callback::{Callback, CallbackContext, CallbackRegistry};
use crate::error::ValidationError;
use crate::marshal::value::{ArgMap, Matrix, Value};
use crate::proxy::RemoteObject;
use crate::Result;

/// A host-side argument or property value awaiting encoding.
pub enum Arg {
    /// A value that needs no checking: scalars, references, or an opaque
    /// value previously returned by the remote side.
    Value(Value),
    /// A single enum identifier and the set it must belong to.
    ///
    /// An empty `allowed` set means the enum items are only known at run time
    /// and the value is not checked.
    Enum {
        value: String,
        allowed: &'static [&'static str],
    },
    /// A set of enum identifiers, each of which must belong to `allowed`.
    EnumSet {
        values: Vec<String>,
        allowed: &'static [&'static str],
    },
    /// A fixed-size array and its declared length.
    Array { items: Vec<Value>, len: usize },
    /// A 2-D fixed array and its declared `(rows, cols)` shape.
    Matrix {
        rows: Vec<Vec<Value>>,
        shape: (usize, usize),
    },
    /// A host function, sent as a callback ID.
    Callback(Arc<dyn Callback>),
}

impl Arg {
    pub fn enumeration(value: impl Into<String>, allowed: &'static [&'static str]) -> Self {
        Arg::Enum {
            value: value.into(),
            allowed,
        }
    }

    pub fn enum_set<I, S>(values: I, allowed: &'static [&'static str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arg::EnumSet {
            values: values.into_iter().map(Into::into).collect(),
            allowed,
        }
    }

    pub fn array<I, T>(items: I, len: usize) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Arg::Array {
            items: items.into_iter().map(Into::into).collect(),
            len,
        }
    }

    pub fn matrix<R, T>(rows: impl IntoIterator<Item = R>, n_rows: usize, n_cols: usize) -> Self
    where
        R: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Arg::Matrix {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            shape: (n_rows, n_cols),
        }
    }

    /// A nested proxy, encoded as its accessor path.
    pub fn object<T: RemoteObject>(object: &T) -> Self {
        Arg::Value(Value::Reference(object.path().clone()))
    }

    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Arg::Callback(Arc::new(f))
    }

    /// Check the argument without encoding it.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            Arg::Value(value) => check_finite(value),
            Arg::Callback(_) => Ok(()),
            Arg::Enum { value, allowed } => check_enum(value, allowed),
            Arg::EnumSet { values, allowed } => {
                values.iter().try_for_each(|value| check_enum(value, allowed))
            }
            Arg::Array { items, len } => {
                if items.len() == *len {
                    items.iter().try_for_each(check_finite)
                } else {
                    Err(ValidationError::ArrayLength {
                        expected: *len,
                        actual: items.len(),
                    })
                }
            }
            Arg::Matrix { rows, shape } => {
                let (expected_rows, expected_cols) = *shape;
                let bad_row = rows.iter().find(|row| row.len() != expected_cols);
                if rows.len() == expected_rows && bad_row.is_none() {
                    rows.iter().flatten().try_for_each(check_finite)
                } else {
                    Err(ValidationError::MatrixShape {
                        expected_rows,
                        expected_cols,
                        actual_rows: rows.len(),
                        actual_cols: bad_row.map_or(expected_cols, Vec::len),
                    })
                }
            }
        }
    }
}

/// JSON has no encoding for NaN or infinities; serde_json would send `null`.
fn check_finite(value: &Value) -> std::result::Result<(), ValidationError> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(ValidationError::NonFiniteFloat {
            value: f.to_string(),
        }),
        Value::Array(items) => items.iter().try_for_each(check_finite),
        Value::Matrix(matrix) => matrix.data.iter().try_for_each(check_finite),
        _ => Ok(()),
    }
}

fn check_enum(value: &str, allowed: &[&str]) -> std::result::Result<(), ValidationError> {
    if allowed.is_empty() || allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEnum {
            value: value.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl<T: Into<Value>> From<T> for Arg {
    fn from(value: T) -> Self {
        Arg::Value(value.into())
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Arg::Enum { value, .. } => f.debug_tuple("Enum").field(value).finish(),
            Arg::EnumSet { values, .. } => f.debug_tuple("EnumSet").field(values).finish(),
            Arg::Array { items, len } => f
                .debug_struct("Array")
                .field("items", items)
                .field("len", len)
                .finish(),
            Arg::Matrix { rows, shape } => f
                .debug_struct("Matrix")
                .field("rows", rows)
                .field("shape", shape)
                .finish(),
            Arg::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Named arguments for a remote method call, in call-site order.
///
/// # Example
///
/// ```
/// use libbridge::{Arg, Args};
///
/// const TYPES: &[&str] = &["MESH", "CURVE", "EMPTY"];
///
/// let args = Args::new()
///     .arg("name", "Suzanne")
///     .arg("type", Arg::enumeration("MESH", TYPES))
///     .arg("location", Arg::array([0.0, 0.0, 1.5], 3));
/// assert_eq!(args.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct Args(Vec<(String, Arg)>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named argument. A repeated name replaces the earlier value.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Arg>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

/// Encode a single value, registering it first if it is a callback.
pub fn encode(arg: Arg, callbacks: &CallbackRegistry) -> Result<Value> {
    arg.validate()?;
    Ok(lower(arg, callbacks))
}

/// Encode a full argument list. Nothing is registered unless every argument
/// validates.
pub fn encode_args(args: Args, callbacks: &CallbackRegistry) -> Result<ArgMap> {
    for (_, arg) in &args.0 {
        arg.validate()?;
    }
    Ok(args
        .0
        .into_iter()
        .map(|(name, arg)| (name, lower(arg, callbacks)))
        .collect())
}

fn lower(arg: Arg, callbacks: &CallbackRegistry) -> Value {
    match arg {
        Arg::Value(value) => value,
        Arg::Enum { value, .. } => Value::Enum(value),
        Arg::EnumSet { values, .. } => Value::EnumSet(values),
        Arg::Array { items, .. } => Value::Array(items),
        Arg::Matrix { rows, shape } => Value::Matrix(Matrix {
            rows: shape.0,
            cols: shape.1,
            data: rows.into_iter().flatten().collect(),
        }),
        Arg::Callback(callback) => Value::Callback(callbacks.register_shared(callback)),
    }
}
