//! Wire values → host values.
//!
//! Decoders are type-erased: references come back as [`AccessorPath`]s and
//! the call site wraps them in whatever proxy type it statically expects.

use std::collections::BTreeSet;

use crate::marshal::value::Value;
use crate::path::AccessorPath;
use crate::{Error, Result};

/// Conversion from a scalar wire value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) | Value::Enum(s) => Ok(s),
            other => Err(Error::unexpected("string", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(Error::unexpected("boolean", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(Error::unexpected("integer", other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                let wide = i64::from_value(value)?;
                <$ty>::try_from(wide).map_err(|_| Error::UnexpectedResponse {
                    expected: stringify!($ty),
                    actual: wide.to_string(),
                })
            }
        }
    )*};
}

narrow_integer!(i32, u32, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(Error::unexpected("float", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

/// Decode a scalar.
pub fn decode<T: FromValue>(value: Value) -> Result<T> {
    T::from_value(value)
}

/// Decode a single enum identifier.
pub fn decode_enum(value: Value) -> Result<String> {
    match value {
        Value::Enum(s) | Value::String(s) => Ok(s),
        other => Err(Error::unexpected("enum", other)),
    }
}

/// Decode a set of enum identifiers.
pub fn decode_enum_set(value: Value) -> Result<BTreeSet<String>> {
    match value {
        Value::EnumSet(items) => Ok(items.into_iter().collect()),
        Value::Array(items) => items.into_iter().map(decode_enum).collect(),
        other => Err(Error::unexpected("enum_set", other)),
    }
}

/// Decode a fixed-size array of exactly `len` items.
pub fn decode_array<T: FromValue>(value: Value, len: usize) -> Result<Vec<T>> {
    let Value::Array(items) = value else {
        return Err(Error::unexpected("array", value));
    };
    if items.len() != len {
        return Err(Error::UnexpectedResponse {
            expected: "array of declared length",
            actual: format!("length {} (declared {})", items.len(), len),
        });
    }
    items.into_iter().map(T::from_value).collect()
}

/// Decode a 2-D fixed array of exactly `rows` x `cols` items.
///
/// Accepts either a matrix payload or an array of row arrays.
pub fn decode_matrix<T: FromValue>(value: Value, rows: usize, cols: usize) -> Result<Vec<Vec<T>>> {
    let row_values = match value {
        Value::Matrix(matrix) => {
            if (matrix.rows, matrix.cols) != (rows, cols) {
                return Err(shape_mismatch(rows, cols, matrix.rows, matrix.cols));
            }
            matrix
                .into_rows()
                .ok_or_else(|| Error::unexpected("matrix", "payload does not match its shape"))?
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(row) => out.push(row),
                    other => return Err(Error::unexpected("matrix row", other)),
                }
            }
            out
        }
        other => return Err(Error::unexpected("matrix", other)),
    };

    if row_values.len() != rows {
        return Err(shape_mismatch(rows, cols, row_values.len(), cols));
    }
    row_values
        .into_iter()
        .map(|row| decode_array(Value::Array(row), cols))
        .collect()
}

fn shape_mismatch(rows: usize, cols: usize, actual_rows: usize, actual_cols: usize) -> Error {
    Error::UnexpectedResponse {
        expected: "matrix of declared shape",
        actual: format!("{}x{} (declared {}x{})", actual_rows, actual_cols, rows, cols),
    }
}

/// Decode a non-null object or collection reference.
pub fn decode_reference(value: Value) -> Result<AccessorPath> {
    match value {
        Value::Reference(path) | Value::Collection(path) => Ok(path),
        other => Err(Error::unexpected("reference", other)),
    }
}

/// Decode a nullable object or collection reference.
pub fn decode_optional_reference(value: Value) -> Result<Option<AccessorPath>> {
    match value {
        Value::None => Ok(None),
        other => decode_reference(other).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::value::Matrix;

    #[test]
    fn scalars_decode() {
        assert_eq!(decode::<String>(Value::String("Cube".into())).unwrap(), "Cube");
        assert!(decode::<bool>(Value::Boolean(true)).unwrap());
        assert_eq!(decode::<i64>(Value::Integer(-4)).unwrap(), -4);
        assert_eq!(decode::<f64>(Value::Float(0.25)).unwrap(), 0.25);
    }

    #[test]
    fn integer_widens_to_float() {
        assert_eq!(decode::<f64>(Value::Integer(2)).unwrap(), 2.0);
        assert_eq!(decode::<f32>(Value::Integer(2)).unwrap(), 2.0);
    }

    #[test]
    fn float_does_not_narrow_to_integer() {
        assert!(matches!(
            decode::<i64>(Value::Float(2.5)),
            Err(Error::UnexpectedResponse { expected: "integer", .. })
        ));
    }

    #[test]
    fn narrow_integers_are_range_checked() {
        assert_eq!(decode::<u32>(Value::Integer(7)).unwrap(), 7);
        assert!(decode::<u32>(Value::Integer(-1)).is_err());
        assert!(decode::<i32>(Value::Integer(i64::MAX)).is_err());
    }

    #[test]
    fn enums_decode_from_enum_or_string() {
        assert_eq!(decode_enum(Value::Enum("MESH".into())).unwrap(), "MESH");
        assert_eq!(decode_enum(Value::String("MESH".into())).unwrap(), "MESH");

        let set = decode_enum_set(Value::EnumSet(vec!["B".into(), "A".into()])).unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), ["A", "B"]);

        let set = decode_enum_set(Value::Array(vec![Value::String("X".into())])).unwrap();
        assert!(set.contains("X"));
    }

    #[test]
    fn array_length_must_match() {
        let value = Value::Array(vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]);
        assert_eq!(decode_array::<f64>(value.clone(), 3).unwrap(), [1.0, 2.0, 3.0]);
        assert!(decode_array::<f64>(value, 4).is_err());
    }

    #[test]
    fn matrix_from_payload_or_nested_arrays() {
        let payload = Value::Matrix(Matrix {
            rows: 2,
            cols: 2,
            data: vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
            ],
        });
        assert_eq!(
            decode_matrix::<i64>(payload, 2, 2).unwrap(),
            vec![vec![1, 2], vec![3, 4]]
        );

        let nested = Value::Array(vec![
            Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
            Value::Array(vec![Value::Integer(3), Value::Integer(4)]),
        ]);
        assert_eq!(
            decode_matrix::<i64>(nested.clone(), 2, 2).unwrap(),
            vec![vec![1, 2], vec![3, 4]]
        );
        assert!(decode_matrix::<i64>(nested, 3, 2).is_err());
    }

    #[test]
    fn ragged_matrix_rows_are_rejected() {
        let ragged = Value::Array(vec![
            Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
            Value::Array(vec![Value::Integer(3)]),
        ]);
        assert!(matches!(
            decode_matrix::<i64>(ragged, 2, 2),
            Err(Error::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn references_decode() {
        let path = AccessorPath::new("bpy.data.objects['Cube']");
        assert_eq!(decode_reference(Value::Reference(path.clone())).unwrap(), path);
        assert_eq!(
            decode_optional_reference(Value::Collection(path.clone())).unwrap(),
            Some(path)
        );
        assert_eq!(decode_optional_reference(Value::None).unwrap(), None);
        assert!(decode_reference(Value::None).is_err());
    }
}
