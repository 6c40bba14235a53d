//! Typed codec between host values and wire values.
//!
//! - [`Value`] is the wire representation shared by requests, responses and
//!   callback invocations.
//! - [`Arg`] / [`Args`] carry host values that still need local validation;
//!   [`encode`] and [`encode_args`] check them and allocate callback IDs.
//! - The `decode_*` functions turn response values back into host types.
//!
//! Validation failures are raised here, before any message exists, so they
//! never reach the remote process.

mod decode;
mod encode;
mod value;

pub use decode::{
    decode, decode_array, decode_enum, decode_enum_set, decode_matrix, decode_optional_reference,
    decode_reference, FromValue,
};
pub use encode::{encode, encode_args, Arg, Args};
pub use value::{ArgMap, Matrix, Value};
