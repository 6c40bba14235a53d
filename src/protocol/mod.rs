//! Wire protocol between the host and the server script.
//!
//! # Message Types
//!
//! Every framed line is one [`Message`], discriminated by `kind`:
//!
//! - `ready`: sent once by the server script, carries [`PROTOCOL_VERSION`]
//! - `request`: a [`Request`] from the host
//! - `response`: a [`Response`] to a request or to a callback invocation
//! - `callback_invocation`: the interpreter calling a registered host function
//! - `shutdown`: the host asking the server script to exit
//!
//! # Example
//!
//! ```
//! use libbridge::protocol::{Message, Response};
//! use libbridge::Value;
//!
//! let json = r#"{"kind":"response","id":{"origin":"host","seq":1},"response":{"status":"ok","body":{"type":"float","value":0.5}}}"#;
//! let msg: Message = serde_json::from_str(json).unwrap();
//!
//! if let Message::Response { response, .. } = msg {
//!     assert_eq!(response, Response::Ok(Value::Float(0.5)));
//! }
//! ```

mod engine;
mod message;
mod request;
mod response;

pub(crate) use engine::Engine;
pub use engine::CloseReason;
pub use message::{CorrelationId, Message, Origin};
pub use request::{Index, Request};
pub use response::{RemoteError, Response};

/// Version of the wire protocol spoken by this crate and the bundled script.
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::Value;

    #[test]
    fn all_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Message>();
        assert_send_sync::<Request>();
        assert_send_sync::<Response>();
        assert_send_sync::<CorrelationId>();
    }

    #[test]
    fn roundtrip_message() {
        let original = Message::Response {
            id: CorrelationId::remote(3),
            response: Response::Ok(Value::Array(vec![
                Value::Float(1.0),
                Value::Float(2.0),
                Value::Float(3.0),
            ])),
        };

        let json = serde_json::to_string(&original).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
