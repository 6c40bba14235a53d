//! Top-level wire messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::request::Request;
use super::response::Response;
use crate::callback::CallbackId;
use crate::marshal::Value;

/// Which side allocated a correlation ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Allocated by the host for its requests.
    Host,
    /// Allocated by the interpreter for its callback invocations.
    Remote,
}

/// Correlation ID of a request or callback invocation.
///
/// The two sides allocate from disjoint spaces, so a response never has to be
/// guessed at: its `origin` says which table resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId {
    pub origin: Origin,
    pub seq: u64,
}

impl CorrelationId {
    pub fn host(seq: u64) -> Self {
        Self {
            origin: Origin::Host,
            seq,
        }
    }

    pub fn remote(seq: u64) -> Self {
        Self {
            origin: Origin::Remote,
            seq,
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Origin::Host => write!(f, "h{}", self.seq),
            Origin::Remote => write!(f, "r{}", self.seq),
        }
    }
}

/// One framed line on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Sent once by the server script when it is ready to serve requests.
    Ready {
        protocol: u32,
        #[serde(default)]
        app_version: Option<String>,
    },
    /// Host → interpreter.
    Request { id: CorrelationId, request: Request },
    /// Either direction; answers the request or invocation with the same ID.
    Response { id: CorrelationId, response: Response },
    /// Interpreter → host: run a registered host function.
    CallbackInvocation {
        id: CorrelationId,
        callback_id: CallbackId,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Host → interpreter: stop serving and exit.
    Shutdown,
}

impl Message {
    /// Short name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ready { .. } => "ready",
            Message::Request { .. } => "request",
            Message::Response { .. } => "response",
            Message::CallbackInvocation { .. } => "callback_invocation",
            Message::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::AccessorPath;

    #[test]
    fn request_wire_shape() {
        let msg = Message::Request {
            id: CorrelationId::host(1),
            request: Request::GetProperty {
                path: AccessorPath::new("bpy.context.scene"),
                member: "frame_current".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "request",
                "id": {"origin": "host", "seq": 1},
                "request": {"op": "get_property", "path": "bpy.context.scene", "member": "frame_current"}
            })
        );
    }

    #[test]
    fn ready_without_app_version() {
        let msg: Message = serde_json::from_str(r#"{"kind":"ready","protocol":1}"#).unwrap();
        assert_eq!(
            msg,
            Message::Ready {
                protocol: 1,
                app_version: None
            }
        );
    }

    #[test]
    fn callback_invocation_parses() {
        let json = r#"{"kind":"callback_invocation","id":{"origin":"remote","seq":4},"callback_id":2,"args":[{"type":"integer","value":10}]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::CallbackInvocation {
                id,
                callback_id,
                args,
            } => {
                assert_eq!(id, CorrelationId::remote(4));
                assert_eq!(callback_id, CallbackId(2));
                assert_eq!(args, vec![Value::Integer(10)]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn shutdown_is_bare() {
        assert_eq!(
            serde_json::to_string(&Message::Shutdown).unwrap(),
            r#"{"kind":"shutdown"}"#
        );
    }

    #[test]
    fn correlation_id_display() {
        assert_eq!(CorrelationId::host(3).to_string(), "h3");
        assert_eq!(CorrelationId::remote(9).to_string(), "r9");
    }
}
