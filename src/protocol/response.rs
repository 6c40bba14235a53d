//! Responses to requests and callback invocations.

use serde::{Deserialize, Serialize};

use crate::marshal::Value;
use crate::{Error, Result};

/// Failure reported by the side that evaluated a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    /// Exception class name (for example `AttributeError`).
    pub kind: String,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }
}

/// Result of evaluating one request or callback invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum Response {
    Ok(Value),
    Error(RemoteError),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    /// Turn an error response into [`Error::RemoteEvaluation`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Response::Ok(value) => Ok(value),
            Response::Error(RemoteError { message, kind }) => {
                Err(Error::RemoteEvaluation { message, kind })
            }
        }
    }
}

impl From<Result<Value>> for Response {
    /// Report a host-side failure (a callback that returned an error) back to
    /// the interpreter.
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Response::Ok(value),
            Err(Error::RemoteEvaluation { message, kind }) => {
                Response::Error(RemoteError { message, kind })
            }
            Err(err) => Response::Error(RemoteError::new("HostError", err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_error_wire_shape() {
        let ok = Response::Ok(Value::Boolean(true));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "ok", "body": {"type": "boolean", "value": true}})
        );

        let err: Response = serde_json::from_str(
            r#"{"status":"error","body":{"message":"name 'bpyy' is not defined","kind":"NameError"}}"#,
        )
        .unwrap();
        assert!(!err.is_ok());
        match err.into_result() {
            Err(Error::RemoteEvaluation { kind, .. }) => assert_eq!(kind, "NameError"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn host_errors_become_error_responses() {
        let response = Response::from(Err(Error::TransportClosed));
        assert_eq!(
            response,
            Response::Error(RemoteError::new("HostError", "transport closed"))
        );

        let response = Response::from(Ok(Value::Integer(1)));
        assert_eq!(response, Response::Ok(Value::Integer(1)));
    }
}
