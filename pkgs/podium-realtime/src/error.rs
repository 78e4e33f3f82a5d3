//! Error types for realtime delivery

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
    #[error("Malformed event payload: {0}")]
    Decode(String),
    #[error("Unexpected event kind: expected {expected}, got {actual}")]
    UnexpectedKind { expected: String, actual: String },
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}
