use std::time::Duration;
use thiserror::Error;

pub const ERROR_INVALID_ARGS: &str = "broker.Error.InvalidArgs";
pub const ERROR_UNKNOWN_METHOD: &str = "broker.Error.UnknownMethod";
pub const ERROR_NO_REPLY: &str = "broker.Error.NoReply";
pub const ERROR_FAILED: &str = "broker.Error.Failed";

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus connection is not established")]
    NotConnected,

    #[error("Bus connection closed")]
    Disconnected,

    #[error("Bus call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to send on bus: {0}")]
    Send(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Remote error {name}: {message}")]
    Remote { name: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Codec(err.to_string())
    }
}

impl BusError {
    /// Error name used when this error is sent back as an error reply.
    pub fn error_name(&self) -> &'static str {
        match self {
            BusError::InvalidArgs(_) => ERROR_INVALID_ARGS,
            BusError::UnknownMethod(_) => ERROR_UNKNOWN_METHOD,
            _ => ERROR_FAILED,
        }
    }
}
