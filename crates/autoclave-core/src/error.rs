//! Errors surfaced by device-level operations.

use thiserror::Error;

use crate::protocol::{IdentifierError, ParseError};
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Device answered {path} with HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("Could not decode device response: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("No serial number found for cycle {cycle}")]
    SerialNotFound { cycle: String },
}

impl RequestError {
    /// Whether the failure came from decoding rather than reaching the device.
    pub fn is_parse(&self) -> bool {
        matches!(self, RequestError::Parse(_))
    }

    /// Whether the device could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            RequestError::Transport(TransportError::ConnectionFailed { .. })
        )
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        RequestError::Parse(ParseError::Json(e))
    }
}
