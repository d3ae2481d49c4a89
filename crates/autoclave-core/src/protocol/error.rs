//! Errors raised while decoding device payloads.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Marker '{0}' not found in page")]
    MarkerNotFound(&'static str),

    #[error("Unterminated JSON literal after '{0}'")]
    Unterminated(&'static str),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected payload shape: {0}")]
    Shape(String),

    #[error("Unrecognized date '{0}'")]
    Date(String),
}
