//! Errors for parsing identifiers from their human-readable form.

use thiserror::Error;

/// Failure to parse a [`Topic`](crate::Topic) or [`PeerId`](crate::PeerId)
/// from its string representation.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdParseError {
    /// The string does not start with the expected type prefix.
    #[error("missing identifier prefix, expected {expected}")]
    MissingPrefix { expected: &'static str },

    /// The payload is not valid base58.
    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    /// The decoded payload has the wrong length.
    #[error("invalid identifier length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}
