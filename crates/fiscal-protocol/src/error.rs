//! Error types for fiscal packet parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing a frame or reply
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Reply does not have the layout the sent command expects
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// Checksum trailer disagrees with the frame contents
    #[error("checksum mismatch: expected {expected:04X}, got {actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Numeric field could not be read
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Brand and model do not belong together
    #[error("model {model} is not a {brand} printer")]
    BrandMismatch { brand: String, model: String },

    /// Unknown model or brand name
    #[error("unknown model: {0}")]
    UnknownModel(String),
}
