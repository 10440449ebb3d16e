//! Error types for the fiscal engine

use fiscal_protocol::{Dialect, ParseError, ProtocolError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one exchange with the printer
///
/// These never reach the caller of a command method: they are carried by
/// status events on the engine's event channel.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FiscalError {
    /// The device rejected the frame more times than the retry limit allows
    #[error("frame rejected by the printer")]
    Nak,

    /// No frame completed within the read-attempt ceiling
    #[error("no reply within the read-attempt ceiling")]
    Timeout,

    /// Reply checksum does not match its contents
    #[error("checksum mismatch: expected {expected:04x}, got {actual:04x}")]
    ChecksumMismatch {
        /// Checksum carried by the reply
        expected: u16,
        /// Checksum recomputed over the reply
        actual: u16,
    },

    /// Reply sentinels or command echo are wrong
    #[error("malformed reply: {0}")]
    StructuralMismatch(String),

    /// Underlying I/O or network failure
    #[error("transport error: {0}")]
    TransportError(String),

    /// The fiscal memory is exhausted; requires operator action
    #[error("fiscal memory full")]
    FiscalMemoryFull,

    /// JSON reply does not answer the request or reports a fault
    #[error("reply verification failed: {0}")]
    VerificationMismatch(String),

    /// The recovery procedure reached its cap
    #[error("printer did not recover")]
    Unrecoverable,
}

impl From<ParseError> for FiscalError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::ChecksumMismatch { expected, actual } => {
                FiscalError::ChecksumMismatch { expected, actual }
            }
            other => FiscalError::StructuralMismatch(other.to_string()),
        }
    }
}

/// Errors raised by byte transports
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No USB serial device with the requested ids
    #[error("no USB device {vid:04x}:{pid:04x}")]
    NoDevice { vid: u16, pid: u16 },

    /// USB address is not `vid:pid` in hex
    #[error("invalid USB address: {0}")]
    InvalidAddress(String),

    /// The transport was closed
    #[error("transport closed")]
    Closed,
}

/// Errors raised by message transports
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    StatusCode(u16),

    /// Reply body is not a JSON object
    #[error("unparsable reply: {0}")]
    Parse(String),

    /// No reply within the transport's bounded wait
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if let Some(status) = err.status() {
            NetworkError::StatusCode(status.as_u16())
        } else if err.is_decode() {
            NetworkError::Parse(err.to_string())
        } else {
            NetworkError::Connection(err.to_string())
        }
    }
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors constructing a printer
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unsupported brand/model pair
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connector kind cannot carry this dialect
    #[error("{dialect} printers cannot use a {transport} connector")]
    TransportMismatch {
        dialect: Dialect,
        transport: &'static str,
    },

    /// The port could not be opened
    #[error("failed to open port: {0}")]
    Open(#[from] TransportError),

    /// The HTTP client could not be built
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
