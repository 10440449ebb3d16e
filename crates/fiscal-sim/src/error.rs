//! Simulator errors

use fiscal_protocol::{Model, ParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// The model speaks the JSON dialect and has no byte-level device
    #[error("{0} is not a byte-oriented printer")]
    NotByteOriented(Model),

    /// A written packet could not be decoded
    #[error("malformed packet: {0}")]
    Packet(#[from] ParseError),
}
