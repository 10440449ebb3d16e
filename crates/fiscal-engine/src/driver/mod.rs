//! Dialect policy for the byte engine
//!
//! The byte engine owns the queue, the reader and the retry loop; everything
//! that differs between Hasar, Epson and Epson extended lives behind
//! [`ByteDriver`]: how a validated reply is acknowledged, where the receipt
//! number sits, what the reply status bits mean and how a failed device is
//! brought back to a known state.

mod epson;
mod epson_ext;
mod hasar;

pub use epson::EpsonDriver;
pub use epson_ext::EpsonExtDriver;
pub use hasar::HasarDriver;

use fiscal_protocol::{reply, Dialect, Frame, Model};

use crate::error::FiscalError;
use crate::events::FiscalEvent;

/// What the engine writes after a validated reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Nothing
    None,
    /// A single ACK byte
    Ack,
    /// An ACK byte, then one byte of the device's answer is consumed
    AckAndConsume,
}

/// Result of inspecting a validated reply
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outcome {
    /// Events to emit after the receipt number, in order
    pub events: Vec<FiscalEvent>,
    /// Frames to send next, ahead of anything already queued
    pub follow_up: Vec<Frame>,
}

/// Dialect-specific behaviour of the byte engine
pub trait ByteDriver: Send {
    fn dialect(&self) -> Dialect;

    fn ack_mode(&self) -> AckMode;

    /// Whether the device interleaves intermediate packets with replies
    fn intermediate_packets(&self) -> bool {
        false
    }

    /// Structural and checksum validation of a reply to `frame`
    fn validate(&self, frame: &Frame, reply: &[u8]) -> Result<(), FiscalError> {
        reply::validate(self.dialect(), reply, frame.command).map_err(FiscalError::from)
    }

    /// Inspect a validated reply before it is acknowledged
    ///
    /// An error aborts the queue without acknowledging the reply.
    fn inspect(&self, _frame: &Frame, _reply: &[u8]) -> Result<Outcome, FiscalError> {
        Ok(Outcome::default())
    }

    /// Receipt number carried by the reply to a document close
    fn receipt_number(&self, reply: &[u8]) -> i64;

    /// Whether input is flushed after a failed exchange of `frame`
    fn flush_on_failure(&self, frame: &Frame) -> bool {
        frame.is_status()
    }

    /// Frames that force the device back to an idle state after a failure
    ///
    /// The engine follows them with a status request.
    fn recovery_frames(&self) -> Option<Vec<Frame>> {
        None
    }
}

/// Create the driver for a byte-oriented model
///
/// Returns `None` for models that speak the JSON dialect.
pub fn create_driver(model: Model) -> Option<Box<dyn ByteDriver>> {
    match model.dialect() {
        Dialect::Hasar => Some(Box::new(HasarDriver::new(model))),
        Dialect::Epson => Some(Box::new(EpsonDriver)),
        Dialect::EpsonExt => Some(Box::new(EpsonExtDriver)),
        Dialect::Hasar2G => None,
    }
}
