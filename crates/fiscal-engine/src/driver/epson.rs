//! Epson classic driver

use fiscal_protocol::control::ETX;
use fiscal_protocol::{reply, Dialect};

use super::{AckMode, ByteDriver};

/// Driver for the TM-U220
///
/// Replies are checksum-verified and never acknowledged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsonDriver;

impl ByteDriver for EpsonDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Epson
    }

    fn ack_mode(&self) -> AckMode {
        AckMode::None
    }

    fn receipt_number(&self, reply: &[u8]) -> i64 {
        reply::receipt_number(reply, reply::RECEIPT_OFFSET, ETX)
    }
}
