//! Hasar first generation driver

use fiscal_protocol::control::{ETX, FS};
use fiscal_protocol::{hasar, reply, Dialect, Frame, Model};

use super::{AckMode, ByteDriver};

/// Driver for the 320F, 330F, 615F and 715F
#[derive(Debug, Clone, Copy)]
pub struct HasarDriver {
    model: Model,
}

impl HasarDriver {
    pub fn new(model: Model) -> Self {
        Self { model }
    }
}

impl ByteDriver for HasarDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Hasar
    }

    fn ack_mode(&self) -> AckMode {
        AckMode::Ack
    }

    fn receipt_number(&self, reply: &[u8]) -> i64 {
        // The 330F appends further fields after the number
        let terminator = if self.model == Model::Hasar330F { FS } else { ETX };
        reply::receipt_number(reply, reply::RECEIPT_OFFSET, terminator)
    }

    fn flush_on_failure(&self, _frame: &Frame) -> bool {
        true
    }

    fn recovery_frames(&self) -> Option<Vec<Frame>> {
        Some(hasar::recovery_frames(self.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscal_protocol::checksum;
    use fiscal_protocol::control::STX;

    fn close_reply(number: &[u8]) -> Vec<u8> {
        let mut bytes = vec![STX, 0x20, 0x45, FS];
        bytes.extend_from_slice(b"0000\x1c0600\x1c");
        bytes.extend_from_slice(number);
        bytes.push(ETX);
        let trailer = checksum::encode(Dialect::Hasar, &bytes);
        bytes.extend_from_slice(&trailer);
        bytes
    }

    #[test]
    fn test_receipt_number_terminator_per_model() {
        let reply = close_reply(b"00000123\x1c7");
        assert_eq!(HasarDriver::new(Model::Hasar330F).receipt_number(&reply), 123);
        // Without the FS cut the whole tail fails to parse
        assert_eq!(HasarDriver::new(Model::Hasar615F).receipt_number(&reply), 0);

        let reply = close_reply(b"00000123");
        assert_eq!(HasarDriver::new(Model::Hasar615F).receipt_number(&reply), 123);
    }

    #[test]
    fn test_recovery_frames() {
        let driver = HasarDriver::new(Model::Hasar715F);
        let frames = driver.recovery_frames().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].command, hasar::CMD_TOTAL_TENDER);
        assert_eq!(frames[1].command, hasar::CMD_CLOSE_FISCAL);
        assert!(driver.flush_on_failure(&frames[0]));
    }
}
