//! Epson extended driver

use fiscal_protocol::control::FS;
use fiscal_protocol::epson_ext::{
    self, TAG_CONTINUE_AUDIT, TAG_DOWNLOAD_BY_DATE, TAG_DOWNLOAD_BY_NUMBER,
    TAG_DOWNLOAD_CONTINUE, TAG_DOWNLOAD_FINALIZE, TAG_MEMORY_INFO,
};
use fiscal_protocol::{reply, Dialect, Frame};
use tracing::{debug, warn};

use super::{AckMode, ByteDriver, Outcome};
use crate::error::FiscalError;
use crate::events::{DataKind, FiscalEvent};

/// Driver for the TM-T900
///
/// Replies carry a status word that is checked before the reply is
/// acknowledged, and audit reports are paged through continuation requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsonExtDriver;

fn data_kind(tag: u8) -> Option<DataKind> {
    match tag {
        TAG_MEMORY_INFO | TAG_DOWNLOAD_BY_DATE | TAG_DOWNLOAD_BY_NUMBER => {
            Some(DataKind::DownloadReport)
        }
        TAG_DOWNLOAD_CONTINUE => Some(DataKind::DownloadContinue),
        TAG_DOWNLOAD_FINALIZE => Some(DataKind::DownloadFinalize),
        _ => None,
    }
}

impl ByteDriver for EpsonExtDriver {
    fn dialect(&self) -> Dialect {
        Dialect::EpsonExt
    }

    fn ack_mode(&self) -> AckMode {
        AckMode::AckAndConsume
    }

    fn intermediate_packets(&self) -> bool {
        true
    }

    fn inspect(&self, frame: &Frame, reply: &[u8]) -> Result<Outcome, FiscalError> {
        if reply::fiscal_memory_full(reply) {
            warn!(
                "Fiscal memory full (status word {:04x})",
                reply::status_word(reply).unwrap_or_default()
            );
            return Err(FiscalError::FiscalMemoryFull);
        }

        let mut outcome = Outcome::default();
        if frame.command == TAG_CONTINUE_AUDIT {
            if reply::audit_has_more(reply) {
                debug!("Audit report continues");
                outcome.follow_up.push(epson_ext::continue_audit());
            } else {
                debug!("Audit report complete");
                outcome.follow_up.push(epson_ext::close_audit());
            }
        }
        if let Some(kind) = data_kind(frame.command) {
            outcome.events.push(FiscalEvent::Data {
                kind,
                payload: reply::last_field(reply),
            });
        }
        Ok(outcome)
    }

    fn receipt_number(&self, reply: &[u8]) -> i64 {
        reply::receipt_number(reply, reply::RECEIPT_OFFSET_EXT, FS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscal_protocol::checksum;
    use fiscal_protocol::control::{ETX, STX};
    use fiscal_protocol::epson_ext::TAG_CLOSE_AUDIT;

    fn reply(status: u16, flags: [u8; 2], tail: &[u8]) -> Vec<u8> {
        let [hi, lo] = status.to_be_bytes();
        let mut bytes = vec![
            STX, 0x81, 0x08, 0x14, FS, hi, lo, FS, 0x00, flags[0], flags[1], FS, 0x00,
        ];
        bytes.extend_from_slice(tail);
        bytes.push(ETX);
        let trailer = checksum::encode(Dialect::EpsonExt, &bytes);
        bytes.extend_from_slice(&trailer);
        bytes
    }

    #[test]
    fn test_memory_full_is_an_error() {
        let frame = epson_ext::status_frame();
        let reply = reply(0x0800, [0, 1], b"0");
        assert_eq!(
            EpsonExtDriver.inspect(&frame, &reply),
            Err(FiscalError::FiscalMemoryFull)
        );
    }

    #[test]
    fn test_audit_continuation() {
        let frame = epson_ext::continue_audit();

        let more = EpsonExtDriver
            .inspect(&frame, &reply(0, [0, 0], b"0"))
            .unwrap();
        assert_eq!(more.follow_up.len(), 1);
        assert_eq!(more.follow_up[0].command, TAG_CONTINUE_AUDIT);

        let done = EpsonExtDriver
            .inspect(&frame, &reply(0, [0, 1], b"0"))
            .unwrap();
        assert_eq!(done.follow_up[0].command, TAG_CLOSE_AUDIT);
        assert!(done.events.is_empty());
    }

    #[test]
    fn test_download_chunk_event() {
        let frame = Frame::new(Dialect::EpsonExt, TAG_DOWNLOAD_CONTINUE, vec![0x09, 0x52]);
        let outcome = EpsonExtDriver
            .inspect(&frame, &reply(0, [0, 1], b"1\x1cjournal"))
            .unwrap();
        assert_eq!(
            outcome.events,
            vec![FiscalEvent::Data {
                kind: DataKind::DownloadContinue,
                payload: b"journal".to_vec(),
            }]
        );
        assert!(outcome.follow_up.is_empty());
    }

    #[test]
    fn test_receipt_number() {
        let reply = reply(0, [0, 1], b"00000077\x1c");
        assert_eq!(EpsonExtDriver.receipt_number(&reply), 77);
    }
}
