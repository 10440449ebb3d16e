//! Reply validation and field extraction
//!
//! # Reply Layout
//! ```text
//! Hasar / Epson:  STX seq cmd FS pppp FS ffff FS [number ...] ETX cccc
//!                  0   1   2   3  4-7   8  9-12 13  14
//! Epson extended: STX seq c c FS PP FS . AA FS . [number] FS ... ETX CCCC
//!                  0   1  2 3  4 5-6  7 8 9-10 11 12  13
//! ```
//!
//! Offsets are fixed by the devices; every accessor below tolerates short
//! replies and returns a neutral value instead of panicking.

use crate::checksum;
use crate::control::{CHECKSUM_LEN, ETX, FS, STX};
use crate::error::ParseError;
use crate::Dialect;

/// Offset where the receipt number starts in Hasar and Epson replies
pub const RECEIPT_OFFSET: usize = 14;
/// Offset where the receipt number starts in extended replies
pub const RECEIPT_OFFSET_EXT: usize = 13;

/// Status word bit raised when the fiscal memory is exhausted
const FISCAL_MEMORY_FULL_BIT: u16 = 1 << 11;

/// Check the structure of a reply and, where the dialect enforces it, its checksum
///
/// `command` is the command byte of the packet that was sent; the extended
/// dialect does not echo it at a fixed offset and ignores it.
pub fn validate(dialect: Dialect, reply: &[u8], command: u8) -> Result<(), ParseError> {
    structure(dialect, reply, command)?;

    match dialect {
        Dialect::Epson | Dialect::EpsonExt => checksum::verify(reply)
            .map_err(|(expected, actual)| ParseError::ChecksumMismatch { expected, actual }),
        // Hasar replies are accepted once the structure matches
        Dialect::Hasar | Dialect::Hasar2G => Ok(()),
    }
}

fn structure(dialect: Dialect, reply: &[u8], command: u8) -> Result<(), ParseError> {
    let min = match dialect {
        Dialect::EpsonExt => 5 + 1 + CHECKSUM_LEN,
        _ => 4 + 1 + CHECKSUM_LEN,
    };
    if reply.len() < min {
        return Err(ParseError::StructuralMismatch(format!(
            "reply too short ({} bytes)",
            reply.len()
        )));
    }
    if reply[0] != STX {
        return Err(ParseError::StructuralMismatch("no STX".into()));
    }
    match dialect {
        Dialect::EpsonExt => {
            if reply[4] != FS {
                return Err(ParseError::StructuralMismatch("no FS after command".into()));
            }
        }
        _ => {
            if reply[2] != command {
                return Err(ParseError::StructuralMismatch(format!(
                    "command echo 0x{:02x}, expected 0x{:02x}",
                    reply[2], command
                )));
            }
            if reply[3] != FS {
                return Err(ParseError::StructuralMismatch("no FS after command".into()));
            }
        }
    }
    if reply[reply.len() - CHECKSUM_LEN - 1] != ETX {
        return Err(ParseError::StructuralMismatch("no ETX".into()));
    }
    Ok(())
}

/// Read the receipt number starting at `offset`, up to `terminator`
///
/// The field is trimmed and parsed as a decimal integer; anything
/// unparsable yields 0.
pub fn receipt_number(reply: &[u8], offset: usize, terminator: u8) -> i64 {
    let Some(tail) = reply.get(offset..) else {
        return 0;
    };
    let end = tail
        .iter()
        .position(|&b| b == terminator)
        .unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end])
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Big-endian status word of an extended reply
pub fn status_word(reply: &[u8]) -> Option<u16> {
    reply
        .get(5..7)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Whether an extended reply reports a full fiscal memory
pub fn fiscal_memory_full(reply: &[u8]) -> bool {
    status_word(reply).is_some_and(|w| w & FISCAL_MEMORY_FULL_BIT != 0)
}

/// Whether a continue-audit reply asks for another continuation
pub fn audit_has_more(reply: &[u8]) -> bool {
    reply.get(9..11) == Some(&[0x00, 0x00][..])
}

/// Last field of a reply, up to ETX
///
/// Download replies carry their journal chunk there.
pub fn last_field(reply: &[u8]) -> Vec<u8> {
    let end = reply
        .iter()
        .rposition(|&b| b == ETX)
        .unwrap_or(reply.len());
    let body = &reply[..end];
    let start = body.iter().rposition(|&b| b == FS).map_or(0, |i| i + 1);
    body[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic_reply(cmd: u8, number: &str) -> Vec<u8> {
        let mut bytes = vec![STX, 0x20, cmd, FS];
        bytes.extend_from_slice(b"0000");
        bytes.push(FS);
        bytes.extend_from_slice(b"0600");
        bytes.push(FS);
        bytes.extend_from_slice(number.as_bytes());
        bytes.push(ETX);
        let trailer = checksum::encode(Dialect::Hasar, &bytes);
        bytes.extend_from_slice(&trailer);
        bytes
    }

    fn ext_reply(status: u16, flag: [u8; 2], number: &str) -> Vec<u8> {
        let [hi, lo] = status.to_be_bytes();
        let mut bytes = vec![STX, 0x81, 0x0B, 0x06, FS, hi, lo, FS, 0x00, flag[0], flag[1], FS, 0x00];
        bytes.extend_from_slice(number.as_bytes());
        bytes.push(FS);
        bytes.extend_from_slice(b"chunk");
        bytes.push(ETX);
        let trailer = checksum::encode(Dialect::EpsonExt, &bytes);
        bytes.extend_from_slice(&trailer);
        bytes
    }

    #[test]
    fn test_validate_classic_reply() {
        let reply = classic_reply(0x45, "00001234");
        assert!(validate(Dialect::Epson, &reply, 0x45).is_ok());
        assert!(validate(Dialect::Hasar, &reply, 0x45).is_ok());
        assert!(matches!(
            validate(Dialect::Epson, &reply, 0x44),
            Err(ParseError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_checksum_enforcement_differs() {
        let mut reply = classic_reply(0x2a, "1");
        let last = reply.len() - 1;
        reply[last] = if reply[last] == b'f' { b'e' } else { b'f' };
        assert!(matches!(
            validate(Dialect::Epson, &reply, 0x2a),
            Err(ParseError::ChecksumMismatch { .. })
        ));
        assert!(validate(Dialect::Hasar, &reply, 0x2a).is_ok());
    }

    #[test]
    fn test_short_reply_is_structural_mismatch() {
        assert!(matches!(
            validate(Dialect::Hasar, &[STX, 0x20, ETX], 0x2a),
            Err(ParseError::StructuralMismatch(_))
        ));
        assert!(matches!(
            validate(Dialect::EpsonExt, &[], 0x2a),
            Err(ParseError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn test_receipt_number_classic() {
        let reply = classic_reply(0x45, " 00001234 ");
        assert_eq!(receipt_number(&reply, RECEIPT_OFFSET, ETX), 1234);

        let reply = classic_reply(0x45, "77\x1c99");
        assert_eq!(receipt_number(&reply, RECEIPT_OFFSET, FS), 77);
    }

    #[test]
    fn test_receipt_number_unparsable_is_zero() {
        let reply = classic_reply(0x45, "ABC");
        assert_eq!(receipt_number(&reply, RECEIPT_OFFSET, ETX), 0);
        assert_eq!(receipt_number(&[STX], RECEIPT_OFFSET, ETX), 0);
    }

    #[test]
    fn test_extended_reply_fields() {
        let reply = ext_reply(0x0800, [0, 0], "42");
        assert!(validate(Dialect::EpsonExt, &reply, 0).is_ok());
        assert_eq!(status_word(&reply), Some(0x0800));
        assert!(fiscal_memory_full(&reply));
        assert!(audit_has_more(&reply));
        assert_eq!(receipt_number(&reply, RECEIPT_OFFSET_EXT, FS), 42);
        assert_eq!(last_field(&reply), b"chunk".to_vec());

        let reply = ext_reply(0x0000, [0, 1], "42");
        assert!(!fiscal_memory_full(&reply));
        assert!(!audit_has_more(&reply));
    }
}
