//! Frame checksums
//!
//! The checksum is a running sum over every byte of the assembled frame that
//! precedes it (STX through ETX), reduced to 16 bits and sent as four hex
//! characters. The dialects disagree on how a byte is summed and on letter
//! case.

use crate::control::CHECKSUM_LEN;
use crate::Dialect;

/// Sum the bytes of an outbound frame the way `dialect` expects
pub fn sum(dialect: Dialect, bytes: &[u8]) -> u16 {
    let total: i64 = match dialect {
        Dialect::Epson => bytes.iter().map(|&b| i64::from(b as i8)).sum(),
        _ => bytes.iter().map(|&b| i64::from(b)).sum(),
    };
    (total & 0xFFFF) as u16
}

/// Render the checksum trailer of an outbound frame
pub fn encode(dialect: Dialect, bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let value = sum(dialect, bytes);
    let text = match dialect {
        Dialect::EpsonExt => format!("{:04X}", value),
        _ => format!("{:04x}", value),
    };
    let mut out = [b'0'; CHECKSUM_LEN];
    out.copy_from_slice(text.as_bytes());
    out
}

/// Parse a 4-character hex trailer
pub fn parse(trailer: &[u8]) -> Option<u16> {
    if trailer.len() != CHECKSUM_LEN {
        return None;
    }
    let text = std::str::from_utf8(trailer).ok()?;
    u16::from_str_radix(text, 16).ok()
}

/// Check a received frame against its trailer
///
/// Replies are summed as unsigned bytes in every dialect. Returns the
/// `(expected, actual)` pair on mismatch, where `expected` is the trailer.
pub fn verify(frame: &[u8]) -> Result<(), (u16, u16)> {
    if frame.len() < CHECKSUM_LEN {
        return Err((0, 0));
    }
    let (body, trailer) = frame.split_at(frame.len() - CHECKSUM_LEN);
    let actual = sum(Dialect::Hasar, body);
    match parse(trailer) {
        Some(expected) if expected == actual => Ok(()),
        Some(expected) => Err((expected, actual)),
        None => Err((0, actual)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ETX, FS, STX};

    #[test]
    fn test_hasar_status_checksum() {
        // STX 0x20 '*' ETX
        let frame = [STX, 0x20, 0x2a, ETX];
        assert_eq!(sum(Dialect::Hasar, &frame), 0x4f);
        assert_eq!(&encode(Dialect::Hasar, &frame), b"004f");
    }

    #[test]
    fn test_epson_sums_signed_bytes() {
        let frame = [STX, 0x20, 0x2a, FS, 0xE1, ETX];
        // 0xE1 counts as -31
        let expected = (0x02 + 0x20 + 0x2a + 0x1c - 31 + 0x03) as u16;
        assert_eq!(sum(Dialect::Epson, &frame), expected);
        assert_ne!(sum(Dialect::Epson, &frame), sum(Dialect::Hasar, &frame));
    }

    #[test]
    fn test_epson_negative_total_wraps() {
        let frame = [0xFF, 0xFF];
        assert_eq!(sum(Dialect::Epson, &frame), 0xFFFE);
    }

    #[test]
    fn test_extended_checksum_is_uppercase() {
        let frame = [STX, 0x81, 0x00, 0x01, FS, 0x00, 0x00, ETX];
        assert_eq!(&encode(Dialect::EpsonExt, &frame), b"00A3");
    }

    #[test]
    fn test_verify_reply() {
        let mut frame = vec![STX, 0x20, 0x2a, FS, b'0', ETX];
        let trailer = encode(Dialect::Hasar, &frame);
        frame.extend_from_slice(&trailer);
        assert!(verify(&frame).is_ok());

        let last = frame.len() - 1;
        frame[last] = if frame[last] == b'0' { b'1' } else { b'0' };
        assert!(verify(&frame).is_err());
    }

    #[test]
    fn test_verify_accepts_either_case() {
        let mut frame = vec![STX, 0x81, 0xEE, ETX];
        frame.extend_from_slice(b"0174");
        assert!(verify(&frame).is_ok());
        assert_eq!(parse(b"01aF"), Some(0x01AF));
        assert_eq!(parse(b"zz00"), None);
    }
}
