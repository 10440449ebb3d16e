//! Byte frames for the Hasar, Epson and Epson extended dialects
//!
//! # Frame Format
//! ```text
//! Hasar / Epson:  STX seq cmd [FS field (FS field)*] ETX c c c c
//! Epson extended: STX seq family sub FS ext ext [FS field]* ETX C C C C
//! ```
//!
//! The sequence byte is drawn from the dialect counter when the frame is
//! built. The extended dialect has no command byte on the wire: its command
//! code only tags the frame for the engine.

use crate::checksum;
use crate::control::{CHECKSUM_LEN, ETX, FS, STX};
use crate::error::ParseError;
use crate::sequence::next_sequence;
use crate::Dialect;

/// Status request command code, shared by every byte dialect
pub const CMD_STATUS: u8 = 0x2a;
/// Command codes shared by Hasar and Epson
pub const CMD_DAILY_CLOSE: u8 = 0x39;
pub const CMD_DAILY_CLOSE_BY_DATE: u8 = 0x3a;
pub const CMD_DAILY_CLOSE_BY_NUMBER: u8 = 0x3b;
pub const CMD_OPEN_NON_FISCAL: u8 = 0x48;
pub const CMD_NON_FISCAL_TEXT: u8 = 0x49;
pub const CMD_CLOSE_NON_FISCAL: u8 = 0x4a;
pub const CMD_SET_DATE_TIME: u8 = 0x58;
pub const CMD_HEADER_TRAILER: u8 = 0x5d;
pub const CMD_OPEN_DRAWER: u8 = 0x7b;

/// Marks a frame whose reply carries a receipt number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptTag {
    /// Caller document id echoed back in the event
    pub id: i32,
    /// 0 for invoices and tickets, 1 for credit notes
    pub kind: u8,
}

/// One outbound command packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Dialect the frame was built for
    pub dialect: Dialect,
    /// Sequence byte drawn at construction
    pub sequence: u8,
    /// Command code (engine-internal tag for the extended dialect)
    pub command: u8,
    /// Payload without sentinels
    pub data: Vec<u8>,
    /// Receipt number routing, when the reply assigns one
    pub receipt: Option<ReceiptTag>,
    bytes: Vec<u8>,
}

impl Frame {
    /// Build a frame drawing the next sequence byte of `dialect`
    pub fn new(dialect: Dialect, command: u8, data: Vec<u8>) -> Self {
        Self::with_sequence(dialect, next_sequence(dialect), command, data)
    }

    /// Build a frame with an explicit sequence byte
    pub fn with_sequence(dialect: Dialect, sequence: u8, command: u8, data: Vec<u8>) -> Self {
        let mut bytes = Vec::with_capacity(data.len() + 10);
        bytes.push(STX);
        bytes.push(sequence);
        if dialect == Dialect::EpsonExt {
            bytes.extend_from_slice(&data);
        } else {
            bytes.push(command);
            if !data.is_empty() {
                bytes.push(FS);
                bytes.extend_from_slice(&data);
            }
        }
        bytes.push(ETX);
        let trailer = checksum::encode(dialect, &bytes);
        bytes.extend_from_slice(&trailer);

        Self {
            dialect,
            sequence,
            command,
            data,
            receipt: None,
            bytes,
        }
    }

    /// Tag this frame so its reply yields a receipt number event
    pub fn with_receipt(mut self, id: i32, kind: u8) -> Self {
        self.receipt = Some(ReceiptTag { id, kind });
        self
    }

    /// Wire representation, checksum included
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether this is a status request
    pub fn is_status(&self) -> bool {
        self.command == CMD_STATUS
    }

    /// Split a frame back into sequence, command and payload
    ///
    /// The checksum is recomputed with the dialect's outbound rules.
    pub fn decode(dialect: Dialect, bytes: &[u8]) -> Result<DecodedFrame, ParseError> {
        let min = (if dialect == Dialect::EpsonExt { 3 } else { 4 }) + CHECKSUM_LEN;
        if bytes.len() < min {
            return Err(ParseError::Incomplete {
                needed: min - bytes.len(),
            });
        }
        if bytes[0] != STX {
            return Err(ParseError::InvalidFrame("missing STX".into()));
        }
        let etx = bytes.len() - CHECKSUM_LEN - 1;
        if bytes[etx] != ETX {
            return Err(ParseError::InvalidFrame("missing ETX".into()));
        }

        let trailer = &bytes[etx + 1..];
        let actual = checksum::sum(dialect, &bytes[..=etx]);
        let expected = checksum::parse(trailer)
            .ok_or_else(|| ParseError::InvalidFrame("checksum is not hex".into()))?;
        if expected != actual {
            return Err(ParseError::ChecksumMismatch { expected, actual });
        }

        let sequence = bytes[1];
        if dialect == Dialect::EpsonExt {
            return Ok(DecodedFrame {
                sequence,
                command: None,
                body: bytes[2..etx].to_vec(),
            });
        }

        let command = bytes[2];
        let body = match etx {
            3 => Vec::new(),
            _ if bytes[3] == FS => bytes[4..etx].to_vec(),
            _ => return Err(ParseError::InvalidFrame("missing FS after command".into())),
        };
        Ok(DecodedFrame {
            sequence,
            command: Some(command),
            body,
        })
    }
}

/// Result of [`Frame::decode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub sequence: u8,
    pub command: Option<u8>,
    pub body: Vec<u8>,
}

impl DecodedFrame {
    /// Payload fields split on FS
    pub fn fields(&self) -> Vec<&[u8]> {
        if self.body.is_empty() {
            return Vec::new();
        }
        self.body.split(|&b| b == FS).collect()
    }
}

/// Builder for FS-separated payloads
#[derive(Debug, Default, Clone)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Append text as Latin-1
    pub fn text(mut self, text: &str) -> Self {
        self.bytes.extend(latin1(text));
        self
    }

    /// Append a single byte
    pub fn byte(mut self, byte: u8) -> Self {
        self.bytes.push(byte);
        self
    }

    /// Append a field separator
    pub fn fs(mut self) -> Self {
        self.bytes.push(FS);
        self
    }

    /// Append `count` field separators
    pub fn fs_n(mut self, count: usize) -> Self {
        self.bytes.extend(std::iter::repeat(FS).take(count));
        self
    }

    /// Append a separator followed by a text field
    pub fn field(self, text: &str) -> Self {
        self.fs().text(text)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode text for the printer, replacing characters outside Latin-1
pub fn latin1(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
}

/// First `max` characters of `text`
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Split text into chunks of at most `width` characters
pub fn chunks(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hasar_frame_layout() {
        let frame = Frame::with_sequence(Dialect::Hasar, 0x20, 0x39, b"Z".to_vec());
        assert_eq!(frame.bytes(), &[STX, 0x20, 0x39, FS, b'Z', ETX, b'0', b'0', b'd', b'4'][..]);
    }

    #[test]
    fn test_empty_payload_has_no_separator() {
        let frame = Frame::with_sequence(Dialect::Epson, 0x21, CMD_STATUS, Vec::new());
        assert_eq!(&frame.bytes()[..4], &[STX, 0x21, CMD_STATUS, ETX]);
        assert_eq!(frame.bytes().len(), 8);
        assert!(frame.is_status());
    }

    #[test]
    fn test_extended_frame_has_no_command_byte() {
        let data = Payload::new().raw(&[0x00, 0x01]).fs().raw(&[0x00, 0x00]).into_bytes();
        let frame = Frame::with_sequence(Dialect::EpsonExt, 0x81, CMD_STATUS, data);
        assert_eq!(
            &frame.bytes()[..8],
            &[STX, 0x81, 0x00, 0x01, FS, 0x00, 0x00, ETX]
        );
        assert_eq!(&frame.bytes()[8..], b"00A3");
    }

    #[test]
    fn test_decode_roundtrip() {
        let frame = Frame::with_sequence(
            Dialect::Hasar,
            0x33,
            0x42,
            Payload::new().text("Widget").field("1.00").field("10.00").into_bytes(),
        );
        let decoded = Frame::decode(Dialect::Hasar, frame.bytes()).unwrap();
        assert_eq!(decoded.sequence, 0x33);
        assert_eq!(decoded.command, Some(0x42));
        assert_eq!(decoded.fields(), vec![&b"Widget"[..], b"1.00", b"10.00"]);
    }

    #[test]
    fn test_decode_detects_corruption() {
        let frame = Frame::with_sequence(Dialect::Epson, 0x20, 0x39, b"ZP".to_vec());
        let mut bytes = frame.bytes().to_vec();
        bytes[4] = b'X';
        assert!(matches!(
            Frame::decode(Dialect::Epson, &bytes),
            Err(ParseError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            Frame::decode(Dialect::Epson, &bytes[..5]),
            Err(ParseError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_receipt_tag() {
        let frame = Frame::new(Dialect::Hasar, 0x45, Vec::new()).with_receipt(7, 1);
        assert_eq!(frame.receipt, Some(ReceiptTag { id: 7, kind: 1 }));
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert!(chunks("", 3).is_empty());
        assert_eq!(latin1("año€").collect::<Vec<_>>(), vec![b'a', 0xF1, b'o', b'?']);
    }
}
