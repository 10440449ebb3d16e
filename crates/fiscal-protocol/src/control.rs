//! Control bytes shared by the byte-oriented dialects

/// Start of text, opens every frame
pub const STX: u8 = 0x02;
/// End of text, precedes the 4-character checksum
pub const ETX: u8 = 0x03;
/// Positive acknowledgement
pub const ACK: u8 = 0x06;
/// Device busy keepalives
pub const DC1: u8 = 0x11;
pub const DC2: u8 = 0x12;
pub const DC3: u8 = 0x13;
pub const DC4: u8 = 0x14;
/// Negative acknowledgement, the device wants the last frame again
pub const NAK: u8 = 0x15;
/// Escape prefix used inside extended-protocol commands
pub const ESC: u8 = 0x1B;
/// Field separator
pub const FS: u8 = 0x1C;
/// "Function not usable" keepalive
pub const FNU: u8 = 0x1D;
/// Sequence value marking an extended-protocol intermediate packet
pub const INTERMEDIATE: u8 = 0x80;

/// Length of the hex checksum trailer
pub const CHECKSUM_LEN: usize = 4;

/// Bytes the device emits while it is still working on a command
pub fn is_keepalive(byte: u8) -> bool {
    matches!(byte, DC1 | DC2 | DC3 | DC4 | FNU | ACK)
}

/// Bytes that may never appear inside a field
pub fn is_sentinel(byte: u8) -> bool {
    matches!(byte, STX | ETX | FS | ESC | NAK | ACK) || is_keepalive(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_bytes() {
        for b in [DC1, DC2, DC3, DC4, FNU, ACK] {
            assert!(is_keepalive(b));
        }
        assert!(!is_keepalive(NAK));
        assert!(!is_keepalive(STX));
        assert!(!is_keepalive(b'A'));
    }
}
