//! Virtual byte-level fiscal printer
//!
//! Parses every frame written to it and queues a reply shaped the way the
//! real devices answer:
//!
//! ```text
//! Hasar / Epson:  STX seq cmd FS 0000 FS 0600 FS number ETX cccc
//! Epson extended: STX seq fam sub FS status FS 00 flags FS 00 number FS chunk ETX CCCC
//! ```
//!
//! The receipt counter advances on every document close. Faults are scripted
//! through [`Faults`]; counted faults apply to the next N frames and then
//! wear off.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use fiscal_engine::{ByteTransport, TransportError};
use fiscal_protocol::checksum;
use fiscal_protocol::control::{ACK, DC2, DC4, ETX, FNU, FS, INTERMEDIATE, NAK, STX};
use fiscal_protocol::{Dialect, Frame, Model};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::SimError;

/// Classic command bytes that close a document
const CLASSIC_CLOSES: [u8; 3] = [0x45, 0x65, 0x81];
/// Extended families whose sub-command 0x06 closes a document
const EXT_CLOSE_FAMILIES: [u8; 3] = [0x0A, 0x0B, 0x0D];
const EXT_CLOSE: u8 = 0x06;
/// Extended continue-audit command
const EXT_CONTINUE_AUDIT: [u8; 2] = [0x08, 0x14];
/// Status word bit reporting a full fiscal memory
const MEMORY_FULL_BIT: u16 = 1 << 11;

/// Scripted misbehaviour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faults {
    /// Answer the next N frames with a bare NAK
    pub nak_burst: u32,
    /// Answer every frame with control bytes and noise only
    pub noise: bool,
    /// Flip a checksum character in the next N replies
    pub corrupt_checksum: u32,
    /// Echo a wrong command byte in the next N replies
    pub wrong_echo: u32,
    /// Precede the next N replies with an intermediate packet
    pub intermediate_packets: u32,
    /// Report a full fiscal memory in every extended reply
    pub memory_full: bool,
    /// Continue-audit replies announcing more data before the last one
    pub audit_pages: u32,
}

#[derive(Debug)]
struct State {
    input: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    commands: Vec<Vec<u8>>,
    acks: usize,
    receipt_number: i64,
    faults: Faults,
    open: bool,
}

/// Simulated serial fiscal printer
///
/// Clones share the same device, so one clone can be handed to the engine
/// as its transport while another inspects what was written.
#[derive(Debug, Clone)]
pub struct VirtualPrinter {
    model: Model,
    state: Arc<Mutex<State>>,
}

impl VirtualPrinter {
    pub fn new(model: Model) -> Result<Self, SimError> {
        if !model.dialect().is_byte_oriented() {
            return Err(SimError::NotByteOriented(model));
        }
        Ok(Self {
            model,
            state: Arc::new(Mutex::new(State {
                input: VecDeque::new(),
                writes: Vec::new(),
                commands: Vec::new(),
                acks: 0,
                receipt_number: 0,
                faults: Faults::default(),
                open: true,
            })),
        })
    }

    pub fn with_faults(self, faults: Faults) -> Self {
        self.lock().faults = faults;
        self
    }

    /// Replace the scripted faults
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Start the receipt counter at `number`
    pub fn set_receipt_number(&self, number: i64) {
        self.lock().receipt_number = number;
    }

    /// Number assigned to the last closed document
    pub fn receipt_number(&self) -> i64 {
        self.lock().receipt_number
    }

    /// Every write, in order, ACK bytes included
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Command bytes of every frame received (family and sub-command for
    /// the extended dialect)
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.lock().commands.clone()
    }

    /// Number of ACK bytes received
    pub fn acks(&self) -> usize {
        self.lock().acks
    }

    /// Queue raw bytes as if the device had sent them unprompted
    pub fn inject(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes.iter().copied());
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dialect(&self) -> Dialect {
        self.model.dialect()
    }

    fn receive(&self, bytes: &[u8]) -> Result<(), SimError> {
        let dialect = self.dialect();
        let decoded = Frame::decode(dialect, bytes)?;
        let mut state = self.lock();

        let command = match decoded.command {
            Some(cmd) => vec![cmd],
            None => decoded.body.iter().take(2).copied().collect(),
        };
        trace!("Received command {:02X?}", command);
        state.commands.push(command.clone());

        if state.faults.nak_burst > 0 {
            state.faults.nak_burst -= 1;
            state.input.push_back(NAK);
            return Ok(());
        }
        if state.faults.noise {
            state.input.extend([DC2, ACK, DC4, FNU, b'x', b'?']);
            return Ok(());
        }

        if self.closes_document(&command) {
            state.receipt_number += 1;
        }
        if dialect == Dialect::EpsonExt && state.faults.intermediate_packets > 0 {
            state.faults.intermediate_packets -= 1;
            let packet = seal(Dialect::EpsonExt, vec![STX, INTERMEDIATE, 0x00, 0x01, ETX]);
            state.input.extend(packet);
        }

        let mut reply = match dialect {
            Dialect::EpsonExt => self.extended_reply(&mut state, decoded.sequence, &command),
            _ => self.classic_reply(&mut state, decoded.sequence, command[0]),
        };

        if state.faults.corrupt_checksum > 0 {
            state.faults.corrupt_checksum -= 1;
            let last = reply.len() - 1;
            reply[last] = if reply[last] == b'0' { b'1' } else { b'0' };
        }
        debug!("Replying {:02X?}", reply);
        state.input.extend(reply);
        Ok(())
    }

    fn closes_document(&self, command: &[u8]) -> bool {
        match (self.dialect(), command) {
            (Dialect::EpsonExt, [family, sub]) => {
                EXT_CLOSE_FAMILIES.contains(family) && *sub == EXT_CLOSE
            }
            (Dialect::EpsonExt, _) => false,
            (_, [cmd]) => CLASSIC_CLOSES.contains(cmd),
            _ => false,
        }
    }

    fn classic_reply(&self, state: &mut State, sequence: u8, command: u8) -> Vec<u8> {
        let echo = if state.faults.wrong_echo > 0 {
            state.faults.wrong_echo -= 1;
            command.wrapping_add(1)
        } else {
            command
        };
        let mut bytes = vec![STX, sequence, echo, FS];
        bytes.extend_from_slice(b"0000");
        bytes.push(FS);
        bytes.extend_from_slice(b"0600");
        bytes.push(FS);
        bytes.extend_from_slice(format!("{:08}", state.receipt_number).as_bytes());
        if self.model == Model::Hasar330F {
            bytes.push(FS);
            bytes.push(b'0');
        }
        bytes.push(ETX);
        seal(Dialect::Hasar, bytes)
    }

    fn extended_reply(&self, state: &mut State, sequence: u8, command: &[u8]) -> Vec<u8> {
        let status: u16 = if state.faults.memory_full {
            MEMORY_FULL_BIT
        } else {
            0
        };
        let more = command == EXT_CONTINUE_AUDIT && state.faults.audit_pages > 0;
        if more {
            state.faults.audit_pages -= 1;
        }
        let flags = if more { [0x00, 0x00] } else { [0x00, 0x01] };

        let [hi, lo] = status.to_be_bytes();
        let mut bytes = vec![STX, sequence];
        bytes.extend_from_slice(command);
        if state.faults.wrong_echo > 0 {
            // The extended echo is not checked; break the layout instead
            state.faults.wrong_echo -= 1;
            bytes.push(b'!');
        }
        bytes.extend_from_slice(&[FS, hi, lo, FS, 0x00, flags[0], flags[1], FS, 0x00]);
        bytes.extend_from_slice(format!("{:08}", state.receipt_number).as_bytes());
        bytes.push(FS);
        bytes.extend_from_slice(format!("chunk-{}", state.commands.len()).as_bytes());
        bytes.push(ETX);
        seal(Dialect::EpsonExt, bytes)
    }
}

/// Append the checksum trailer to a reply
fn seal(dialect: Dialect, mut bytes: Vec<u8>) -> Vec<u8> {
    let trailer = checksum::encode(dialect, &bytes);
    bytes.extend_from_slice(&trailer);
    bytes
}

impl ByteTransport for VirtualPrinter {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        {
            let mut state = self.lock();
            if !state.open {
                return Err(TransportError::Closed);
            }
            state.writes.push(bytes.to_vec());
            if bytes == [ACK] {
                state.acks += 1;
                if self.dialect() == Dialect::EpsonExt {
                    state.input.push_back(ACK);
                }
                return Ok(bytes.len());
            }
        }
        if bytes.first() == Some(&STX) {
            if let Err(e) = self.receive(bytes) {
                warn!("Ignoring packet: {}", e);
            }
        }
        Ok(bytes.len())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        let n = n.min(state.input.len());
        Ok(state.input.drain(..n).collect())
    }

    fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(self.lock().input.drain(..).collect())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.lock().input.len())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn close(&mut self) {
        self.lock().open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscal_protocol::{create_frame_encoder, reply, FieldLimits, FiscalCommand};
    use pretty_assertions::assert_eq;

    fn frame(model: Model, command: FiscalCommand) -> Frame {
        create_frame_encoder(model, FieldLimits::default())
            .unwrap()
            .encode(&command)
            .remove(0)
    }

    #[test]
    fn test_json_model_rejected() {
        assert!(matches!(
            VirtualPrinter::new(Model::Hasar1000F),
            Err(SimError::NotByteOriented(Model::Hasar1000F))
        ));
    }

    #[test]
    fn test_classic_reply_validates() {
        let mut printer = VirtualPrinter::new(Model::EpsonTMU220).unwrap();
        let status = frame(Model::EpsonTMU220, FiscalCommand::StatusRequest);
        printer.write(status.bytes()).unwrap();

        let reply = printer.read_all().unwrap();
        assert!(reply::validate(Dialect::Epson, &reply, status.command).is_ok());
        assert_eq!(reply[1], status.sequence);
        assert_eq!(printer.commands(), vec![vec![status.command]]);
    }

    #[test]
    fn test_close_advances_counter() {
        let mut printer = VirtualPrinter::new(Model::Hasar330F).unwrap();
        printer.set_receipt_number(41);
        let close = frame(
            Model::Hasar330F,
            FiscalCommand::CloseFiscalReceipt {
                intype: 'T',
                kind: 'B',
                id: 1,
            },
        );
        printer.write(close.bytes()).unwrap();
        let reply = printer.read_all().unwrap();
        assert_eq!(reply::receipt_number(&reply, reply::RECEIPT_OFFSET, FS), 42);
        assert_eq!(printer.receipt_number(), 42);
    }

    #[test]
    fn test_extended_reply_layout() {
        let mut printer = VirtualPrinter::new(Model::EpsonTM900).unwrap().with_faults(Faults {
            memory_full: true,
            ..Default::default()
        });
        let status = frame(Model::EpsonTM900, FiscalCommand::StatusRequest);
        printer.write(status.bytes()).unwrap();

        let reply = printer.read_all().unwrap();
        assert!(reply::validate(Dialect::EpsonExt, &reply, 0).is_ok());
        assert!(reply::fiscal_memory_full(&reply));
        assert!(!reply::audit_has_more(&reply));
    }

    #[test]
    fn test_counted_faults_wear_off() {
        let mut printer = VirtualPrinter::new(Model::Hasar615F).unwrap().with_faults(Faults {
            nak_burst: 1,
            ..Default::default()
        });
        let status = frame(Model::Hasar615F, FiscalCommand::StatusRequest);
        printer.write(status.bytes()).unwrap();
        assert_eq!(printer.read_all().unwrap(), vec![NAK]);

        printer.write(status.bytes()).unwrap();
        let reply = printer.read_all().unwrap();
        assert_eq!(reply[0], STX);
    }

    #[test]
    fn test_closed_printer_refuses_writes() {
        let mut printer = VirtualPrinter::new(Model::Hasar615F).unwrap();
        printer.close();
        assert!(!printer.is_open());
        assert!(matches!(printer.write(&[ACK]), Err(TransportError::Closed)));
    }
}
