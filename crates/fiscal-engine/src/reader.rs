//! Reply reassembly for the byte dialects
//!
//! # State Machine
//! ```text
//! SCANNING --STX--> IN_FRAME --ETX--> READING_CHECKSUM --4 chars--> DONE
//!    |                  |
//!    +--NAK--> NAK      +--0x80 after STX--> drain intermediate --> SCANNING
//! ```
//!
//! Every empty poll sleeps one poll interval and counts as an attempt.
//! Keepalive bytes also sleep and count; other bytes seen while scanning are
//! noise. Reaching the attempt ceiling while scanning is a timeout; reaching
//! it inside a frame returns the partial frame, which then fails validation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fiscal_protocol::checksum;
use fiscal_protocol::control::{is_keepalive, CHECKSUM_LEN, ETX, INTERMEDIATE, NAK, STX};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::TransportError;
use crate::transport::ByteTransport;

/// Result of reading one reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Complete frame, or the partial frame held when the ceiling was hit
    Frame(Vec<u8>),
    Nak,
    /// Ceiling reached without a frame start
    Timeout,
    /// The continue flag was cleared
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    InFrame,
    ReadingChecksum { remaining: usize },
}

/// Reassembles framed replies from a polled byte transport
#[derive(Debug, Clone)]
pub struct FrameReader {
    poll_interval: Duration,
    max_attempts: u32,
    max_frame_len: usize,
    intermediate_packets: bool,
}

impl FrameReader {
    pub fn new(config: &EngineConfig, intermediate_packets: bool) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_attempts: config.max_read_attempts,
            max_frame_len: config.max_frame_len,
            intermediate_packets,
        }
    }

    /// Read one reply
    pub async fn read(
        &self,
        transport: &mut dyn ByteTransport,
        running: &AtomicBool,
    ) -> Result<ReadOutcome, TransportError> {
        let mut state = State::Scanning;
        let mut frame = Vec::new();
        let mut attempts = 0u32;

        loop {
            if !running.load(Ordering::SeqCst) {
                return Ok(ReadOutcome::Cancelled);
            }
            if attempts >= self.max_attempts {
                return Ok(match state {
                    State::Scanning => ReadOutcome::Timeout,
                    _ => {
                        debug!("Read ceiling reached inside a frame ({} bytes)", frame.len());
                        ReadOutcome::Frame(frame)
                    }
                });
            }

            let Some(&byte) = transport.read(1)?.first() else {
                attempts += 1;
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            match state {
                State::Scanning => match byte {
                    NAK => return Ok(ReadOutcome::Nak),
                    STX => {
                        frame.push(STX);
                        state = State::InFrame;
                    }
                    b if is_keepalive(b) => {
                        trace!("Keepalive 0x{:02x}", b);
                        attempts += 1;
                        tokio::time::sleep(self.poll_interval).await;
                    }
                    b => {
                        trace!("Noise 0x{:02x}", b);
                        attempts += 1;
                    }
                },
                State::InFrame => {
                    if self.intermediate_packets && frame.len() == 1 && byte == INTERMEDIATE {
                        self.drain_intermediate(transport, running, &mut attempts)
                            .await?;
                        frame.clear();
                        state = State::Scanning;
                        continue;
                    }
                    frame.push(byte);
                    if byte == ETX {
                        state = State::ReadingChecksum {
                            remaining: CHECKSUM_LEN,
                        };
                    } else if frame.len() >= self.max_frame_len {
                        warn!("Reply exceeds {} bytes", self.max_frame_len);
                        return Ok(ReadOutcome::Frame(frame));
                    }
                }
                State::ReadingChecksum { remaining } => {
                    frame.push(byte);
                    if remaining == 1 {
                        return Ok(ReadOutcome::Frame(frame));
                    }
                    state = State::ReadingChecksum {
                        remaining: remaining - 1,
                    };
                }
            }
        }
    }

    /// Consume an intermediate packet through its checksum
    ///
    /// Called after `STX 0x80`. Shares the caller's attempt budget.
    async fn drain_intermediate(
        &self,
        transport: &mut dyn ByteTransport,
        running: &AtomicBool,
        attempts: &mut u32,
    ) -> Result<(), TransportError> {
        let mut packet = vec![STX, INTERMEDIATE];
        let mut seen_etx = false;
        let mut trailer = 0usize;

        while trailer < CHECKSUM_LEN {
            if !running.load(Ordering::SeqCst) || *attempts >= self.max_attempts {
                debug!("Intermediate packet cut short ({} bytes)", packet.len());
                return Ok(());
            }
            let Some(&byte) = transport.read(1)?.first() else {
                *attempts += 1;
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };
            packet.push(byte);
            if seen_etx {
                trailer += 1;
            } else if byte == ETX {
                seen_etx = true;
            }
        }

        match checksum::verify(&packet) {
            Ok(()) => debug!("Drained intermediate packet ({} bytes)", packet.len()),
            Err((expected, actual)) => warn!(
                "Intermediate packet checksum {:04x}, computed {:04x}",
                expected, actual
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use fiscal_protocol::control::{ACK, DC2, FS};
    use fiscal_protocol::Dialect;

    fn reader(intermediate: bool) -> FrameReader {
        let config = EngineConfig {
            max_read_attempts: 10,
            ..Default::default()
        };
        FrameReader::new(&config, intermediate)
    }

    fn reply() -> Vec<u8> {
        let mut bytes = vec![STX, 0x20, 0x2a, FS, b'0', ETX];
        bytes.extend_from_slice(&checksum::encode(Dialect::Hasar, &bytes));
        bytes
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_frame_after_keepalives_and_noise() {
        let mut input = vec![DC2, ACK, b'x'];
        input.extend(reply());
        let mut transport = ScriptedTransport::with_input(&input);
        let running = AtomicBool::new(true);

        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Frame(reply()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak() {
        let mut transport = ScriptedTransport::with_input(&[NAK]);
        let running = AtomicBool::new(true);
        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Nak);
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_only_times_out() {
        let mut transport = ScriptedTransport::with_input(&[b'n'; 64]);
        let running = AtomicBool::new(true);
        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let mut transport = ScriptedTransport::with_input(&[]);
        let running = AtomicBool::new(true);
        let start = tokio::time::Instant::now();
        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Timeout);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frame_returned_at_ceiling() {
        let mut transport = ScriptedTransport::with_input(&[STX, 0x20, 0x2a]);
        let running = AtomicBool::new(true);
        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Frame(vec![STX, 0x20, 0x2a]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled() {
        let mut transport = ScriptedTransport::with_input(&reply());
        let running = AtomicBool::new(false);
        let outcome = reader(false).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intermediate_packet_is_drained() {
        let mut intermediate = vec![STX, INTERMEDIATE, 0x00, 0x01, ETX];
        intermediate.extend_from_slice(&checksum::encode(Dialect::EpsonExt, &intermediate));
        let mut input = intermediate;
        input.extend(reply());
        let running = AtomicBool::new(true);

        let mut transport = ScriptedTransport::with_input(&input);
        let outcome = reader(true).read(&mut transport, &running).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Frame(reply()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_frame_is_cut() {
        let config = EngineConfig {
            max_frame_len: 16,
            ..Default::default()
        };
        let mut input = vec![STX];
        input.extend([b'a'; 40]);
        let mut transport = ScriptedTransport::with_input(&input);
        let running = AtomicBool::new(true);
        let outcome = FrameReader::new(&config, false)
            .read(&mut transport, &running)
            .await
            .unwrap();
        assert!(matches!(outcome, ReadOutcome::Frame(f) if f.len() == 16));
    }
}
