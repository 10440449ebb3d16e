//! Queued engine for the byte-stream dialects
//!
//! One worker task per printer. For each queued frame it writes the frame,
//! reads one reply, validates and inspects it through the dialect's
//! [`ByteDriver`], acknowledges it and emits the resulting events. Any
//! failure other than a retried NAK drops the rest of the queue, including
//! commands still waiting in the channel. The queue is dropped before the
//! failure is reported, so commands submitted in reaction to it are kept.
//!
//! Dialects with a recovery sequence run it after failures that may leave a
//! document open on the device: timeouts, unreadable replies and replies
//! that fail verification. A frame the printer refused outright (NAK
//! exhaustion) or one that never left the host (write error) is abandoned
//! without recovery.

use std::collections::VecDeque;

use fiscal_protocol::control::ACK;
use fiscal_protocol::{FiscalCommand, Frame, FrameEncoder, Model};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::driver::{AckMode, ByteDriver};
use crate::error::{FiscalError, TransportError};
use crate::events::FiscalEvent;
use crate::reader::{FrameReader, ReadOutcome};
use crate::transport::ByteTransport;
use crate::worker::{self, EventSink, Mailbox, StopSignal, WorkerHandle, WorkerMessage};

/// Worker state of a byte engine
pub struct ByteEngine {
    transport: Box<dyn ByteTransport>,
    encoder: Box<dyn FrameEncoder>,
    driver: Box<dyn ByteDriver>,
    reader: FrameReader,
    config: EngineConfig,
    queue: VecDeque<Frame>,
    mailbox: Mailbox,
    sink: EventSink,
    stop: StopSignal,
    recovery_count: u32,
    stopping: bool,
}

impl ByteEngine {
    /// Spawn the worker for `model` over `transport`
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        model: Model,
        transport: Box<dyn ByteTransport>,
        encoder: Box<dyn FrameEncoder>,
        driver: Box<dyn ByteDriver>,
        config: &EngineConfig,
        events: mpsc::Sender<FiscalEvent>,
    ) -> WorkerHandle {
        let (tx, mailbox) = worker::channel();
        let stop = StopSignal::new();
        let dialect = driver.dialect();

        let engine = Self {
            transport,
            encoder,
            reader: FrameReader::new(config, driver.intermediate_packets()),
            driver,
            config: config.clone(),
            queue: VecDeque::new(),
            mailbox,
            sink: EventSink::new(events, stop.clone()),
            stop: stop.clone(),
            recovery_count: 0,
            stopping: false,
        };

        let span = info_span!("fiscal_engine", dialect = %dialect, model = %model);
        let task = tokio::spawn(engine.run().instrument(span));
        WorkerHandle::new(tx, stop, task, config.teardown_poll())
    }

    async fn run(mut self) {
        info!("Byte engine started");

        while self.stop.is_running() && !self.stopping {
            while let Some(message) = self.mailbox.try_next() {
                self.accept(message);
            }
            if self.stopping {
                break;
            }

            let Some(frame) = self.queue.front().cloned() else {
                match self.mailbox.next().await {
                    Some(message) => self.accept(message),
                    None => break,
                }
                continue;
            };
            self.exchange(frame).await;
        }

        self.queue.clear();
        self.transport.close();
        info!("Byte engine stopped");
    }

    fn accept(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Command(command) => self.enqueue(&command),
            WorkerMessage::Ack => self.ack(),
            WorkerMessage::Shutdown => self.stopping = true,
        }
    }

    fn enqueue(&mut self, command: &FiscalCommand) {
        let frames = self.encoder.encode(command);
        if frames.is_empty() {
            debug!("{} has no {} form", command.name(), self.driver.dialect());
            return;
        }
        debug!("Queued {} ({} frames)", command.name(), frames.len());
        self.queue.extend(frames);
    }

    fn ack(&mut self) {
        if self.driver.ack_mode() == AckMode::None {
            debug!("Acknowledgement not used by {}", self.driver.dialect());
            return;
        }
        if let Err(e) = self.transport.write(&[ACK]) {
            warn!("Failed to write ACK: {}", e);
        }
    }

    /// Send the frame at the head of the queue and handle its reply
    async fn exchange(&mut self, frame: Frame) {
        let mut naks = 0u32;
        loop {
            debug!("TX {:02X?}", frame.bytes());
            if let Err(e) = self.transport.write(frame.bytes()) {
                self.abandon(&frame, transport_failure(e)).await;
                return;
            }

            let outcome = match self
                .reader
                .read(self.transport.as_mut(), self.stop.flag())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.fail(&frame, transport_failure(e)).await;
                    return;
                }
            };

            match outcome {
                ReadOutcome::Frame(reply) => {
                    self.complete(&frame, &reply).await;
                    return;
                }
                ReadOutcome::Nak => {
                    naks += 1;
                    if naks > self.config.nak_limit {
                        self.abandon(&frame, FiscalError::Nak).await;
                        return;
                    }
                    warn!("NAK {} of {}, resending", naks, self.config.nak_limit);
                    tokio::time::sleep(self.config.nak_delay()).await;
                }
                ReadOutcome::Timeout => {
                    self.fail(&frame, FiscalError::Timeout).await;
                    return;
                }
                ReadOutcome::Cancelled => {
                    debug!("Read cancelled");
                    self.queue.clear();
                    return;
                }
            }
        }
    }

    async fn complete(&mut self, frame: &Frame, reply: &[u8]) {
        debug!("RX {:02X?}", reply);
        if let Err(cause) = self.driver.validate(frame, reply) {
            self.fail(frame, cause).await;
            return;
        }
        let outcome = match self.driver.inspect(frame, reply) {
            Ok(outcome) => outcome,
            Err(cause) => {
                self.fail(frame, cause).await;
                return;
            }
        };
        if let Err(e) = self.acknowledge() {
            self.abandon(frame, transport_failure(e)).await;
            return;
        }

        self.queue.pop_front();
        self.recovery_count = 0;

        if let Some(tag) = frame.receipt {
            let number = self.driver.receipt_number(reply);
            info!("Document {} closed as number {}", tag.id, number);
            self.sink.emit(FiscalEvent::ReceiptNumber {
                id: tag.id,
                number,
                kind: tag.kind,
            })
            .await;
        }
        for event in outcome.events {
            self.sink.emit(event).await;
        }
        if frame.is_status() {
            self.sink.emit(FiscalEvent::ok()).await;
        }
        for frame in outcome.follow_up.into_iter().rev() {
            self.queue.push_front(frame);
        }
    }

    fn acknowledge(&mut self) -> Result<(), TransportError> {
        match self.driver.ack_mode() {
            AckMode::None => {}
            AckMode::Ack => {
                self.transport.write(&[ACK])?;
            }
            AckMode::AckAndConsume => {
                self.transport.write(&[ACK])?;
                let answer = self.transport.read(1)?;
                debug!("ACK answered with {:02X?}", answer);
            }
        }
        Ok(())
    }

    /// Abandon the frame and, if the dialect has one, run its recovery
    async fn fail(&mut self, frame: &Frame, cause: FiscalError) {
        self.abandon(frame, cause).await;
        if let Some(frames) = self.driver.recovery_frames() {
            self.recover(frames).await;
        }
    }

    /// Drop the frame and everything queued behind it, then report the cause
    async fn abandon(&mut self, frame: &Frame, cause: FiscalError) {
        warn!("Frame 0x{:02x} failed: {}", frame.command, cause);
        if self.driver.flush_on_failure(frame) {
            self.flush();
        }
        self.clear();
        self.sink.emit(FiscalEvent::failure(cause)).await;
    }

    /// Drop the queue and every command not yet dequeued
    fn clear(&mut self) {
        if !self.queue.is_empty() {
            debug!("Dropping {} queued frames", self.queue.len());
        }
        self.queue.clear();
        for message in self.mailbox.discard_commands() {
            self.accept(message);
        }
    }

    fn flush(&mut self) {
        match self.transport.read_all() {
            Ok(stale) if !stale.is_empty() => debug!("Flushed {} bytes", stale.len()),
            Ok(_) => {}
            Err(e) => warn!("Failed to flush input: {}", e),
        }
    }

    /// Force any half-open document closed and re-check status
    async fn recover(&mut self, frames: Vec<Frame>) {
        let cap = self.config.recovery_cap;
        if self.recovery_count > cap {
            return;
        }
        if self.recovery_count == cap {
            self.recovery_count += 1;
            warn!("Printer did not recover after {} attempts", cap);
            self.sink.emit(FiscalEvent::failure(FiscalError::Unrecoverable)).await;
            return;
        }

        self.recovery_count += 1;
        info!("Recovery attempt {} of {}", self.recovery_count, cap);
        for frame in &frames {
            debug!("TX {:02X?}", frame.bytes());
            if let Err(e) = self
                .transport
                .write(frame.bytes())
                .and_then(|_| self.transport.write(&[ACK]))
            {
                warn!("Recovery write failed: {}", e);
                break;
            }
        }
        tokio::time::sleep(self.config.recovery_settle()).await;
        // Answers to the blind close sequence are not read
        self.flush();
        if !self.stopping {
            let status = self.encoder.encode(&FiscalCommand::StatusRequest);
            self.queue.extend(status);
        }
    }
}

fn transport_failure(err: TransportError) -> FiscalError {
    FiscalError::TransportError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::create_driver;
    use crate::events::PrinterState;
    use crate::testing::ScriptedTransport;
    use fiscal_protocol::checksum;
    use fiscal_protocol::control::{ETX, FS, NAK, STX};
    use fiscal_protocol::{create_frame_encoder, Dialect, FieldLimits};

    fn classic_reply(dialect: Dialect, cmd: u8, number: &str) -> Vec<u8> {
        let mut bytes = vec![STX, 0x20, cmd, FS];
        bytes.extend_from_slice(b"0000\x1c0600\x1c");
        bytes.extend_from_slice(number.as_bytes());
        bytes.push(ETX);
        let trailer = checksum::encode(dialect, &bytes);
        bytes.extend_from_slice(&trailer);
        bytes
    }

    fn config() -> EngineConfig {
        EngineConfig {
            max_read_attempts: 5,
            ..Default::default()
        }
    }

    fn spawn(
        model: Model,
        transport: ScriptedTransport,
    ) -> (WorkerHandle, mpsc::Receiver<FiscalEvent>) {
        spawn_with(model, transport, &config(), 64)
    }

    fn spawn_with(
        model: Model,
        transport: ScriptedTransport,
        config: &EngineConfig,
        capacity: usize,
    ) -> (WorkerHandle, mpsc::Receiver<FiscalEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let encoder = create_frame_encoder(model, FieldLimits::default()).unwrap();
        let driver = create_driver(model).unwrap();
        let handle = ByteEngine::spawn(
            model,
            Box::new(transport),
            encoder,
            driver,
            config,
            tx,
        );
        (handle, rx)
    }

    #[test]
    fn test_worker_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let _ = |engine: ByteEngine| assert_send(&engine.run());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_request_ok() {
        let transport =
            ScriptedTransport::with_replies(vec![classic_reply(Dialect::Epson, 0x2a, "0")]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::EpsonTMU220, transport);

        handle.submit(FiscalCommand::StatusRequest);
        assert_eq!(rx.recv().await, Some(FiscalEvent::ok()));
        handle.finish().await;

        // Epson replies are never acknowledged
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_burst_then_success() {
        let transport = ScriptedTransport::with_replies(vec![
            vec![NAK],
            vec![NAK],
            vec![NAK],
            classic_reply(Dialect::Epson, 0x2a, "0"),
        ]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::EpsonTMU220, transport);

        handle.submit(FiscalCommand::StatusRequest);
        assert_eq!(rx.recv().await, Some(FiscalEvent::ok()));
        handle.finish().await;
        assert_eq!(writes.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_nak_abandons_queue() {
        let transport = ScriptedTransport::with_replies(vec![vec![NAK]; 4]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::EpsonTMU220, transport);

        handle.submit(FiscalCommand::StatusRequest);
        handle.submit(FiscalCommand::OpenDrawer);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.cause(), Some(&FiscalError::Nak));
        handle.finish().await;

        // Four sends of the status frame, the drawer command dropped
        assert_eq!(writes.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hasar_nak_exhaustion_skips_recovery() {
        let transport = ScriptedTransport::with_replies(vec![vec![NAK]; 4]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::Hasar615F, transport);

        handle.submit(FiscalCommand::OpenDrawer);
        handle.submit(FiscalCommand::StatusRequest);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.cause(), Some(&FiscalError::Nak));
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        handle.finish().await;

        // The refused frame four times, no close sequence and no status check
        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 4);
        assert!(writes.iter().all(|w| w == &writes[0]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_queue() {
        let transport = ScriptedTransport::with_input(&[]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::EpsonTMU220, transport);

        handle.submit(FiscalCommand::OpenDrawer);
        handle.submit(FiscalCommand::OpenDrawer);
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            FiscalEvent::Status {
                state: PrinterState::Error,
                cause: Some(FiscalError::Timeout),
            }
        );
        handle.finish().await;
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hasar_acks_and_reports_receipt() {
        let transport = ScriptedTransport::with_replies(vec![classic_reply(
            Dialect::Hasar,
            fiscal_protocol::hasar::CMD_CLOSE_FISCAL,
            "00000321",
        )]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::Hasar615F, transport);

        handle.submit(FiscalCommand::CloseFiscalReceipt {
            intype: 'T',
            kind: 'B',
            id: 9,
        });
        assert_eq!(
            rx.recv().await,
            Some(FiscalEvent::ReceiptNumber {
                id: 9,
                number: 321,
                kind: 0
            })
        );
        handle.finish().await;

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], vec![ACK]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hasar_recovery_until_unrecoverable() {
        let transport = ScriptedTransport::with_input(&[]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::Hasar615F, transport);

        handle.submit(FiscalCommand::OpenDrawer);
        // The original failure plus four failed status checks
        for _ in 0..5 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.cause(), Some(&FiscalError::Timeout));
        }
        let event = rx.recv().await.unwrap();
        assert_eq!(event.cause(), Some(&FiscalError::Unrecoverable));
        handle.finish().await;

        // Drawer, then per attempt three recovery frames with ACKs and a status request
        assert_eq!(writes.lock().unwrap().len(), 1 + 4 * (6 + 1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_without_wire_form_are_skipped() {
        let transport =
            ScriptedTransport::with_replies(vec![classic_reply(Dialect::Epson, 0x2a, "0")]);
        let writes = transport.writes();
        let (handle, mut rx) = spawn(Model::EpsonTMU220, transport);

        handle.submit(FiscalCommand::ReceiptText {
            text: "nothing".into(),
        });
        handle.submit(FiscalCommand::StatusRequest);
        assert_eq!(rx.recv().await, Some(FiscalEvent::ok()));
        handle.finish().await;
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_after_failure_is_kept() {
        const ROUNDS: usize = 50;
        let mut replies = Vec::new();
        for _ in 0..ROUNDS {
            // Echoes the wrong command
            replies.push(classic_reply(Dialect::Epson, 0x2b, "0"));
            replies.push(classic_reply(Dialect::Epson, 0x2a, "0"));
        }
        let config = EngineConfig {
            poll_interval_ms: 1,
            teardown_poll_ms: 1,
            ..config()
        };
        let transport = ScriptedTransport::with_replies(replies);
        let (handle, mut rx) = spawn_with(Model::EpsonTMU220, transport, &config, 64);

        let wait = std::time::Duration::from_secs(2);
        for round in 0..ROUNDS {
            handle.submit(FiscalCommand::StatusRequest);
            let event = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
            assert!(event.cause().is_some(), "round {}: {:?}", round, event);

            handle.submit(FiscalCommand::StatusRequest);
            let event = tokio::time::timeout(wait, rx.recv()).await.unwrap();
            assert_eq!(event, Some(FiscalEvent::ok()), "round {}", round);
        }
        handle.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_undrained_events() {
        let reply = classic_reply(Dialect::Epson, 0x2a, "0");
        let transport = ScriptedTransport::with_replies(vec![reply; 3]);
        let (handle, _rx) = spawn_with(Model::EpsonTMU220, transport, &config(), 1);

        for _ in 0..3 {
            handle.submit(FiscalCommand::StatusRequest);
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let finished =
            tokio::time::timeout(std::time::Duration::from_secs(3), handle.finish()).await;
        assert!(finished.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_while_idle() {
        let (handle, _rx) = spawn(Model::Hasar330F, ScriptedTransport::default());
        assert!(handle.is_running());
        handle.finish().await;
    }
}
