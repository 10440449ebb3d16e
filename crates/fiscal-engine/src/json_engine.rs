//! Queued engine for the JSON dialect
//!
//! Requests are posted one at a time. A reply that does not answer its
//! request, or that reports a blocking printer condition, drops the queue
//! and schedules a `Cancelar` so the device leaves any half-built document;
//! after a bounded number of consecutive rejections the engine stops
//! cancelling. The queue is dropped before the failure is reported.

use std::collections::VecDeque;
use std::sync::Arc;

use fiscal_protocol::hasar2g::{self, Hasar2gEncoder, JsonRequest, Verdict};
use fiscal_protocol::{FieldLimits, FiscalCommand, Model};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::error::FiscalError;
use crate::events::FiscalEvent;
use crate::transport::MessageTransport;
use crate::worker::{self, EventSink, Mailbox, StopSignal, WorkerHandle, WorkerMessage};

/// Worker state of a JSON engine
pub struct JsonEngine {
    transport: Arc<dyn MessageTransport>,
    encoder: Hasar2gEncoder,
    queue: VecDeque<JsonRequest>,
    mailbox: Mailbox,
    sink: EventSink,
    stop: StopSignal,
    cancel_count: u32,
    cancel_cap: u32,
    stopping: bool,
}

impl JsonEngine {
    /// Spawn the worker for `model` over `transport`
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        model: Model,
        transport: Arc<dyn MessageTransport>,
        limits: FieldLimits,
        config: &EngineConfig,
        events: mpsc::Sender<FiscalEvent>,
    ) -> WorkerHandle {
        let (tx, mailbox) = worker::channel();
        let stop = StopSignal::new();

        let engine = Self {
            transport,
            encoder: Hasar2gEncoder::new(limits),
            queue: VecDeque::new(),
            mailbox,
            sink: EventSink::new(events, stop.clone()),
            stop: stop.clone(),
            cancel_count: 0,
            cancel_cap: config.cancel_cap,
            stopping: false,
        };

        let span = info_span!(
            "fiscal_engine",
            dialect = %model.dialect(),
            model = %model
        );
        let task = tokio::spawn(engine.run().instrument(span));
        WorkerHandle::new(tx, stop, task, config.teardown_poll())
    }

    async fn run(mut self) {
        info!("JSON engine started");

        while self.stop.is_running() && !self.stopping {
            while let Some(message) = self.mailbox.try_next() {
                self.accept(message);
            }
            if self.stopping {
                break;
            }

            let Some(request) = self.queue.front().cloned() else {
                match self.mailbox.next().await {
                    Some(message) => self.accept(message),
                    None => break,
                }
                continue;
            };
            self.exchange(request).await;
        }

        self.queue.clear();
        info!("JSON engine stopped");
    }

    fn accept(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Command(command) => self.enqueue(&command),
            WorkerMessage::Ack => debug!("Acknowledgement not used by the JSON dialect"),
            WorkerMessage::Shutdown => self.stopping = true,
        }
    }

    fn enqueue(&mut self, command: &FiscalCommand) {
        let requests = self.encoder.encode(command);
        if requests.is_empty() {
            debug!("{} has no JSON form", command.name());
            return;
        }
        debug!("Queued {} ({} requests)", command.name(), requests.len());
        self.queue.extend(requests);
    }

    async fn exchange(&mut self, request: JsonRequest) {
        let body = request.to_value();
        debug!("POST {}", body);

        let reply = match self.transport.post(&body).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Request failed: {}", e);
                self.clear();
                self.sink
                    .emit(FiscalEvent::failure(FiscalError::TransportError(e.to_string())))
                    .await;
                return;
            }
        };
        if !self.stop.is_running() {
            return;
        }

        match hasar2g::verify(&request, &reply) {
            Verdict::Accepted => {
                self.queue.pop_front();
                self.cancel_count = 0;
                if let Some(tag) = request.receipt {
                    let number = hasar2g::receipt_number(&reply);
                    info!("Document {} closed as number {}", tag.id, number);
                    self.sink.emit(FiscalEvent::ReceiptNumber {
                        id: tag.id,
                        number,
                        kind: tag.kind,
                    })
                    .await;
                }
                if request.root() == Some(hasar2g::STATUS) {
                    self.sink.emit(FiscalEvent::ok()).await;
                }
            }
            Verdict::MemoryFull => {
                warn!("Fiscal memory full");
                self.clear();
                self.sink
                    .emit(FiscalEvent::failure(FiscalError::FiscalMemoryFull))
                    .await;
            }
            Verdict::Rejected(reason) => {
                warn!("Reply rejected: {}", reason);
                self.clear();
                self.cancel_count += 1;
                if self.cancel_count <= self.cancel_cap && !self.stopping {
                    info!("Cancelling ({} of {})", self.cancel_count, self.cancel_cap);
                    self.queue.push_back(hasar2g::cancel_request());
                }
                self.sink
                    .emit(FiscalEvent::failure(FiscalError::VerificationMismatch(reason)))
                    .await;
            }
        }
    }

    /// Drop the queue and every command not yet dequeued
    fn clear(&mut self) {
        if !self.queue.is_empty() {
            debug!("Dropping {} queued requests", self.queue.len());
        }
        self.queue.clear();
        for message in self.mailbox.discard_commands() {
            self.accept(message);
        }
    }
}
