//! Worker task plumbing shared by both engines
//!
//! Commands travel from the facade to the worker over an unbounded channel,
//! so submitting never blocks the caller. The worker encodes them, keeps the
//! resulting packets in its own queue and reports every outcome on the event
//! channel. Event delivery gives up once the worker is told to stop, so a
//! caller that no longer reads events cannot hold up teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fiscal_protocol::FiscalCommand;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::FiscalEvent;

/// Messages sent to an engine worker
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerMessage {
    /// Encode and enqueue a command
    Command(FiscalCommand),
    /// Acknowledge the last reply out of band
    Ack,
    /// Stop the worker
    Shutdown,
}

/// Receiving end of a worker's command channel
pub(crate) struct Mailbox {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl Mailbox {
    /// Next message already submitted, without waiting
    pub fn try_next(&mut self) -> Option<WorkerMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next message; `None` once every sender is gone
    pub async fn next(&mut self) -> Option<WorkerMessage> {
        self.rx.recv().await
    }

    /// Drop every pending command, returning the control messages among them
    pub fn discard_commands(&mut self) -> Vec<WorkerMessage> {
        let mut control = Vec::new();
        let mut dropped = 0usize;
        while let Some(message) = self.try_next() {
            match message {
                WorkerMessage::Command(_) => dropped += 1,
                other => control.push(other),
            }
        }
        if dropped > 0 {
            debug!("Discarded {} pending commands", dropped);
        }
        control
    }
}

/// Create a command channel
pub(crate) fn channel() -> (mpsc::UnboundedSender<WorkerMessage>, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Mailbox { rx })
}

/// Stop signal shared by a worker and its handle
///
/// The flag is polled by reads in progress; the notification wakes an event
/// send blocked on a full channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct StopSignal {
    running: Arc<RunningFlag>,
    notify: Arc<Notify>,
}

#[derive(Debug)]
struct RunningFlag(AtomicBool);

impl Default for RunningFlag {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.0.load(Ordering::SeqCst)
    }

    /// The flag handed to blocking reads
    pub fn flag(&self) -> &AtomicBool {
        &self.running.0
    }

    pub fn stop(&self) {
        self.running.0.store(false, Ordering::SeqCst);
        // Stores a permit when nobody is waiting yet
        self.notify.notify_one();
    }

    async fn stopped(&self) {
        self.notify.notified().await;
    }
}

/// Sending end of an engine's event channel
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<FiscalEvent>,
    stop: StopSignal,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<FiscalEvent>, stop: StopSignal) -> Self {
        Self { tx, stop }
    }

    /// Deliver an event, waiting for room unless the worker is stopping
    pub async fn emit(&self, event: FiscalEvent) {
        if !self.stop.is_running() {
            if self.tx.try_send(event).is_err() {
                warn!("Worker stopping, event dropped");
            }
            return;
        }
        tokio::select! {
            result = self.tx.send(event) => {
                if result.is_err() {
                    debug!("Event receiver gone");
                }
            }
            _ = self.stop.stopped() => warn!("Worker stopping, event dropped"),
        }
    }
}

/// Owning handle on a running engine worker
#[derive(Debug)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    stop: StopSignal,
    task: JoinHandle<()>,
    teardown_poll: Duration,
}

impl WorkerHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<WorkerMessage>,
        stop: StopSignal,
        task: JoinHandle<()>,
        teardown_poll: Duration,
    ) -> Self {
        Self {
            tx,
            stop,
            task,
            teardown_poll,
        }
    }

    /// Queue a command; never blocks
    pub fn submit(&self, command: FiscalCommand) {
        if self.tx.send(WorkerMessage::Command(command)).is_err() {
            debug!("Worker stopped, command dropped");
        }
    }

    /// Queue an out-of-band acknowledgement
    pub fn ack(&self) {
        let _ = self.tx.send(WorkerMessage::Ack);
    }

    /// Whether the worker task is still alive
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the worker, dropping anything still queued
    ///
    /// Clears the continue flag, which aborts a read in progress or a
    /// blocked event send, and polls until the task has exited.
    pub async fn finish(self) {
        self.stop.stop();
        let _ = self.tx.send(WorkerMessage::Shutdown);
        while !self.task.is_finished() {
            tokio::time::sleep(self.teardown_poll).await;
        }
        info!("Worker finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_commands_keeps_control() {
        let (tx, mut mailbox) = channel();
        tx.send(WorkerMessage::Command(FiscalCommand::OpenDrawer)).unwrap();
        tx.send(WorkerMessage::Ack).unwrap();
        tx.send(WorkerMessage::Command(FiscalCommand::Cancel)).unwrap();
        tx.send(WorkerMessage::Shutdown).unwrap();

        let control = mailbox.discard_commands();
        assert_eq!(control, vec![WorkerMessage::Ack, WorkerMessage::Shutdown]);
        assert!(mailbox.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_waits_for_exit() {
        let (tx, mut mailbox) = channel();
        let stop = StopSignal::new();
        let flag = stop.clone();
        let task = tokio::spawn(async move {
            while flag.is_running() {
                if mailbox.next().await == Some(WorkerMessage::Shutdown) {
                    break;
                }
            }
        });
        let handle = WorkerHandle::new(tx, stop, task, Duration::from_millis(100));
        assert!(handle.is_running());
        handle.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unblocks_full_event_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let stop = StopSignal::new();
        let sink = EventSink::new(tx, stop.clone());

        sink.emit(FiscalEvent::ok()).await;
        let blocked = tokio::spawn(async move { sink.emit(FiscalEvent::ok()).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!blocked.is_finished());

        stop.stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), blocked).await;
        assert!(joined.is_ok());
        assert_eq!(rx.recv().await, Some(FiscalEvent::ok()));
        assert!(rx.try_recv().is_err());
    }
}
