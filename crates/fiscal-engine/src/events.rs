//! Result events emitted by the engines
//!
//! Every outcome of a queued command arrives through one channel, in the
//! order the triggering commands were dequeued.

use serde::{Deserialize, Serialize};

use crate::error::FiscalError;

/// Printer condition reported by a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterState {
    Ok,
    Error,
    FullFiscalMemory,
}

/// Kind of a streamed journal chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    DownloadReport,
    DownloadContinue,
    DownloadFinalize,
}

/// Event emitted by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalEvent {
    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------
    /// A closed document was assigned a receipt number
    ReceiptNumber {
        /// Caller document id given to the close command
        id: i32,
        /// Number printed on the document (0 when the reply had none)
        number: i64,
        /// 0 for invoices and tickets, 1 for credit notes
        kind: u8,
    },

    // -------------------------------------------------------------------------
    // Device status
    // -------------------------------------------------------------------------
    /// Printer state after a status request or a failed exchange
    Status {
        state: PrinterState,
        /// Failure that produced the state, if any
        cause: Option<FiscalError>,
    },

    // -------------------------------------------------------------------------
    // Journal download
    // -------------------------------------------------------------------------
    /// Chunk of a report being downloaded
    Data { kind: DataKind, payload: Vec<u8> },
}

impl FiscalEvent {
    /// Status event for a healthy printer
    pub fn ok() -> Self {
        FiscalEvent::Status {
            state: PrinterState::Ok,
            cause: None,
        }
    }

    /// Status event for a failed exchange
    pub fn failure(cause: FiscalError) -> Self {
        let state = if cause == FiscalError::FiscalMemoryFull {
            PrinterState::FullFiscalMemory
        } else {
            PrinterState::Error
        };
        FiscalEvent::Status {
            state,
            cause: Some(cause),
        }
    }

    /// Failure carried by a status event
    pub fn cause(&self) -> Option<&FiscalError> {
        match self {
            FiscalEvent::Status { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }
}
