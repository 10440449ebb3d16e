//! Transport contracts
//!
//! Byte transports are polled: reads never block and may return nothing,
//! the engine owns all waiting. Message transports carry one JSON document
//! per round trip and apply their own bounded wait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{NetworkError, TransportError};

/// Character-oriented link to a printer (serial or USB)
pub trait ByteTransport: Send {
    /// Write all bytes, returning how many were written
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `n` buffered bytes without blocking
    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Drain every buffered byte
    fn read_all(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Number of bytes ready to be read
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    fn is_open(&self) -> bool;

    fn close(&mut self);
}

/// Request/reply link to a printer (JSON over HTTP)
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Post one request document and wait for its reply document
    async fn post(&self, request: &Value) -> Result<Value, NetworkError>;
}
