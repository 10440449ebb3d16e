//! Scripted byte transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use fiscal_protocol::control::STX;

use crate::error::TransportError;
use crate::transport::ByteTransport;

/// Byte transport that answers each written frame with the next scripted reply
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    input: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn with_input(bytes: &[u8]) -> Self {
        Self {
            input: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_replies(replies: Vec<Vec<u8>>) -> Self {
        Self {
            replies: replies.into(),
            ..Default::default()
        }
    }

    /// Handle on everything written, shared with the transport
    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.writes)
    }
}

impl ByteTransport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        self.writes.lock().unwrap().push(bytes.to_vec());
        if bytes.first() == Some(&STX) {
            if let Some(reply) = self.replies.pop_front() {
                self.input.extend(reply);
            }
        }
        Ok(bytes.len())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let n = n.min(self.input.len());
        Ok(self.input.drain(..n).collect())
    }

    fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(self.input.drain(..).collect())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.input.len())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) {}
}
