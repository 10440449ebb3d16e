//! Transport selection
//!
//! A connector holds exactly one transport: byte-oriented for the serial
//! dialects, message-oriented for the JSON dialect.

use std::sync::Arc;

use fiscal_protocol::Dialect;
use tracing::info;

use crate::config::{PortType, PrinterConfig};
use crate::error::EngineError;
use crate::network::HttpTransport;
use crate::serial::SerialTransport;
use crate::transport::{ByteTransport, MessageTransport};

/// The transport a printer talks through
pub enum Connector {
    Byte(Box<dyn ByteTransport>),
    Message(Arc<dyn MessageTransport>),
}

impl Connector {
    /// Open the transport described by `config`
    ///
    /// JSON-dialect models always use the network transport; the others
    /// open a serial port or a USB serial adapter.
    pub fn open(config: &PrinterConfig) -> Result<Self, EngineError> {
        if config.model.dialect() == Dialect::Hasar2G {
            let http = HttpTransport::new(&config.port, config.engine.network_timeout())?;
            info!("Using network transport {}", http.url());
            return Ok(Connector::Message(Arc::new(http)));
        }

        let transport = match config.port_type {
            PortType::Com => SerialTransport::open(&config.port, config.baud_rate)?,
            PortType::Usb => SerialTransport::open_usb(&config.port, config.baud_rate)?,
            PortType::Network => {
                return Err(EngineError::TransportMismatch {
                    dialect: config.model.dialect(),
                    transport: "network",
                })
            }
        };
        info!("Using serial transport {}", transport.name());
        Ok(Connector::Byte(Box::new(transport)))
    }

    /// Short name of the transport kind
    pub fn kind(&self) -> &'static str {
        match self {
            Connector::Byte(_) => "byte",
            Connector::Message(_) => "network",
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Connector::Byte(t) => t.is_open(),
            Connector::Message(_) => true,
        }
    }

    /// Close the byte transport; network transports hold no connection
    pub fn close(&mut self) {
        if let Connector::Byte(t) = self {
            t.close();
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connector").field(&self.kind()).finish()
    }
}
