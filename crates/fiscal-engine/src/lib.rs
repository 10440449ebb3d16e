//! Fiscal Printer Engine
//!
//! This crate drives Epson and Hasar fiscal printers: it queues normalized
//! commands, sends the packets built by `fiscal-protocol` over a transport,
//! validates the replies and reports every outcome as an event.
//!
//! # Architecture
//!
//! A [`FiscalPrinter`] owns one engine worker running on the tokio runtime:
//!
//! - **Byte engine**: serial and USB printers (Hasar, Epson, Epson
//!   extended). Replies are reassembled from a polled byte stream by
//!   [`reader::FrameReader`]; dialect policy (acknowledgement, receipt
//!   number position, status inspection, recovery) is injected through a
//!   [`driver::ByteDriver`].
//! - **JSON engine**: network printers (Hasar 2G). One request in flight at
//!   a time, each reply verified against its request.
//!
//! Command methods are fire-and-forget. Failures never surface from them:
//! they arrive as [`FiscalEvent::Status`] events, in the order their commands
//! were dequeued, and abandon whatever was still queued.
//!
//! # Example
//!
//! ```rust,no_run
//! use fiscal_engine::{Connector, EngineConfig, FiscalPrinter, SerialTransport};
//! use fiscal_protocol::{Brand, Model};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let port = SerialTransport::open("/dev/ttyUSB0", 9600)?;
//! let mut printer = FiscalPrinter::with_connector(
//!     Brand::Hasar,
//!     Model::Hasar615F,
//!     Connector::Byte(Box::new(port)),
//!     EngineConfig::default(),
//! )?;
//! let mut events = printer.take_events().unwrap();
//!
//! printer.status_request();
//! if let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! printer.finish().await;
//! # Ok(())
//! # }
//! ```

pub mod byte_engine;
pub mod config;
pub mod connector;
pub mod driver;
pub mod error;
pub mod events;
pub mod json_engine;
pub mod network;
pub mod printer;
pub mod reader;
pub mod serial;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, PortType, PrinterConfig};
pub use connector::Connector;
pub use error::{ConfigError, EngineError, FiscalError, NetworkError, TransportError};
pub use events::{DataKind, FiscalEvent, PrinterState};
pub use network::HttpTransport;
pub use printer::FiscalPrinter;
pub use serial::SerialTransport;
pub use transport::{ByteTransport, MessageTransport};
pub use worker::WorkerHandle;
