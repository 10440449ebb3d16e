//! Fiscal Printer Simulation Library
//!
//! This crate provides simulated devices for exercising the fiscal engine
//! without printer hardware:
//!
//! - **VirtualPrinter**: a byte-level device for the Hasar, Epson and Epson
//!   extended dialects, usable anywhere a `ByteTransport` is expected
//! - **VirtualNetworkPrinter**: a JSON device for the Hasar 2G dialect,
//!   usable as a `MessageTransport`
//!
//! Both answer with well-formed replies by default and can be scripted to
//! misbehave: NAK bursts, line noise, corrupted checksums, rejected requests.
//!
//! # Example
//!
//! ```rust
//! use fiscal_engine::ByteTransport;
//! use fiscal_protocol::{create_frame_encoder, FieldLimits, FiscalCommand, Model};
//! use fiscal_sim::VirtualPrinter;
//!
//! let printer = VirtualPrinter::new(Model::Hasar615F).unwrap();
//! let mut link = printer.clone();
//!
//! let mut encoder = create_frame_encoder(Model::Hasar615F, FieldLimits::default()).unwrap();
//! let frame = encoder.encode(&FiscalCommand::StatusRequest).remove(0);
//! link.write(frame.bytes()).unwrap();
//!
//! let reply = link.read_all().unwrap();
//! assert_eq!(reply[2], frame.command);
//! ```

pub mod error;
pub mod network;
pub mod printer;

pub use error::SimError;
pub use network::{NetworkFaults, VirtualNetworkPrinter};
pub use printer::{Faults, VirtualPrinter};
