//! Uniform printer facade
//!
//! [`FiscalPrinter`] picks the engine for a (brand, model) pair once, at
//! construction, and forwards every operation to it. Methods never block and
//! never fail: each one queues a command and returns, and all outcomes arrive
//! on the event receiver handed out by [`FiscalPrinter::take_events`].
//!
//! # Example
//!
//! ```rust,ignore
//! use fiscal_engine::{FiscalPrinter, PrinterConfig};
//!
//! let config = PrinterConfig::load(path)?;
//! let mut printer = FiscalPrinter::open(&config)?;
//! let mut events = printer.take_events().unwrap();
//!
//! printer.open_fiscal_receipt('B');
//! printer.print_line_item("Widget", 1.0, 10.0, "21.00", 'M');
//! printer.close_fiscal_receipt('T', 'B', 1);
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use fiscal_protocol::{create_frame_encoder, Brand, Dialect, FiscalCommand, Model};
use tokio::sync::mpsc;
use tracing::info;

use crate::byte_engine::ByteEngine;
use crate::config::{EngineConfig, PrinterConfig};
use crate::connector::Connector;
use crate::driver::create_driver;
use crate::error::EngineError;
use crate::events::FiscalEvent;
use crate::json_engine::JsonEngine;
use crate::worker::WorkerHandle;

/// The running engine, by transport family
#[derive(Debug)]
enum Engine {
    Byte(WorkerHandle),
    Json(WorkerHandle),
}

impl Engine {
    fn handle(&self) -> &WorkerHandle {
        match self {
            Engine::Byte(handle) | Engine::Json(handle) => handle,
        }
    }

    fn into_handle(self) -> WorkerHandle {
        match self {
            Engine::Byte(handle) | Engine::Json(handle) => handle,
        }
    }
}

/// A fiscal printer driven by a background engine
#[derive(Debug)]
pub struct FiscalPrinter {
    model: Model,
    engine: Engine,
    events: Option<mpsc::Receiver<FiscalEvent>>,
}

impl FiscalPrinter {
    /// Open the transport described by `config` and start its engine
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(config: &PrinterConfig) -> Result<Self, EngineError> {
        config.engine.validate()?;
        Model::for_brand(config.brand, config.model)?;
        let connector = Connector::open(config)?;
        Self::with_connector(config.brand, config.model, connector, config.engine.clone())
    }

    /// Start an engine over an already opened connector
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_connector(
        brand: Brand,
        model: Model,
        connector: Connector,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let model = Model::for_brand(brand, model)?;
        let dialect = model.dialect();
        let transport_kind = connector.kind();
        let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
        let limits = config.limits();

        let engine = match connector {
            Connector::Message(transport) if dialect == Dialect::Hasar2G => Engine::Json(
                JsonEngine::spawn(model, transport, limits, &config, tx),
            ),
            Connector::Byte(transport) => {
                let (Some(encoder), Some(driver)) =
                    (create_frame_encoder(model, limits), create_driver(model))
                else {
                    return Err(EngineError::TransportMismatch {
                        dialect,
                        transport: transport_kind,
                    });
                };
                Engine::Byte(ByteEngine::spawn(
                    model, transport, encoder, driver, &config, tx,
                ))
            }
            Connector::Message(_) => {
                return Err(EngineError::TransportMismatch {
                    dialect,
                    transport: transport_kind,
                })
            }
        };

        info!("Started {} engine for {}", dialect, model);
        Ok(Self {
            model,
            engine,
            events: Some(rx),
        })
    }

    /// Take the event receiver; `None` after the first call
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<FiscalEvent>> {
        self.events.take()
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn dialect(&self) -> Dialect {
        self.model.dialect()
    }

    pub fn supports_ticket(&self) -> bool {
        self.model.supports_ticket()
    }

    /// Whether the engine worker is still running
    pub fn is_open(&self) -> bool {
        self.engine.handle().is_running()
    }

    fn submit(&self, command: FiscalCommand) {
        self.engine.handle().submit(command);
    }

    // -------------------------------------------------------------------------
    // Status and closings
    // -------------------------------------------------------------------------

    pub fn status_request(&self) {
        self.submit(FiscalCommand::StatusRequest);
    }

    /// Daily closing: `'Z'` or `'X'`
    pub fn daily_close(&self, kind: char) {
        self.submit(FiscalCommand::DailyClose { kind });
    }

    pub fn daily_close_by_date(&self, from: NaiveDate, to: NaiveDate) {
        self.submit(FiscalCommand::DailyCloseByDate { from, to });
    }

    pub fn daily_close_by_number(&self, from: u32, to: u32) {
        self.submit(FiscalCommand::DailyCloseByNumber { from, to });
    }

    // -------------------------------------------------------------------------
    // Fiscal documents
    // -------------------------------------------------------------------------

    pub fn set_customer_data(
        &self,
        name: &str,
        cuit: &str,
        tax_type: char,
        doc_type: &str,
        address: &str,
    ) {
        self.submit(FiscalCommand::SetCustomerData {
            name: name.to_string(),
            cuit: cuit.to_string(),
            tax_type,
            doc_type: doc_type.to_string(),
            address: address.to_string(),
        });
    }

    pub fn open_fiscal_receipt(&self, kind: char) {
        self.submit(FiscalCommand::OpenFiscalReceipt { kind });
    }

    pub fn print_fiscal_text(&self, text: &str) {
        self.submit(FiscalCommand::PrintFiscalText {
            text: text.to_string(),
        });
    }

    pub fn print_line_item(
        &self,
        description: &str,
        quantity: f64,
        price: f64,
        tax: &str,
        qualifier: char,
    ) {
        self.submit(FiscalCommand::PrintLineItem {
            description: description.to_string(),
            quantity,
            price,
            tax: tax.to_string(),
            qualifier,
        });
    }

    pub fn perceptions(&self, description: &str, tax_amount: f64) {
        self.submit(FiscalCommand::Perceptions {
            description: description.to_string(),
            tax_amount,
        });
    }

    pub fn subtotal(&self, print: char) {
        self.submit(FiscalCommand::Subtotal { print });
    }

    pub fn total_tender(&self, description: &str, amount: f64, kind: char) {
        self.submit(FiscalCommand::TotalTender {
            description: description.to_string(),
            amount,
            kind,
        });
    }

    pub fn general_discount(&self, description: &str, amount: f64, tax_percent: f64, kind: char) {
        self.submit(FiscalCommand::GeneralDiscount {
            description: description.to_string(),
            amount,
            tax_percent,
            kind,
        });
    }

    /// Close the open document; its number arrives as a receipt event tagged `id`
    pub fn close_fiscal_receipt(&self, intype: char, kind: char, id: i32) {
        self.submit(FiscalCommand::CloseFiscalReceipt { intype, kind, id });
    }

    // -------------------------------------------------------------------------
    // Non-fiscal documents
    // -------------------------------------------------------------------------

    pub fn open_non_fiscal_receipt(&self) {
        self.submit(FiscalCommand::OpenNonFiscalReceipt);
    }

    pub fn print_non_fiscal_text(&self, text: &str) {
        self.submit(FiscalCommand::PrintNonFiscalText {
            text: text.to_string(),
        });
    }

    pub fn close_non_fiscal_receipt(&self) {
        self.submit(FiscalCommand::CloseNonFiscalReceipt);
    }

    // -------------------------------------------------------------------------
    // Credit notes and associated documents
    // -------------------------------------------------------------------------

    pub fn set_embark_number(&self, doc_num: i32, description: &str, kind: char) {
        self.submit(FiscalCommand::SetEmbarkNumber {
            doc_num,
            description: description.to_string(),
            kind,
        });
    }

    pub fn open_dnfh(&self, kind: char, fix_value: char, doc_num: &str) {
        self.submit(FiscalCommand::OpenDnfh {
            kind,
            fix_value,
            doc_num: doc_num.to_string(),
        });
    }

    pub fn print_embark_item(&self, description: &str, quantity: f64) {
        self.submit(FiscalCommand::PrintEmbarkItem {
            description: description.to_string(),
            quantity,
        });
    }

    pub fn close_dnfh(&self, id: i32, f_type: char, copies: i32) {
        self.submit(FiscalCommand::CloseDnfh { id, f_type, copies });
    }

    pub fn receipt_text(&self, text: &str) {
        self.submit(FiscalCommand::ReceiptText {
            text: text.to_string(),
        });
    }

    // -------------------------------------------------------------------------
    // Device
    // -------------------------------------------------------------------------

    pub fn open_drawer(&self) {
        self.submit(FiscalCommand::OpenDrawer);
    }

    pub fn set_header_trailer(&self, header: &str, trailer: &str) {
        self.submit(FiscalCommand::SetHeaderTrailer {
            header: header.to_string(),
            trailer: trailer.to_string(),
        });
    }

    pub fn set_date_time(&self, date_time: NaiveDateTime) {
        self.submit(FiscalCommand::SetDateTime(date_time));
    }

    pub fn set_fixed_data(&self, shop: &str, phone: &str) {
        self.submit(FiscalCommand::SetFixedData {
            shop: shop.to_string(),
            phone: phone.to_string(),
        });
    }

    pub fn cancel(&self) {
        self.submit(FiscalCommand::Cancel);
    }

    /// Write an acknowledgement out of band
    pub fn ack(&self) {
        self.engine.handle().ack();
    }

    // -------------------------------------------------------------------------
    // Reprint and journal download
    // -------------------------------------------------------------------------

    pub fn reprint_document(&self, doc_type: &str, doc_number: i32) {
        self.submit(FiscalCommand::ReprintDocument {
            doc_type: doc_type.to_string(),
            doc_number,
        });
    }

    pub fn reprint_continue(&self) {
        self.submit(FiscalCommand::ReprintContinue);
    }

    pub fn reprint_finalize(&self) {
        self.submit(FiscalCommand::ReprintFinalize);
    }

    pub fn transactional_memory_info(&self) {
        self.submit(FiscalCommand::TransactionalMemoryInfo);
    }

    pub fn download_report_by_date(&self, kind: &str, from: NaiveDate, to: NaiveDate) {
        self.submit(FiscalCommand::DownloadReportByDate {
            kind: kind.to_string(),
            from,
            to,
        });
    }

    pub fn download_report_by_number(&self, kind: &str, from: u32, to: u32) {
        self.submit(FiscalCommand::DownloadReportByNumber {
            kind: kind.to_string(),
            from,
            to,
        });
    }

    pub fn download_continue(&self) {
        self.submit(FiscalCommand::DownloadContinue);
    }

    pub fn download_finalize(&self) {
        self.submit(FiscalCommand::DownloadFinalize);
    }

    pub fn download_delete(&self, to: u32) {
        self.submit(FiscalCommand::DownloadDelete { to });
    }

    /// Stop the engine, dropping queued commands, and wait for it to exit
    pub async fn finish(self) {
        let kind = match &self.engine {
            Engine::Byte(_) => "byte",
            Engine::Json(_) => "JSON",
        };
        info!("Finishing {} engine for {}", kind, self.model);
        self.engine.into_handle().finish().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn byte_connector() -> Connector {
        Connector::Byte(Box::new(ScriptedTransport::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_brand_mismatch_rejected() {
        let err = FiscalPrinter::with_connector(
            Brand::Epson,
            Model::Hasar615F,
            byte_connector(),
            EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_model_needs_message_connector() {
        let err = FiscalPrinter::with_connector(
            Brand::Hasar,
            Model::Hasar1000F,
            byte_connector(),
            EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::TransportMismatch {
                dialect: Dialect::Hasar2G,
                transport: "byte"
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_facade_properties() {
        let mut printer = FiscalPrinter::with_connector(
            Brand::Hasar,
            Model::Hasar715F,
            byte_connector(),
            EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(printer.dialect(), Dialect::Hasar);
        assert!(printer.supports_ticket());
        assert!(printer.is_open());
        assert!(printer.take_events().is_some());
        assert!(printer.take_events().is_none());
        printer.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_reach_the_device() {
        let transport = ScriptedTransport::default();
        let writes = transport.writes();
        let printer = FiscalPrinter::with_connector(
            Brand::Hasar,
            Model::Hasar330F,
            Connector::Byte(Box::new(transport)),
            EngineConfig {
                max_read_attempts: 1,
                recovery_cap: 0,
                ..Default::default()
            },
        )
        .unwrap();

        printer.open_drawer();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        printer.finish().await;

        let writes = writes.lock().unwrap();
        assert_eq!(writes[0][2], fiscal_protocol::frame::CMD_OPEN_DRAWER);
    }
}
