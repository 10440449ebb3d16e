//! Epson extended protocol (TM-T900)
//!
//! Commands are two bytes at the start of the payload (`family`, `sub`),
//! followed by FS and a two-byte extension word, then FS-separated fields.
//! The frame's `command` is only an engine tag telling the worker how to
//! treat the reply (receipt numbers, audit continuation, journal data).
//!
//! ```text
//! STX seq 0B 01 FS 00 00 FS name FS FS address ... ETX CCCC
//!          |  |     |  |
//!          |  |     +--+-- extension word
//!          +--+----------- family / sub command
//! ```

use tracing::debug;

use crate::command::{footer_lines, scaled, tax_rate, FiscalCommand};
use crate::control::ESC;
use crate::frame::{chunks, truncate, Frame, Payload, CMD_STATUS};
use crate::limits::FieldLimits;
use crate::models::Model;
use crate::{Dialect, FrameEncoder};

// Engine tags. None of these bytes reach the wire.
pub const TAG_STATUS: u8 = CMD_STATUS;
pub const TAG_DAILY_CLOSE: u8 = 0x39;
pub const TAG_AUDIT_BY_DATE: u8 = 0x3a;
pub const TAG_AUDIT_BY_NUMBER: u8 = 0x3b;
pub const TAG_CONTINUE_AUDIT: u8 = 0x3c;
pub const TAG_CLOSE_AUDIT: u8 = 0x3d;
pub const TAG_OPEN_TICKET: u8 = 0x40;
pub const TAG_LINE_ITEM_TICKET: u8 = 0x42;
pub const TAG_TENDER_TICKET: u8 = 0x44;
pub const TAG_CLOSE_TICKET: u8 = 0x45;
pub const TAG_OPEN_NON_FISCAL: u8 = 0x48;
pub const TAG_NON_FISCAL_TEXT: u8 = 0x49;
pub const TAG_CLOSE_NON_FISCAL: u8 = 0x4a;
pub const TAG_SET_DATE_TIME: u8 = 0x58;
pub const TAG_FOOTER: u8 = 0x5d;
pub const TAG_OPEN_INVOICE: u8 = 0x60;
pub const TAG_LINE_ITEM_INVOICE: u8 = 0x62;
pub const TAG_SUBTOTAL: u8 = 0x63;
pub const TAG_TENDER_INVOICE: u8 = 0x64;
pub const TAG_CLOSE_INVOICE: u8 = 0x65;
pub const TAG_PERCEPTIONS: u8 = 0x66;
pub const TAG_OPEN_DRAWER: u8 = 0x7b;
pub const TAG_CLOSE_DNFH: u8 = 0xab;
pub const TAG_CLOSE_CREDIT_NOTE: u8 = 0xac;
pub const TAG_MEMORY_INFO: u8 = 0xb0;
pub const TAG_DOWNLOAD_BY_DATE: u8 = 0xb1;
pub const TAG_DOWNLOAD_BY_NUMBER: u8 = 0xb2;
pub const TAG_DOWNLOAD_CONTINUE: u8 = 0xb3;
pub const TAG_DOWNLOAD_FINALIZE: u8 = 0xb4;
pub const TAG_DOWNLOAD_DELETE: u8 = 0xb5;
pub const TAG_REPRINT: u8 = 0xb6;
pub const TAG_REPRINT_CONTINUE: u8 = 0xb7;
pub const TAG_REPRINT_FINALIZE: u8 = 0xb8;

// Command families
const FAMILY_STATUS: u8 = 0x00;
const FAMILY_CONFIG: u8 = 0x05;
const FAMILY_DRAWER: u8 = 0x07;
const FAMILY_JOURNAL: u8 = 0x08;
const FAMILY_DOWNLOAD: u8 = 0x09;
const FAMILY_TICKET: u8 = 0x0A;
const FAMILY_INVOICE: u8 = 0x0B;
const FAMILY_CREDIT_NOTE: u8 = 0x0D;
const FAMILY_NON_FISCAL: u8 = 0x0E;

/// Footer slots available on the device
const FOOTER_SLOTS: usize = 10;

/// Reference sent when an invoice has no associated document
const NO_REFERENCE_INVOICE: &str = "901-99999-99999999";
/// Reference sent when a credit note has no associated document
const NO_REFERENCE_CREDIT_NOTE: &str = "902-99999-99999999";

/// Document kind currently open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Document {
    #[default]
    Ticket,
    Invoice,
    CreditNote,
}

impl Document {
    fn family(self) -> u8 {
        match self {
            Document::Ticket => FAMILY_TICKET,
            Document::Invoice => FAMILY_INVOICE,
            Document::CreditNote => FAMILY_CREDIT_NOTE,
        }
    }

    /// Whether prices are sent net of tax
    fn net_prices(self) -> bool {
        self != Document::Ticket
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Customer {
    name: String,
    cuit: String,
    tax_type: char,
    doc_type: String,
    address: String,
    refer: String,
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            name: "Consumidor Final".to_string(),
            cuit: "0".to_string(),
            tax_type: 'F',
            doc_type: "D".to_string(),
            address: "-".to_string(),
            refer: String::new(),
        }
    }
}

/// Encoder for the Epson extended protocol
#[derive(Debug, Clone)]
pub struct EpsonExtEncoder {
    model: Model,
    limits: FieldLimits,
    customer: Customer,
    /// Tax condition of the buyer of the open document
    buyer_registered: bool,
    document: Document,
}

/// Start a payload with a command and its extension word
fn command(family: u8, sub: &[u8], ext: [u8; 2]) -> Payload {
    Payload::new().byte(family).raw(sub).fs().raw(&ext)
}

fn frame(tag: u8, payload: Payload) -> Frame {
    Frame::new(Dialect::EpsonExt, tag, payload.into_bytes())
}

/// Request the next block of an audit report
pub fn continue_audit() -> Frame {
    frame(
        TAG_CONTINUE_AUDIT,
        command(FAMILY_JOURNAL, &[0x14], [0x00, 0x00]),
    )
}

/// Finish an audit report
pub fn close_audit() -> Frame {
    frame(TAG_CLOSE_AUDIT, command(FAMILY_JOURNAL, &[0x15], [0x00, 0x00]))
}

/// Status request frame
pub fn status_frame() -> Frame {
    frame(TAG_STATUS, command(FAMILY_STATUS, &[0x01], [0x00, 0x00]))
}

/// Product code derived from a description: letters, digits and `/` only
fn product_code(description: &str) -> String {
    description
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '/')
        .take(40)
        .collect()
}

impl EpsonExtEncoder {
    pub fn new(model: Model, limits: FieldLimits) -> Self {
        Self {
            model,
            limits,
            customer: Customer::default(),
            buyer_registered: false,
            document: Document::Ticket,
        }
    }

    fn reset(&mut self) {
        self.customer = Customer::default();
        self.buyer_registered = false;
        self.document = Document::Ticket;
    }

    /// The open frame has consumed the buffered buyer; start the next one clean
    fn opened(&mut self) {
        self.buyer_registered = self.registered();
        self.customer = Customer::default();
    }

    fn registered(&self) -> bool {
        self.customer.tax_type == 'I'
    }

    fn footer(line: usize, text: &str) -> Frame {
        frame(
            TAG_FOOTER,
            command(FAMILY_CONFIG, &[0x0A], [0x00, 0x00])
                .field(&line.to_string())
                .field(text),
        )
    }

    /// Buyer block shared by invoice and credit note opens
    fn buyer(&self, payload: Payload) -> Payload {
        let c = &self.customer;
        payload
            .field(&c.name)
            .fs()
            .field(&c.address)
            .fs_n(2)
            .field(&c.doc_type)
            .field(&c.cuit)
            .field(&c.tax_type.to_string())
    }

    fn line_tag(&self) -> u8 {
        if self.document == Document::Ticket {
            TAG_LINE_ITEM_TICKET
        } else {
            TAG_LINE_ITEM_INVOICE
        }
    }

    fn close(&self, id: i32) -> Frame {
        let family = self.document.family();
        let (tag, kind, separators) = match self.document {
            Document::Invoice => (TAG_CLOSE_INVOICE, 0, 6),
            Document::CreditNote => (TAG_CLOSE_CREDIT_NOTE, 1, 7),
            Document::Ticket => (TAG_CLOSE_TICKET, 0, 7),
        };
        frame(
            tag,
            command(family, &[0x06], [0x00, ESC]).byte(0x03).fs_n(separators),
        )
        .with_receipt(id, kind)
    }
}

impl FrameEncoder for EpsonExtEncoder {
    fn dialect(&self) -> Dialect {
        Dialect::EpsonExt
    }

    fn encode(&mut self, cmd: &FiscalCommand) -> Vec<Frame> {
        match cmd {
            FiscalCommand::StatusRequest => vec![status_frame()],

            FiscalCommand::DailyClose { kind } => {
                let payload = if *kind == 'X' {
                    command(FAMILY_JOURNAL, &[ESC, 0x02], [0x0C, 0x01])
                } else {
                    command(FAMILY_JOURNAL, &[0x01], [0x0C, 0x00])
                };
                vec![frame(TAG_DAILY_CLOSE, payload)]
            }

            FiscalCommand::DailyCloseByDate { from, to } => vec![
                frame(
                    TAG_AUDIT_BY_DATE,
                    command(FAMILY_JOURNAL, &[0x12], [0x00, 0x01])
                        .field(&from.format("%d%m%y").to_string())
                        .field(&to.format("%d%m%y").to_string()),
                ),
                continue_audit(),
            ],

            FiscalCommand::DailyCloseByNumber { from, to } => vec![
                frame(
                    TAG_AUDIT_BY_NUMBER,
                    command(FAMILY_JOURNAL, &[0x13], [0x00, 0x01])
                        .field(&from.to_string())
                        .field(&to.to_string()),
                ),
                continue_audit(),
            ],

            FiscalCommand::SetCustomerData {
                name,
                cuit,
                tax_type,
                doc_type,
                address,
            } => {
                self.customer.name = name.clone();
                self.customer.cuit = cuit.clone();
                self.customer.tax_type = match tax_type {
                    'A' => 'N',
                    'C' => 'F',
                    other => *other,
                };
                self.customer.doc_type = match doc_type.as_str() {
                    "C" => "T",
                    "3" => "P",
                    _ => "D",
                }
                .to_string();
                self.customer.address = address.clone();
                Vec::new()
            }

            FiscalCommand::OpenFiscalReceipt { kind } => {
                if matches!(kind, 'A' | 'B') {
                    self.document = Document::Invoice;
                    let refer = if self.customer.refer.is_empty() {
                        NO_REFERENCE_INVOICE.to_string()
                    } else {
                        self.customer.refer.clone()
                    };
                    let payload = self
                        .buyer(command(FAMILY_INVOICE, &[0x01], [0x00, 0x00]))
                        .field(&refer)
                        .fs_n(3);
                    let open = frame(TAG_OPEN_INVOICE, payload);
                    self.opened();
                    vec![open]
                } else {
                    self.document = Document::Ticket;
                    self.opened();
                    let flag = if *kind == 'M' { 0x40 } else { 0x00 };
                    vec![frame(
                        TAG_OPEN_TICKET,
                        command(FAMILY_TICKET, &[0x01], [flag, 0x00]),
                    )]
                }
            }

            FiscalCommand::PrintLineItem {
                description,
                quantity,
                price,
                tax,
                ..
            } => {
                let rate = tax_rate(tax);
                let unit = if self.document.net_prices() {
                    scaled(price / (1.0 + rate / 100.0), 10000.0)
                } else {
                    scaled(*price, 10000.0)
                };
                let payload = command(self.document.family(), &[ESC, 0x02], [0x00, 0x10])
                    .fs_n(4)
                    .field(&truncate(description, self.limits.item_description(self.model)))
                    .field(&scaled(*quantity, 10000.0).to_string())
                    .field(&unit.to_string())
                    .field(&scaled(rate, 100.0).to_string())
                    .fs_n(4)
                    .field(&product_code(description))
                    .field("07")
                    .fs();
                vec![frame(self.line_tag(), payload)]
            }

            FiscalCommand::Perceptions {
                description,
                tax_amount,
            } => {
                let family = if self.document == Document::CreditNote {
                    FAMILY_CREDIT_NOTE
                } else {
                    FAMILY_INVOICE
                };
                vec![frame(
                    TAG_PERCEPTIONS,
                    command(family, &[ESC, 0x20], [0x00, 0x00])
                        .field(&truncate(description, self.limits.perception_description()))
                        .field(&scaled(*tax_amount, 100.0).to_string())
                        .field("2100"),
                )]
            }

            FiscalCommand::Subtotal { .. } => vec![frame(
                TAG_SUBTOTAL,
                command(self.document.family(), &[0x03], [0x00, 0x00]).fs_n(2),
            )],

            FiscalCommand::TotalTender {
                description,
                amount,
                ..
            } => {
                let code = match description.as_str() {
                    "Cheque" => "03",
                    "Cuenta Corriente" => "06",
                    "Banco" => "07",
                    "Tarjeta de Credito" | "Mercado Pago" => "20",
                    "Tarjeta de Debito" => "21",
                    _ => "08",
                };
                let tag = if self.document == Document::Ticket {
                    TAG_TENDER_TICKET
                } else {
                    TAG_TENDER_INVOICE
                };
                vec![frame(
                    tag,
                    command(self.document.family(), &[0x05], [0x00, 0x00])
                        .fs_n(5)
                        .field(code)
                        .field(&scaled(*amount, 100.0).to_string()),
                )]
            }

            FiscalCommand::GeneralDiscount {
                description,
                amount,
                kind,
                ..
            } => {
                let surcharge = if *kind == 'M' { 0x01 } else { 0x00 };
                let value = if self.buyer_registered {
                    scaled(amount / 1.21, 100.0)
                } else {
                    scaled(*amount, 100.0)
                };
                vec![frame(
                    self.line_tag(),
                    command(self.document.family(), &[0x04], [0x00, surcharge])
                        .field(description)
                        .field(&value.to_string())
                        .field("2100")
                        .fs_n(2),
                )]
            }

            FiscalCommand::CloseFiscalReceipt { id, .. } => {
                let frame = self.close(*id);
                self.reset();
                vec![frame]
            }

            FiscalCommand::OpenNonFiscalReceipt => vec![frame(
                TAG_OPEN_NON_FISCAL,
                command(FAMILY_NON_FISCAL, &[0x01], [0x00, 0x00]),
            )],

            FiscalCommand::PrintNonFiscalText { text } => {
                chunks(text, self.limits.non_fiscal_text(Dialect::EpsonExt))
                    .iter()
                    .map(|line| {
                        frame(
                            TAG_NON_FISCAL_TEXT,
                            command(FAMILY_NON_FISCAL, &[ESC, 0x02], [0x00, 0x00]).field(line),
                        )
                    })
                    .collect()
            }

            FiscalCommand::CloseNonFiscalReceipt => vec![frame(
                TAG_CLOSE_NON_FISCAL,
                command(FAMILY_NON_FISCAL, &[0x06], [0x00, 0x01]).fs_n(6),
            )],

            FiscalCommand::OpenDrawer => vec![frame(
                TAG_OPEN_DRAWER,
                command(FAMILY_DRAWER, &[0x07], [0x00, 0x01]),
            )],

            FiscalCommand::SetHeaderTrailer { trailer, .. } => trailer
                .lines()
                .take(FOOTER_SLOTS)
                .enumerate()
                .map(|(i, line)| Self::footer(i + 1, line))
                .collect(),

            FiscalCommand::SetEmbarkNumber { description, .. } => {
                let prefix = if self.registered() { "003-" } else { "008-" };
                self.customer.refer = format!("{}{}", prefix, description);
                Vec::new()
            }

            FiscalCommand::OpenDnfh { doc_num, .. } => {
                self.document = Document::CreditNote;
                let reference = if doc_num.is_empty() {
                    NO_REFERENCE_CREDIT_NOTE.to_string()
                } else {
                    let prefix = if self.registered() { "003-" } else { "008-" };
                    format!("{}{}", prefix, doc_num)
                };
                let payload = self
                    .buyer(command(FAMILY_CREDIT_NOTE, &[0x01], [0x00, 0x00]))
                    .fs_n(3)
                    .field(&reference);
                let open = frame(TAG_OPEN_INVOICE, payload);
                self.opened();
                vec![open]
            }

            FiscalCommand::CloseDnfh { id, .. } => {
                let (tag, kind) = if self.document == Document::CreditNote {
                    (TAG_CLOSE_CREDIT_NOTE, 1)
                } else {
                    (TAG_CLOSE_DNFH, 0)
                };
                let frame = frame(
                    tag,
                    command(FAMILY_CREDIT_NOTE, &[0x06], [0x00, ESC])
                        .byte(0x03)
                        .fs_n(7),
                )
                .with_receipt(*id, kind);
                self.reset();
                vec![frame]
            }

            FiscalCommand::SetDateTime(at) => vec![frame(
                TAG_SET_DATE_TIME,
                command(FAMILY_CONFIG, &[0x01], [0x00, 0x00])
                    .field(&at.format("%d%m%y").to_string())
                    .field(&at.format("%H%M%S").to_string()),
            )],

            FiscalCommand::SetFixedData { shop, phone } => {
                let mut lines = footer_lines(shop, phone);
                lines.resize(FOOTER_SLOTS, String::new());
                lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| Self::footer(i + 1, line))
                    .collect()
            }

            FiscalCommand::ReprintDocument {
                doc_type,
                doc_number,
            } => vec![frame(
                TAG_REPRINT,
                command(FAMILY_DOWNLOAD, &[0x07], [0x00, 0x00])
                    .field(doc_type)
                    .field(&doc_number.to_string()),
            )],

            FiscalCommand::ReprintContinue => vec![frame(
                TAG_REPRINT_CONTINUE,
                command(FAMILY_DOWNLOAD, &[0x08], [0x00, 0x00]),
            )],

            FiscalCommand::ReprintFinalize => vec![frame(
                TAG_REPRINT_FINALIZE,
                command(FAMILY_DOWNLOAD, &[0x09], [0x00, 0x00]),
            )],

            FiscalCommand::TransactionalMemoryInfo => vec![frame(
                TAG_MEMORY_INFO,
                command(FAMILY_DOWNLOAD, &[0x50], [0x00, 0x00]),
            )],

            FiscalCommand::DownloadReportByDate { kind, from, to } => vec![frame(
                TAG_DOWNLOAD_BY_DATE,
                command(FAMILY_DOWNLOAD, &[0x51], [0x00, 0x00])
                    .field(kind)
                    .field(&from.format("%d%m%y").to_string())
                    .field(&to.format("%d%m%y").to_string()),
            )],

            FiscalCommand::DownloadReportByNumber { kind, from, to } => vec![frame(
                TAG_DOWNLOAD_BY_NUMBER,
                command(FAMILY_DOWNLOAD, &[0x52], [0x00, 0x00])
                    .field(kind)
                    .field(&from.to_string())
                    .field(&to.to_string()),
            )],

            FiscalCommand::DownloadContinue => vec![frame(
                TAG_DOWNLOAD_CONTINUE,
                command(FAMILY_DOWNLOAD, &[0x53], [0x00, 0x00]),
            )],

            FiscalCommand::DownloadFinalize => vec![frame(
                TAG_DOWNLOAD_FINALIZE,
                command(FAMILY_DOWNLOAD, &[0x54], [0x00, 0x00]),
            )],

            FiscalCommand::DownloadDelete { to } => vec![frame(
                TAG_DOWNLOAD_DELETE,
                command(FAMILY_DOWNLOAD, &[0x55], [0x00, 0x00]).field(&to.to_string()),
            )],

            other => {
                debug!("{} has no Epson extended form", other.name());
                Vec::new()
            }
        }
    }
}
