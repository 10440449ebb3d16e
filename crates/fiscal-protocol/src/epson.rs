//! Epson classic protocol (TM-U220)
//!
//! Same framing as Hasar with a signed-byte checksum. Invoices carry the
//! whole buyer block in the open command, so customer data is buffered by
//! the encoder until the document is opened. Amounts are sent as scaled
//! integers (quantity x1000, prices and rates x100).

use tracing::debug;

use crate::command::{footer_lines, scaled, tax_rate, FiscalCommand};
use crate::frame::{
    chunks, truncate, Frame, Payload, CMD_CLOSE_NON_FISCAL, CMD_DAILY_CLOSE,
    CMD_DAILY_CLOSE_BY_DATE, CMD_DAILY_CLOSE_BY_NUMBER, CMD_HEADER_TRAILER, CMD_NON_FISCAL_TEXT,
    CMD_OPEN_DRAWER, CMD_OPEN_NON_FISCAL, CMD_SET_DATE_TIME, CMD_STATUS,
};
use crate::limits::FieldLimits;
use crate::models::Model;
use crate::{Dialect, FrameEncoder};

pub const CMD_OPEN_TICKET: u8 = 0x40;
pub const CMD_LINE_ITEM_TICKET: u8 = 0x42;
pub const CMD_TENDER_TICKET: u8 = 0x44;
pub const CMD_CLOSE_TICKET: u8 = 0x45;
pub const CMD_OPEN_INVOICE: u8 = 0x60;
pub const CMD_LINE_ITEM_INVOICE: u8 = 0x62;
pub const CMD_SUBTOTAL: u8 = 0x63;
pub const CMD_TENDER_INVOICE: u8 = 0x64;
pub const CMD_CLOSE_INVOICE: u8 = 0x65;
pub const CMD_PERCEPTIONS: u8 = 0x66;

/// First footer line number and number of footer slots
const FOOTER_FIRST: u32 = 11;
const FOOTER_SLOTS: usize = 11;

/// Buyer block sent with every invoice open
#[derive(Debug, Clone, PartialEq, Eq)]
struct Customer {
    name: String,
    cuit: String,
    tax_type: char,
    doc_type: String,
    address: String,
    address1: String,
    refer: String,
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            name: "Consumidor Final".to_string(),
            cuit: "0".to_string(),
            tax_type: 'F',
            doc_type: "DNI".to_string(),
            address: "-".to_string(),
            address1: String::new(),
            refer: "-".to_string(),
        }
    }
}

/// Encoder for the Epson classic protocol
#[derive(Debug, Clone)]
pub struct EpsonEncoder {
    model: Model,
    limits: FieldLimits,
    customer: Customer,
    /// Tax condition of the buyer of the open document
    buyer_registered: bool,
    invoice: bool,
}

impl EpsonEncoder {
    pub fn new(model: Model, limits: FieldLimits) -> Self {
        Self {
            model,
            limits,
            customer: Customer::default(),
            buyer_registered: false,
            invoice: false,
        }
    }

    fn frame(command: u8, payload: Payload) -> Frame {
        Frame::new(Dialect::Epson, command, payload.into_bytes())
    }

    fn reset(&mut self) {
        self.customer = Customer::default();
        self.buyer_registered = false;
        self.invoice = false;
    }

    /// The open frame has consumed the buffered buyer; start the next one clean
    fn opened(&mut self) {
        self.buyer_registered = self.registered();
        self.customer = Customer::default();
    }

    /// Invoice open block shared by invoices and credit notes
    fn invoice_block(&self, lead: char, letter: char, refer: &str) -> Payload {
        let c = &self.customer;
        Payload::new()
            .text(&lead.to_string())
            .field("C")
            .field(&letter.to_string())
            .field("1")
            .field("F")
            .field("12")
            .field("I")
            .field(&c.tax_type.to_string())
            .field(&c.name)
            .field("")
            .field(&c.doc_type)
            .field(&c.cuit)
            .field("N")
            .field(&c.address)
            .field(&c.address1)
            .field("")
            .field(refer)
            .field("")
            .field("C")
    }

    /// Item line, also used for discounts and surcharges
    fn item(&self, description: &str, quantity: &str, unit: i64, rate: &str, qualifier: char) -> Frame {
        let payload = Payload::new()
            .text(&truncate(description, self.limits.item_description(self.model)))
            .field(quantity)
            .field(&unit.to_string())
            .field(rate)
            .field(&qualifier.to_string())
            .fs();
        let (command, payload) = if self.invoice {
            (
                CMD_LINE_ITEM_INVOICE,
                payload
                    .text("0000")
                    .field("00000000")
                    .field("")
                    .field("")
                    .field("")
                    .field("0000")
                    .field("00000000000000000"),
            )
        } else {
            (
                CMD_LINE_ITEM_TICKET,
                payload.text("0").field("00000000").field("00000000000000000"),
            )
        };
        Self::frame(command, payload)
    }

    fn registered(&self) -> bool {
        self.customer.tax_type == 'I'
    }
}

impl FrameEncoder for EpsonEncoder {
    fn dialect(&self) -> Dialect {
        Dialect::Epson
    }

    fn encode(&mut self, command: &FiscalCommand) -> Vec<Frame> {
        match command {
            FiscalCommand::StatusRequest => {
                vec![Self::frame(CMD_STATUS, Payload::new().text("S"))]
            }

            FiscalCommand::DailyClose { kind } => vec![Self::frame(
                CMD_DAILY_CLOSE,
                Payload::new().text(&kind.to_string()).field("P"),
            )],

            FiscalCommand::DailyCloseByDate { from, to } => vec![Self::frame(
                CMD_DAILY_CLOSE_BY_DATE,
                Payload::new()
                    .text(&from.format("%y%m%d").to_string())
                    .field(&to.format("%y%m%d").to_string())
                    .field("T"),
            )],

            FiscalCommand::DailyCloseByNumber { from, to } => vec![Self::frame(
                CMD_DAILY_CLOSE_BY_NUMBER,
                Payload::new()
                    .text(&from.to_string())
                    .field(&to.to_string())
                    .field("T"),
            )],

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
                    "C" => "CUIT",
                    "3" => "PASAPO",
                    _ => "DNI",
                }
                .to_string();
                self.customer.address = address.clone();
                Vec::new()
            }

            FiscalCommand::OpenFiscalReceipt { kind } => {
                let frame = if matches!(kind, 'A' | 'B') {
                    self.invoice = true;
                    let refer = self.customer.refer.clone();
                    Self::frame(CMD_OPEN_INVOICE, self.invoice_block('T', *kind, &refer))
                } else {
                    self.invoice = false;
                    Self::frame(CMD_OPEN_TICKET, Payload::new().text("C"))
                };
                self.opened();
                vec![frame]
            }

            FiscalCommand::PrintLineItem {
                description,
                quantity,
                price,
                tax,
                qualifier,
            } => {
                let rate = tax_rate(tax);
                let unit = if self.buyer_registered {
                    scaled(price / (1.0 + rate / 100.0), 100.0)
                } else {
                    scaled(*price, 100.0)
                };
                vec![self.item(
                    description,
                    &scaled(*quantity, 1000.0).to_string(),
                    unit,
                    &scaled(rate, 100.0).to_string(),
                    *qualifier,
                )]
            }

            FiscalCommand::Perceptions {
                description,
                tax_amount,
            } => vec![Self::frame(
                CMD_PERCEPTIONS,
                Payload::new()
                    .text(description)
                    .field("O")
                    .field(&scaled(*tax_amount, 100.0).to_string())
                    .field("0"),
            )],

            FiscalCommand::Subtotal { print } => vec![Self::frame(
                CMD_SUBTOTAL,
                Payload::new().text(&print.to_string()).field("Subtotal"),
            )],

            FiscalCommand::TotalTender {
                description,
                amount,
                kind,
            } => {
                let command = if self.invoice {
                    CMD_TENDER_INVOICE
                } else {
                    CMD_TENDER_TICKET
                };
                vec![Self::frame(
                    command,
                    Payload::new()
                        .text(description)
                        .field(&format!("{:09}", scaled(*amount, 100.0)))
                        .field(&kind.to_string()),
                )]
            }

            FiscalCommand::GeneralDiscount {
                description,
                amount,
                kind,
                ..
            } => {
                let unit = if self.buyer_registered {
                    scaled(amount / 1.21, 100.0)
                } else {
                    scaled(*amount, 100.0)
                };
                let qualifier = if *kind == 'M' { 'M' } else { 'R' };
                vec![self.item(description, "1000", unit, "2100", qualifier)]
            }

            FiscalCommand::CloseFiscalReceipt { intype, kind, id } => {
                let frame = if self.invoice {
                    let receipt_kind = u8::from(*intype == 'M');
                    Self::frame(
                        CMD_CLOSE_INVOICE,
                        Payload::new()
                            .text(&intype.to_string())
                            .field(&kind.to_string())
                            .field("0"),
                    )
                    .with_receipt(*id, receipt_kind)
                } else {
                    Self::frame(CMD_CLOSE_TICKET, Payload::new().text("T")).with_receipt(*id, 0)
                };
                self.reset();
                vec![frame]
            }

            FiscalCommand::OpenNonFiscalReceipt => {
                vec![Self::frame(CMD_OPEN_NON_FISCAL, Payload::new().text(" "))]
            }

            FiscalCommand::PrintNonFiscalText { text } => {
                chunks(text, self.limits.non_fiscal_text(Dialect::Epson))
                    .iter()
                    .map(|line| Self::frame(CMD_NON_FISCAL_TEXT, Payload::new().text(line)))
                    .collect()
            }

            FiscalCommand::CloseNonFiscalReceipt => {
                vec![Self::frame(CMD_CLOSE_NON_FISCAL, Payload::new().text("T"))]
            }

            FiscalCommand::OpenDrawer => vec![Self::frame(CMD_OPEN_DRAWER, Payload::new())],

            FiscalCommand::SetEmbarkNumber { description, .. } => {
                self.customer.refer = description.clone();
                Vec::new()
            }

            FiscalCommand::OpenDnfh { kind, doc_num, .. } => {
                self.invoice = true;
                let letter = if *kind == 'R' { 'A' } else { 'B' };
                let frame = Self::frame(CMD_OPEN_INVOICE, self.invoice_block('M', letter, doc_num));
                self.opened();
                vec![frame]
            }

            FiscalCommand::CloseDnfh { id, .. } => {
                let letter = if self.buyer_registered { 'A' } else { 'B' };
                let frame = Self::frame(
                    CMD_CLOSE_INVOICE,
                    Payload::new().text("M").field(&letter.to_string()).field("0"),
                )
                .with_receipt(*id, 1);
                self.reset();
                vec![frame]
            }

            FiscalCommand::SetDateTime(at) => vec![Self::frame(
                CMD_SET_DATE_TIME,
                Payload::new()
                    .text(&at.format("%y%m%d").to_string())
                    .field(&at.format("%H%M%S").to_string()),
            )],

            FiscalCommand::SetFixedData { shop, phone } => {
                let mut lines = footer_lines(shop, phone);
                lines.resize(FOOTER_SLOTS, " ".to_string());
                lines
                    .iter()
                    .zip(FOOTER_FIRST..)
                    .map(|(line, number)| {
                        Self::frame(
                            CMD_HEADER_TRAILER,
                            Payload::new().text(&format!("{:05}", number)).field(line),
                        )
                    })
                    .collect()
            }

            other => {
                debug!("{} has no Epson form", other.name());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encoder() -> EpsonEncoder {
        EpsonEncoder::new(Model::EpsonTMU220, FieldLimits::default())
    }

    fn fields(frame: &Frame) -> Vec<String> {
        Frame::decode(Dialect::Epson, frame.bytes())
            .unwrap()
            .fields()
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }

    fn customer(tax_type: char, doc_type: &str) -> FiscalCommand {
        FiscalCommand::SetCustomerData {
            name: "ACME SA".into(),
            cuit: "30712345678".into(),
            tax_type,
            doc_type: doc_type.into(),
            address: "Calle 123".into(),
        }
    }

    #[test]
    fn test_status_request() {
        let frames = encoder().encode(&FiscalCommand::StatusRequest);
        assert_eq!(frames[0].command, CMD_STATUS);
        assert_eq!(frames[0].data, b"S".to_vec());
    }

    #[test]
    fn test_customer_data_is_buffered() {
        let mut enc = encoder();
        assert!(enc.encode(&customer('I', "C")).is_empty());
        let frames = enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'A' });
        assert_eq!(frames[0].command, CMD_OPEN_INVOICE);
        let f = fields(&frames[0]);
        assert_eq!(f[0], "T");
        assert_eq!(f[2], "A");
        assert_eq!(f[7], "I");
        assert_eq!(f[8], "ACME SA");
        assert_eq!(f[10], "CUIT");
        assert_eq!(f[11], "30712345678");
        assert_eq!(f[13], "Calle 123");
        assert_eq!(f[16], "-");
        assert_eq!(f.last().map(String::as_str), Some("C"));
    }

    #[test]
    fn test_tax_and_document_mapping() {
        let mut enc = encoder();
        enc.encode(&customer('C', "3"));
        let f = fields(&enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'B' })[0]);
        assert_eq!(f[7], "F");
        assert_eq!(f[10], "PASAPO");

        enc.encode(&customer('A', "2"));
        let f = fields(&enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'B' })[0]);
        assert_eq!(f[7], "N");
        assert_eq!(f[10], "DNI");
    }

    #[test]
    fn test_ticket_line_item() {
        let mut enc = encoder();
        let open = enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'T' });
        assert_eq!(open[0].command, CMD_OPEN_TICKET);
        assert_eq!(open[0].data, b"C".to_vec());

        let frames = enc.encode(&FiscalCommand::PrintLineItem {
            description: "Widget".into(),
            quantity: 1.0,
            price: 10.0,
            tax: "21.00".into(),
            qualifier: 'M',
        });
        assert_eq!(frames[0].command, CMD_LINE_ITEM_TICKET);
        assert_eq!(
            fields(&frames[0]),
            vec!["Widget", "1000", "1000", "2100", "M", "0", "00000000", "00000000000000000"]
        );
    }

    #[test]
    fn test_registered_buyer_gets_net_price() {
        let mut enc = encoder();
        enc.encode(&customer('I', "C"));
        enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'A' });
        let frames = enc.encode(&FiscalCommand::PrintLineItem {
            description: "Widget".into(),
            quantity: 2.0,
            price: 121.0,
            tax: "21.00".into(),
            qualifier: 'M',
        });
        assert_eq!(frames[0].command, CMD_LINE_ITEM_INVOICE);
        let f = fields(&frames[0]);
        assert_eq!(f[1], "2000");
        assert_eq!(f[2], "10000");
        assert_eq!(f.len(), 12);
    }

    #[test]
    fn test_open_resets_buffered_buyer() {
        let mut enc = encoder();
        enc.encode(&customer('I', "C"));
        enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'A' });

        // Pricing inside the open document still follows its buyer
        let item = enc.encode(&FiscalCommand::PrintLineItem {
            description: "Widget".into(),
            quantity: 1.0,
            price: 121.0,
            tax: "21.00".into(),
            qualifier: 'M',
        });
        assert_eq!(fields(&item[0])[2], "10000");

        let f = fields(&enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'B' })[0]);
        assert_eq!(f[7], "F");
        assert_eq!(f[8], "Consumidor Final");
    }

    #[test]
    fn test_tender_is_zero_padded() {
        let frames = encoder().encode(&FiscalCommand::TotalTender {
            description: "Efectivo".into(),
            amount: 12.5,
            kind: 'T',
        });
        assert_eq!(frames[0].command, CMD_TENDER_TICKET);
        assert_eq!(fields(&frames[0]), vec!["Efectivo", "000001250", "T"]);
    }

    #[test]
    fn test_close_resets_context() {
        let mut enc = encoder();
        enc.encode(&customer('I', "C"));
        enc.encode(&FiscalCommand::SetEmbarkNumber {
            doc_num: 1,
            description: "0001-00000042".into(),
            kind: ' ',
        });
        enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'A' });
        let close = enc.encode(&FiscalCommand::CloseFiscalReceipt {
            intype: 'T',
            kind: 'A',
            id: 5,
        });
        assert_eq!(close[0].command, CMD_CLOSE_INVOICE);
        assert_eq!(fields(&close[0]), vec!["T", "A", "0"]);
        assert_eq!(close[0].receipt.unwrap().kind, 0);

        let f = fields(&enc.encode(&FiscalCommand::OpenFiscalReceipt { kind: 'B' })[0]);
        assert_eq!(f[8], "Consumidor Final");
        assert_eq!(f[16], "-");
    }

    #[test]
    fn test_credit_note() {
        let mut enc = encoder();
        enc.encode(&customer('I', "C"));
        let open = enc.encode(&FiscalCommand::OpenDnfh {
            kind: 'R',
            fix_value: 'T',
            doc_num: "0001-00000042".into(),
        });
        let f = fields(&open[0]);
        assert_eq!((f[0].as_str(), f[2].as_str()), ("M", "A"));
        assert_eq!(f[16], "0001-00000042");

        let close = enc.encode(&FiscalCommand::CloseDnfh {
            id: 8,
            f_type: 'R',
            copies: 1,
        });
        assert_eq!(fields(&close[0]), vec!["M", "A", "0"]);
        let tag = close[0].receipt.unwrap();
        assert_eq!((tag.id, tag.kind), (8, 1));
    }

    #[test]
    fn test_fixed_data_fills_footer() {
        let frames = encoder().encode(&FiscalCommand::SetFixedData {
            shop: "042".into(),
            phone: "0800".into(),
        });
        assert_eq!(frames.len(), FOOTER_SLOTS);
        assert_eq!(fields(&frames[0]), vec!["00011", "DEFENSA CONSUMIDOR 0800"]);
        assert_eq!(fields(&frames[10]), vec!["00021", " "]);
    }

    #[test]
    fn test_unsupported_commands_encode_nothing() {
        let mut enc = encoder();
        assert!(enc.encode(&FiscalCommand::Cancel).is_empty());
        assert!(enc
            .encode(&FiscalCommand::PrintFiscalText { text: "x".into() })
            .is_empty());
    }
}
