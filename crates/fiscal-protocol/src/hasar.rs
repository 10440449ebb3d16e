//! Hasar first-generation protocol
//!
//! Fields are separated by FS after a one-byte command code. Amounts are
//! sent as decimal text with two places. Replies are checked for structure
//! only; the devices send checksums that do not always match their bytes.

use tracing::debug;

use crate::command::{decimal, footer_lines, FiscalCommand};
use crate::frame::{
    chunks, truncate, Frame, Payload, CMD_CLOSE_NON_FISCAL, CMD_DAILY_CLOSE,
    CMD_DAILY_CLOSE_BY_DATE, CMD_DAILY_CLOSE_BY_NUMBER, CMD_HEADER_TRAILER, CMD_NON_FISCAL_TEXT,
    CMD_OPEN_DRAWER, CMD_OPEN_NON_FISCAL, CMD_SET_DATE_TIME, CMD_STATUS,
};
use crate::limits::FieldLimits;
use crate::models::Model;
use crate::{Dialect, FrameEncoder};

pub const CMD_OPEN_FISCAL: u8 = 0x40;
pub const CMD_FISCAL_TEXT: u8 = 0x41;
pub const CMD_LINE_ITEM: u8 = 0x42;
pub const CMD_SUBTOTAL: u8 = 0x43;
pub const CMD_TOTAL_TENDER: u8 = 0x44;
pub const CMD_CLOSE_FISCAL: u8 = 0x45;
pub const CMD_GENERAL_DISCOUNT: u8 = 0x54;
pub const CMD_PERCEPTIONS: u8 = 0x60;
pub const CMD_CUSTOMER_DATA: u8 = 0x62;
pub const CMD_OPEN_DNFH: u8 = 0x80;
pub const CMD_CLOSE_DNFH: u8 = 0x81;
pub const CMD_EMBARK_ITEM: u8 = 0x82;
pub const CMD_EMBARK_NUMBER: u8 = 0x93;
pub const CMD_RECEIPT_TEXT: u8 = 0x97;
pub const CMD_CANCEL: u8 = 0x98;

/// Erases a header or trailer line
const ERASE_LINE: u8 = 0x7f;

/// Encoder for the Hasar first-generation models
#[derive(Debug, Clone)]
pub struct HasarEncoder {
    model: Model,
    limits: FieldLimits,
}

impl HasarEncoder {
    pub fn new(model: Model, limits: FieldLimits) -> Self {
        Self { model, limits }
    }

    fn frame(command: u8, payload: Payload) -> Frame {
        Frame::new(Dialect::Hasar, command, payload.into_bytes())
    }

    fn tender(&self, description: &str, amount: f64, kind: char) -> Frame {
        let mut payload = Payload::new()
            .text(description)
            .field(&decimal(amount, 2))
            .fs()
            .text(&kind.to_string());
        if self.model.is_hasar_ticket() {
            payload = payload.field("0");
        }
        Self::frame(CMD_TOTAL_TENDER, payload)
    }
}

/// Status request frame
pub fn status_frame() -> Frame {
    Frame::new(Dialect::Hasar, CMD_STATUS, Vec::new())
}

/// Frames that force any half-open document closed
///
/// A token cash tender, a fiscal close and a non-fiscal close. They are
/// written blind: the device may reject any of them depending on which
/// document, if any, is open.
pub fn recovery_frames(model: Model) -> Vec<Frame> {
    let encoder = HasarEncoder::new(model, FieldLimits::default());
    vec![
        encoder.tender("Contado", 1.0, 'T'),
        HasarEncoder::frame(CMD_CLOSE_FISCAL, Payload::new()),
        HasarEncoder::frame(CMD_CLOSE_NON_FISCAL, Payload::new()),
    ]
}

impl FrameEncoder for HasarEncoder {
    fn dialect(&self) -> Dialect {
        Dialect::Hasar
    }

    fn encode(&mut self, command: &FiscalCommand) -> Vec<Frame> {
        let limits = self.limits;
        match command {
            FiscalCommand::StatusRequest => vec![status_frame()],

            FiscalCommand::DailyClose { kind } => vec![Self::frame(
                CMD_DAILY_CLOSE,
                Payload::new().text(&kind.to_string()),
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
                let mut payload = Payload::new()
                    .text(&truncate(name, limits.customer_name()))
                    .field(cuit)
                    .field(&tax_type.to_string())
                    .field(doc_type);
                if self.model.customer_address() {
                    payload = payload.field(&truncate(address, limits.customer_address()));
                }
                vec![Self::frame(CMD_CUSTOMER_DATA, payload)]
            }

            FiscalCommand::OpenFiscalReceipt { kind } => vec![Self::frame(
                CMD_OPEN_FISCAL,
                Payload::new().text(&kind.to_string()).field("T"),
            )],

            FiscalCommand::PrintFiscalText { text } => vec![Self::frame(
                CMD_FISCAL_TEXT,
                Payload::new()
                    .text(&truncate(text, limits.fiscal_text()))
                    .field("0"),
            )],

            FiscalCommand::PrintLineItem {
                description,
                quantity,
                price,
                tax,
                qualifier,
            } => vec![Self::frame(
                CMD_LINE_ITEM,
                Payload::new()
                    .text(&truncate(description, limits.item_description(self.model)))
                    .field(&decimal(*quantity, 2))
                    .field(&decimal(*price, 2))
                    .field(tax)
                    .field(&qualifier.to_string())
                    .field("0.00")
                    .field("0")
                    .field("T"),
            )],

            FiscalCommand::Perceptions {
                description,
                tax_amount,
            } => vec![Self::frame(
                CMD_PERCEPTIONS,
                Payload::new()
                    .text("**.**")
                    .field(description)
                    .field(&decimal(*tax_amount, 2)),
            )],

            FiscalCommand::Subtotal { print } => vec![Self::frame(
                CMD_SUBTOTAL,
                Payload::new().text(&print.to_string()).field("Subtotal"),
            )],

            FiscalCommand::TotalTender {
                description,
                amount,
                kind,
            } => vec![self.tender(
                &truncate(description, limits.tender_description()),
                *amount,
                *kind,
            )],

            FiscalCommand::GeneralDiscount {
                description,
                amount,
                kind,
                ..
            } => vec![Self::frame(
                CMD_GENERAL_DISCOUNT,
                Payload::new()
                    .text(&truncate(description, limits.tender_description()))
                    .field(&decimal(*amount, 2))
                    .field(&kind.to_string())
                    .field("0")
                    .field("T"),
            )],

            FiscalCommand::CloseFiscalReceipt { kind, id, .. } => {
                let receipt_kind = if *kind == 'r' { 3 } else { 0 };
                vec![Self::frame(CMD_CLOSE_FISCAL, Payload::new()).with_receipt(*id, receipt_kind)]
            }

            FiscalCommand::OpenNonFiscalReceipt => {
                vec![Self::frame(CMD_OPEN_NON_FISCAL, Payload::new().text(" "))]
            }

            FiscalCommand::PrintNonFiscalText { text } => {
                chunks(text, limits.non_fiscal_text(Dialect::Hasar))
                    .iter()
                    .map(|line| Self::frame(CMD_NON_FISCAL_TEXT, Payload::new().text(line)))
                    .collect()
            }

            FiscalCommand::CloseNonFiscalReceipt => {
                vec![Self::frame(CMD_CLOSE_NON_FISCAL, Payload::new())]
            }

            FiscalCommand::OpenDrawer => vec![Self::frame(CMD_OPEN_DRAWER, Payload::new())],

            FiscalCommand::SetHeaderTrailer { trailer, .. } => {
                let payload = Payload::new().text("12").fs();
                let payload = if trailer.is_empty() {
                    payload.byte(ERASE_LINE)
                } else {
                    payload.text(&truncate(trailer, limits.trailer()))
                };
                vec![Self::frame(CMD_HEADER_TRAILER, payload)]
            }

            FiscalCommand::SetEmbarkNumber {
                doc_num,
                description,
                ..
            } => vec![Self::frame(
                CMD_EMBARK_NUMBER,
                Payload::new().text(&doc_num.to_string()).field(description),
            )],

            FiscalCommand::OpenDnfh {
                kind,
                fix_value,
                doc_num,
            } => {
                let mut payload = Payload::new()
                    .text(&kind.to_string())
                    .field(&fix_value.to_string());
                if self.model.dnfh_document_fields() {
                    payload = payload.field(doc_num);
                }
                vec![Self::frame(CMD_OPEN_DNFH, payload)]
            }

            FiscalCommand::PrintEmbarkItem {
                description,
                quantity,
            } => vec![Self::frame(
                CMD_EMBARK_ITEM,
                Payload::new()
                    .text(description)
                    .field(&decimal(*quantity, 4))
                    .field("0"),
            )],

            FiscalCommand::CloseDnfh { id, f_type, copies } => {
                let payload = if self.model.dnfh_document_fields() {
                    Payload::new().text(&copies.to_string())
                } else {
                    Payload::new()
                };
                let receipt_kind = if *f_type == 'R' { 1 } else { 2 };
                vec![Self::frame(CMD_CLOSE_DNFH, payload).with_receipt(*id, receipt_kind)]
            }

            FiscalCommand::ReceiptText { text } => vec![Self::frame(
                CMD_RECEIPT_TEXT,
                Payload::new().text(&truncate(text, limits.receipt_text())),
            )],

            FiscalCommand::Cancel => vec![Self::frame(CMD_CANCEL, Payload::new())],

            FiscalCommand::SetDateTime(at) => vec![Self::frame(
                CMD_SET_DATE_TIME,
                Payload::new()
                    .text(&at.format("%y%m%d").to_string())
                    .field(&at.format("%H%M%S").to_string()),
            )],

            FiscalCommand::SetFixedData { shop, phone } => footer_lines(shop, phone)
                .iter()
                .zip(11..)
                .map(|(line, number)| {
                    Self::frame(
                        CMD_HEADER_TRAILER,
                        Payload::new().text(&number.to_string()).field(line),
                    )
                })
                .collect(),

            other => {
                debug!("{} has no Hasar form", other.name());
                Vec::new()
            }
        }
    }
}
