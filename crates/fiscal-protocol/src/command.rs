//! Normalized fiscal command definitions
//!
//! These are the protocol-agnostic operations a caller can request. Each
//! dialect encoder translates them into its own packets; some commands have
//! no form in some dialects and encode to nothing.

use chrono::{NaiveDate, NaiveDateTime};

/// A fiscal printer operation
#[derive(Debug, Clone, PartialEq)]
pub enum FiscalCommand {
    // -------------------------------------------------------------------------
    // Status and closings
    // -------------------------------------------------------------------------
    /// Query printer and fiscal status
    StatusRequest,

    /// Daily closing: `'Z'` closes the fiscal day, `'X'` prints a partial report
    DailyClose { kind: char },

    /// Audit report over a date range
    DailyCloseByDate { from: NaiveDate, to: NaiveDate },

    /// Audit report over a range of Z closing numbers
    DailyCloseByNumber { from: u32, to: u32 },

    // -------------------------------------------------------------------------
    // Fiscal documents
    // -------------------------------------------------------------------------
    /// Buyer data for the next invoice
    SetCustomerData {
        name: String,
        cuit: String,
        /// `'I'` registered, `'C'` final consumer, `'E'` exempt, `'M'` monotax, `'N'` not responsible
        tax_type: char,
        /// `"C"` CUIT, `"L"` CUIL, `"2"` DNI, `"3"` passport
        doc_type: String,
        address: String,
    },

    /// Open a fiscal receipt: `'A'`/`'B'` invoices, `'T'` ticket
    OpenFiscalReceipt { kind: char },

    PrintFiscalText { text: String },

    PrintLineItem {
        description: String,
        quantity: f64,
        price: f64,
        /// Tax rate as printed, e.g. `"21.00"`
        tax: String,
        /// `'M'` adds the item, `'m'` subtracts it
        qualifier: char,
    },

    Perceptions { description: String, tax_amount: f64 },

    /// Subtotal, printed when `print` is `'P'`
    Subtotal { print: char },

    TotalTender {
        description: String,
        amount: f64,
        /// `'T'` tender, `'C'` cancel, `'D'` discount, `'R'` return
        kind: char,
    },

    GeneralDiscount {
        description: String,
        amount: f64,
        tax_percent: f64,
        /// `'m'` discount, `'M'` surcharge
        kind: char,
    },

    /// Close the open document; the reply carries the receipt number
    CloseFiscalReceipt { intype: char, kind: char, id: i32 },

    // -------------------------------------------------------------------------
    // Non-fiscal documents
    // -------------------------------------------------------------------------
    OpenNonFiscalReceipt,

    /// Free text, split into printer-width lines
    PrintNonFiscalText { text: String },

    CloseNonFiscalReceipt,

    // -------------------------------------------------------------------------
    // Credit notes and associated documents
    // -------------------------------------------------------------------------
    /// Associated document (invoice being credited or remit number)
    SetEmbarkNumber {
        doc_num: i32,
        description: String,
        kind: char,
    },

    /// Open a non-fiscal homologated document: `'R'`/`'S'` credit notes
    OpenDnfh {
        kind: char,
        fix_value: char,
        doc_num: String,
    },

    PrintEmbarkItem { description: String, quantity: f64 },

    /// Close the DNFH; `f_type` `'R'` marks a credit note
    CloseDnfh { id: i32, f_type: char, copies: i32 },

    ReceiptText { text: String },

    // -------------------------------------------------------------------------
    // Device configuration
    // -------------------------------------------------------------------------
    OpenDrawer,

    SetHeaderTrailer { header: String, trailer: String },

    SetDateTime(NaiveDateTime),

    /// Fixed footer lines with shop name and phone
    SetFixedData { shop: String, phone: String },

    /// Abort whatever document is open
    Cancel,

    // -------------------------------------------------------------------------
    // Reprint and electronic journal download
    // -------------------------------------------------------------------------
    ReprintDocument { doc_type: String, doc_number: i32 },

    ReprintContinue,

    ReprintFinalize,

    TransactionalMemoryInfo,

    DownloadReportByDate {
        kind: String,
        from: NaiveDate,
        to: NaiveDate,
    },

    DownloadReportByNumber { kind: String, from: u32, to: u32 },

    DownloadContinue,

    DownloadFinalize,

    /// Delete downloaded journal data up to Z closing `to`
    DownloadDelete { to: u32 },
}

impl FiscalCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            FiscalCommand::StatusRequest => "status_request",
            FiscalCommand::DailyClose { .. } => "daily_close",
            FiscalCommand::DailyCloseByDate { .. } => "daily_close_by_date",
            FiscalCommand::DailyCloseByNumber { .. } => "daily_close_by_number",
            FiscalCommand::SetCustomerData { .. } => "set_customer_data",
            FiscalCommand::OpenFiscalReceipt { .. } => "open_fiscal_receipt",
            FiscalCommand::PrintFiscalText { .. } => "print_fiscal_text",
            FiscalCommand::PrintLineItem { .. } => "print_line_item",
            FiscalCommand::Perceptions { .. } => "perceptions",
            FiscalCommand::Subtotal { .. } => "subtotal",
            FiscalCommand::TotalTender { .. } => "total_tender",
            FiscalCommand::GeneralDiscount { .. } => "general_discount",
            FiscalCommand::CloseFiscalReceipt { .. } => "close_fiscal_receipt",
            FiscalCommand::OpenNonFiscalReceipt => "open_non_fiscal_receipt",
            FiscalCommand::PrintNonFiscalText { .. } => "print_non_fiscal_text",
            FiscalCommand::CloseNonFiscalReceipt => "close_non_fiscal_receipt",
            FiscalCommand::SetEmbarkNumber { .. } => "set_embark_number",
            FiscalCommand::OpenDnfh { .. } => "open_dnfh",
            FiscalCommand::PrintEmbarkItem { .. } => "print_embark_item",
            FiscalCommand::CloseDnfh { .. } => "close_dnfh",
            FiscalCommand::ReceiptText { .. } => "receipt_text",
            FiscalCommand::OpenDrawer => "open_drawer",
            FiscalCommand::SetHeaderTrailer { .. } => "set_header_trailer",
            FiscalCommand::SetDateTime(_) => "set_date_time",
            FiscalCommand::SetFixedData { .. } => "set_fixed_data",
            FiscalCommand::Cancel => "cancel",
            FiscalCommand::ReprintDocument { .. } => "reprint_document",
            FiscalCommand::ReprintContinue => "reprint_continue",
            FiscalCommand::ReprintFinalize => "reprint_finalize",
            FiscalCommand::TransactionalMemoryInfo => "transactional_memory_info",
            FiscalCommand::DownloadReportByDate { .. } => "download_report_by_date",
            FiscalCommand::DownloadReportByNumber { .. } => "download_report_by_number",
            FiscalCommand::DownloadContinue => "download_continue",
            FiscalCommand::DownloadFinalize => "download_finalize",
            FiscalCommand::DownloadDelete { .. } => "download_delete",
        }
    }

    /// Whether this command ends a document
    pub fn closes_document(&self) -> bool {
        matches!(
            self,
            FiscalCommand::CloseFiscalReceipt { .. } | FiscalCommand::CloseDnfh { .. }
        )
    }
}

/// Format an amount with fixed decimals, as the printers expect
pub fn decimal(value: f64, places: usize) -> String {
    format!("{:.*}", places, value)
}

/// Scale an amount to an integer count of `1 / factor` units
pub fn scaled(value: f64, factor: f64) -> i64 {
    (value * factor).round() as i64
}

/// Parse a tax rate field such as `"21.00"`, defaulting to zero
pub fn tax_rate(tax: &str) -> f64 {
    tax.trim().parse().unwrap_or(0.0)
}

/// Consumer-protection footer printed below every document
pub fn footer_lines(shop: &str, phone: &str) -> Vec<String> {
    let rule = "*".repeat(37);
    vec![
        format!("DEFENSA CONSUMIDOR {}", phone),
        rule.clone(),
        format!("Tienda: {}", shop),
        rule,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(FiscalCommand::StatusRequest.name(), "status_request");
        assert_eq!(
            FiscalCommand::DownloadDelete { to: 3 }.name(),
            "download_delete"
        );
    }

    #[test]
    fn test_closes_document() {
        assert!(FiscalCommand::CloseFiscalReceipt {
            intype: 'T',
            kind: 'B',
            id: 1
        }
        .closes_document());
        assert!(!FiscalCommand::OpenDrawer.closes_document());
    }

    #[test]
    fn test_number_helpers() {
        assert_eq!(decimal(10.0, 2), "10.00");
        assert_eq!(decimal(1.23456, 4), "1.2346");
        assert_eq!(scaled(1.5, 1000.0), 1500);
        assert_eq!(scaled(0.1 + 0.2, 100.0), 30);
        assert_eq!(tax_rate("21.00"), 21.0);
        assert_eq!(tax_rate("abc"), 0.0);
    }

    #[test]
    fn test_footer_lines() {
        let lines = footer_lines("042", "0800-666-1518");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "DEFENSA CONSUMIDOR 0800-666-1518");
        assert_eq!(lines[2], "Tienda: 042");
    }
}
