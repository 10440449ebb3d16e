//! Text field widths
//!
//! Oversized text is truncated silently. Widths that changed between device
//! revisions are configurable through [`FieldLimits::non_fiscal_width`].

use crate::models::Model;
use crate::Dialect;

/// Per-model text widths used by the encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldLimits {
    /// Override for the non-fiscal text chunk width
    pub non_fiscal_width: Option<usize>,
}

impl FieldLimits {
    pub fn with_non_fiscal_width(width: usize) -> Self {
        Self {
            non_fiscal_width: Some(width),
        }
    }

    /// Chunk width for non-fiscal text lines
    pub fn non_fiscal_text(&self, dialect: Dialect) -> usize {
        self.non_fiscal_width.unwrap_or(match dialect {
            Dialect::Hasar => 40,
            _ => 39,
        })
    }

    /// Width of a line item description
    pub fn item_description(&self, model: Model) -> usize {
        match model.dialect() {
            Dialect::Hasar if model.is_hasar_ticket() => 18,
            Dialect::Hasar => 62,
            Dialect::Epson => 20,
            _ => 40,
        }
    }

    /// Width of a customer name
    pub fn customer_name(&self) -> usize {
        49
    }

    /// Width of a customer address
    pub fn customer_address(&self) -> usize {
        40
    }

    /// Width of tender and discount descriptions
    pub fn tender_description(&self) -> usize {
        49
    }

    /// Width of fiscal text lines
    pub fn fiscal_text(&self) -> usize {
        50
    }

    /// Width of header and trailer lines
    pub fn trailer(&self) -> usize {
        120
    }

    /// Width of receipt text
    pub fn receipt_text(&self) -> usize {
        100
    }

    /// Width of perception descriptions on the extended dialect
    pub fn perception_description(&self) -> usize {
        30
    }
}
