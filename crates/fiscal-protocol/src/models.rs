//! Printer brands and models
//!
//! A model fixes the dialect once, at construction. Model-specific field
//! layouts (address on customer data, extra tender field, description width)
//! are queried here rather than scattered through the encoders.

use crate::error::ProtocolError;
use crate::Dialect;

/// Printer manufacturer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Brand {
    Epson,
    Hasar,
}

impl Brand {
    pub fn name(&self) -> &'static str {
        match self {
            Brand::Epson => "Epson",
            Brand::Hasar => "Hasar",
        }
    }
}

impl std::str::FromStr for Brand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epson" => Ok(Brand::Epson),
            "hasar" => Ok(Brand::Hasar),
            _ => Err(ProtocolError::UnknownModel(s.to_string())),
        }
    }
}

/// Supported fiscal printer models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Model {
    EpsonTMU220,
    EpsonTM900,
    Hasar320F,
    Hasar330F,
    Hasar615F,
    Hasar715F,
    Hasar1000F,
}

impl Model {
    /// All known models
    pub const ALL: [Model; 7] = [
        Model::EpsonTMU220,
        Model::EpsonTM900,
        Model::Hasar320F,
        Model::Hasar330F,
        Model::Hasar615F,
        Model::Hasar715F,
        Model::Hasar1000F,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Model::EpsonTMU220 => "Epson TM-U220",
            Model::EpsonTM900 => "Epson TM-T900",
            Model::Hasar320F => "Hasar 320F",
            Model::Hasar330F => "Hasar 330F",
            Model::Hasar615F => "Hasar 615F",
            Model::Hasar715F => "Hasar 715F",
            Model::Hasar1000F => "Hasar 1000F",
        }
    }

    pub fn brand(&self) -> Brand {
        match self {
            Model::EpsonTMU220 | Model::EpsonTM900 => Brand::Epson,
            _ => Brand::Hasar,
        }
    }

    /// Packet dialect spoken by this model
    pub fn dialect(&self) -> Dialect {
        match self {
            Model::EpsonTM900 => Dialect::EpsonExt,
            Model::EpsonTMU220 => Dialect::Epson,
            Model::Hasar1000F => Dialect::Hasar2G,
            _ => Dialect::Hasar,
        }
    }

    /// Whether the model prints tickets (as opposed to invoices only)
    pub fn supports_ticket(&self) -> bool {
        matches!(
            self,
            Model::EpsonTMU220 | Model::EpsonTM900 | Model::Hasar615F | Model::Hasar715F
        )
    }

    /// Ticket printers with the short description field and extra tender field
    pub(crate) fn is_hasar_ticket(&self) -> bool {
        matches!(self, Model::Hasar615F | Model::Hasar715F)
    }

    /// Models that send the buyer address with customer data
    pub(crate) fn customer_address(&self) -> bool {
        matches!(self, Model::Hasar320F | Model::Hasar330F | Model::Hasar715F)
    }

    /// Models that take the document number and copies on DNFH commands
    pub(crate) fn dnfh_document_fields(&self) -> bool {
        matches!(self, Model::Hasar320F | Model::Hasar330F)
    }

    /// Check that `model` belongs to `brand`
    pub fn for_brand(brand: Brand, model: Model) -> Result<Model, ProtocolError> {
        if model.brand() == brand {
            Ok(model)
        } else {
            Err(ProtocolError::BrandMismatch {
                brand: brand.name().to_string(),
                model: model.name().to_string(),
            })
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Model {
    type Err = ProtocolError;

    /// Accepts display names and compact forms such as `tm900`, `330f`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let key = key
            .trim_start_matches("epson")
            .trim_start_matches("hasar")
            .to_string();
        match key.as_str() {
            "tmu220" | "u220" => Ok(Model::EpsonTMU220),
            "tmt900" | "tm900" | "t900" => Ok(Model::EpsonTM900),
            "320f" | "320" => Ok(Model::Hasar320F),
            "330f" | "330" => Ok(Model::Hasar330F),
            "615f" | "615" => Ok(Model::Hasar615F),
            "715f" | "715" => Ok(Model::Hasar715F),
            "1000f" | "1000" => Ok(Model::Hasar1000F),
            _ => Err(ProtocolError::UnknownModel(s.to_string())),
        }
    }
}
