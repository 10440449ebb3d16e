//! Hasar second generation JSON protocol (1000F)
//!
//! Every request is an object with a single root key naming the command:
//!
//! ```json
//! { "AbrirDocumento": { "CodigoComprobante": "TiqueFacturaB" } }
//! ```
//!
//! Replies echo the root key and carry an `Estado` map with `Impresora` and
//! `Fiscal` condition lists.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::command::{decimal, FiscalCommand};
use crate::frame::{chunks, ReceiptTag};
use crate::limits::FieldLimits;
use crate::Dialect;

/// Root key of the command that closes any document
pub const CLOSE_DOCUMENT: &str = "CerrarDocumento";
/// Root key of the cancel command
pub const CANCEL: &str = "Cancelar";
/// Root key of the status request
pub const STATUS: &str = "ConsultarEstado";

/// One JSON command
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    /// Request document: a single root key mapped to its parameters
    pub body: Map<String, Value>,
    /// Receipt number routing, when the reply assigns one
    pub receipt: Option<ReceiptTag>,
}

impl JsonRequest {
    pub fn new(command: &str, params: Value) -> Self {
        let mut body = Map::new();
        body.insert(command.to_string(), params);
        Self {
            body,
            receipt: None,
        }
    }

    pub fn with_receipt(mut self, id: i32, kind: u8) -> Self {
        self.receipt = Some(ReceiptTag { id, kind });
        self
    }

    /// Command name
    pub fn root(&self) -> Option<&str> {
        self.body.keys().next().map(String::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Outcome of checking a reply against its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Wrong root key, missing state or a blocking printer condition
    Rejected(String),
    /// The device reports its fiscal memory exhausted
    MemoryFull,
}

/// Cancel request, sent after a rejected reply
pub fn cancel_request() -> JsonRequest {
    JsonRequest::new(CANCEL, json!({}))
}

fn condition_list<'a>(state: &'a Value, key: &str) -> impl Iterator<Item = &'a str> {
    state
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

/// Check that `reply` answers `request` and reports a usable printer
pub fn verify(request: &JsonRequest, reply: &Value) -> Verdict {
    let Some(sent) = request.root() else {
        return Verdict::Rejected("empty request".into());
    };
    let Some(reply) = reply.as_object() else {
        return Verdict::Rejected("reply is not an object".into());
    };
    let Some((received, params)) = reply.iter().next() else {
        return Verdict::Rejected("empty reply".into());
    };
    if received != sent {
        return Verdict::Rejected(format!("reply to {} while waiting for {}", received, sent));
    }

    let state = match params.get("Estado") {
        Some(state) if state.as_object().is_some_and(|m| !m.is_empty()) => state,
        _ => return Verdict::Rejected(format!("{} reply has no state", sent)),
    };

    if condition_list(state, "Impresora").any(|c| c == "TapaAbierta") {
        return Verdict::Rejected("printer cover open".into());
    }
    let mut fiscal = condition_list(state, "Fiscal");
    if let Some(fault) = fiscal.find(|c| *c == "ErrorEstado" || *c == "MemoriaFiscalLlena") {
        return if fault == "MemoriaFiscalLlena" {
            Verdict::MemoryFull
        } else {
            Verdict::Rejected("fiscal state error".into())
        };
    }
    Verdict::Accepted
}

/// Receipt number of a `CerrarDocumento` reply, 0 when absent
pub fn receipt_number(reply: &Value) -> i64 {
    let number = reply
        .get(CLOSE_DOCUMENT)
        .and_then(|params| params.get("NumeroComprobante"));
    match number {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Encoder for the JSON dialect
#[derive(Debug, Clone, Default)]
pub struct Hasar2gEncoder {
    limits: FieldLimits,
}

impl Hasar2gEncoder {
    pub fn new(limits: FieldLimits) -> Self {
        Self { limits }
    }

    /// Encode one command into the requests that implement it, in send order
    pub fn encode(&mut self, cmd: &FiscalCommand) -> Vec<JsonRequest> {
        let request = match cmd {
            FiscalCommand::StatusRequest => {
                JsonRequest::new(STATUS, json!({ "MensajeCF": null }))
            }

            FiscalCommand::DailyClose { kind } => JsonRequest::new(
                "CerrarJornadaFiscal",
                json!({ "Reporte": if *kind == 'Z' { "ReporteZ" } else { "ReporteX" } }),
            ),

            FiscalCommand::DailyCloseByDate { from, to } => JsonRequest::new(
                "ReportarZetasPorFecha",
                json!({
                    "FechaInicial": from.format("%y%m%d").to_string(),
                    "FechaFinal": to.format("%y%m%d").to_string(),
                    "Reporte": "ReportarAuditoriaGlobal",
                }),
            ),

            FiscalCommand::DailyCloseByNumber { from, to } => JsonRequest::new(
                "ReportarZetasPorNumeroZeta",
                json!({
                    "ZetaInicial": from.to_string(),
                    "ZetaFinal": to.to_string(),
                    "Reporte": "ReportarAuditoriaGlobal",
                }),
            ),

            FiscalCommand::SetCustomerData {
                name,
                cuit,
                tax_type,
                doc_type,
                address,
            } => {
                let responsibility = match tax_type {
                    'E' => "ResponsableExento",
                    'I' => "ResponsableInscripto",
                    'M' => "Monotributista",
                    'N' => "NoResponsable",
                    _ => "ConsumidorFinal",
                };
                let mut params = json!({
                    "RazonSocial": name,
                    "NumeroDocumento": cuit,
                    "ResponsabilidadIVA": responsibility,
                    "Domicilio": address,
                });
                let document = match doc_type.as_str() {
                    "C" => Some("TipoCUIT"),
                    "L" => Some("TipoCUIL"),
                    "2" => Some("TipoDNI"),
                    "3" => Some("TipoPasaporte"),
                    _ => None,
                };
                if let (Some(document), Some(map)) = (document, params.as_object_mut()) {
                    map.insert("TipoDocumento".into(), json!(document));
                }
                JsonRequest::new("CargarDatosCliente", params)
            }

            FiscalCommand::OpenFiscalReceipt { kind } => {
                let code = match kind {
                    'A' => "TiqueFacturaA",
                    'B' => "TiqueFacturaB",
                    'M' => "TiqueNotaCreditoA",
                    '-' => "TiqueNotaCreditoB",
                    _ => "Tique",
                };
                JsonRequest::new("AbrirDocumento", json!({ "CodigoComprobante": code }))
            }

            FiscalCommand::PrintFiscalText { text } => {
                JsonRequest::new("ImprimirTextoFiscal", json!({ "Texto": text }))
            }

            FiscalCommand::PrintLineItem {
                description,
                quantity,
                price,
                tax,
                ..
            } => JsonRequest::new(
                "ImprimirItem",
                json!({
                    "Descripcion": description,
                    "Cantidad": decimal(*quantity, 2),
                    "PrecioUnitario": decimal(*price, 2),
                    "CondicionIVA": "Gravado",
                    "AlicuotaIVA": tax,
                    "OperacionMonto": "ModoSumaMonto",
                    "TipoImpuestoInterno": "IIVariableKIVA",
                    "MagnitudImpuestoInterno": "0.00",
                    "ModoDisplay": "DisplayNo",
                    "ModoBaseTotal": "ModoPrecioTotal",
                    "UnidadReferencia": "1",
                    "CodigoProducto": description.replace(' ', ""),
                    "CodigoInterno": "",
                    "UnidadMedida": "Unidad",
                }),
            ),

            FiscalCommand::Perceptions {
                description,
                tax_amount,
            } => JsonRequest::new(
                "ImprimirOtrosTributos",
                json!({
                    "Codigo": description.replace(' ', ""),
                    "Descripcion": description,
                    "BaseImponible": "**.**",
                    "Importe": decimal(*tax_amount, 2),
                }),
            ),

            FiscalCommand::Subtotal { print } => JsonRequest::new(
                "ConsultarSubtotal",
                json!({
                    "Impresion": if *print == 'P' { "ImprimeSubtotal" } else { "NoImprimeSubtotal" },
                }),
            ),

            FiscalCommand::TotalTender {
                description,
                amount,
                ..
            } => JsonRequest::new(
                "ImprimirPago",
                json!({
                    "Descripcion": description,
                    "Monto": decimal(*amount, 2),
                    "Operacion": "Pagar",
                }),
            ),

            FiscalCommand::GeneralDiscount {
                description,
                amount,
                ..
            } => JsonRequest::new(
                "ImprimirPago",
                json!({
                    "Descripcion": description,
                    "Monto": decimal(*amount, 2),
                    "ModoBaseTotal": "ModoPrecioTotal",
                }),
            ),

            FiscalCommand::CloseFiscalReceipt { id, .. } => {
                JsonRequest::new(CLOSE_DOCUMENT, json!({ "Copias": "0" })).with_receipt(*id, 0)
            }

            FiscalCommand::OpenNonFiscalReceipt => {
                JsonRequest::new("AbrirDocumento", json!({ "CodigoComprobante": "Generico" }))
            }

            FiscalCommand::PrintNonFiscalText { text } => {
                return chunks(text, self.limits.non_fiscal_text(Dialect::Hasar2G))
                    .into_iter()
                    .map(|line| JsonRequest::new("ImprimirTextoGenerico", json!({ "Texto": line })))
                    .collect();
            }

            FiscalCommand::CloseNonFiscalReceipt => {
                JsonRequest::new(CLOSE_DOCUMENT, json!({ "Copias": "0" }))
            }

            FiscalCommand::OpenDrawer => JsonRequest::new("AbrirCajonDinero", json!({})),

            FiscalCommand::SetEmbarkNumber { doc_num, .. } => JsonRequest::new(
                "CargarDocumentoAsociado",
                json!({
                    "NumeroLinea": "1",
                    "NumeroComprobante": format!("{:08}", doc_num),
                }),
            ),

            FiscalCommand::OpenDnfh { kind, .. } => {
                let code = if *kind == 'R' {
                    "TiqueNotaCreditoA"
                } else {
                    "TiqueNotaCreditoB"
                };
                JsonRequest::new("AbrirDocumento", json!({ "CodigoComprobante": code }))
            }

            FiscalCommand::CloseDnfh { id, f_type, copies } => {
                let kind = if *f_type == 'R' { 1 } else { 2 };
                JsonRequest::new(CLOSE_DOCUMENT, json!({ "Copias": copies.to_string() }))
                    .with_receipt(*id, kind)
            }

            FiscalCommand::Cancel => cancel_request(),

            FiscalCommand::SetDateTime(at) => JsonRequest::new(
                "ConfigurarFechaHora",
                json!({
                    "Fecha": at.format("%y%m%d").to_string(),
                    "Hora": at.format("%H%M%S").to_string(),
                }),
            ),

            FiscalCommand::ReprintDocument {
                doc_type,
                doc_number,
            } => JsonRequest::new(
                "CopiarComprobante",
                json!({
                    "CodigoComprobante": doc_type,
                    "NumeroComprobante": doc_number.to_string(),
                }),
            ),

            other => {
                debug!("{} has no Hasar 2G form", other.name());
                return Vec::new();
            }
        };
        vec![request]
    }
}
