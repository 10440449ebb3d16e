//! Virtual JSON fiscal printer

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fiscal_engine::{MessageTransport, NetworkError};
use fiscal_protocol::hasar2g::CLOSE_DOCUMENT;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Scripted misbehaviour of the JSON device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFaults {
    /// Answer every request under a different root key
    pub wrong_root: bool,
    /// Report the cover open
    pub cover_open: bool,
    /// Report a fiscal state error
    pub fiscal_error: bool,
    /// Report a full fiscal memory
    pub memory_full: bool,
    /// Fail the next N posts with a timeout
    pub timeouts: u32,
}

#[derive(Debug, Default)]
struct State {
    posts: Vec<Value>,
    receipt_number: i64,
    faults: NetworkFaults,
}

/// Simulated Hasar 2G printer
///
/// Clones share the same device.
#[derive(Debug, Clone, Default)]
pub struct VirtualNetworkPrinter {
    state: Arc<Mutex<State>>,
}

impl VirtualNetworkPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(self, faults: NetworkFaults) -> Self {
        self.lock().faults = faults;
        self
    }

    pub fn set_faults(&self, faults: NetworkFaults) {
        self.lock().faults = faults;
    }

    /// Every request posted, in order
    pub fn posts(&self) -> Vec<Value> {
        self.lock().posts.clone()
    }

    /// Root keys of every request posted
    pub fn commands(&self) -> Vec<String> {
        self.lock()
            .posts
            .iter()
            .filter_map(|p| p.as_object().and_then(|m| m.keys().next().cloned()))
            .collect()
    }

    pub fn receipt_number(&self) -> i64 {
        self.lock().receipt_number
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn answer(state: &mut State, root: &str) -> Value {
        let faults = &state.faults;
        let mut printer = Vec::new();
        if faults.cover_open {
            printer.push("TapaAbierta");
        }
        let mut fiscal = vec!["EnJornadaFiscal"];
        if faults.fiscal_error {
            fiscal.push("ErrorEstado");
        }
        if faults.memory_full {
            fiscal.push("MemoriaFiscalLlena");
        }

        let mut params = json!({ "Estado": { "Impresora": printer, "Fiscal": fiscal } });
        if root == CLOSE_DOCUMENT {
            state.receipt_number += 1;
            params["NumeroComprobante"] = json!(state.receipt_number);
        }

        let key = if state.faults.wrong_root {
            format!("{}Respuesta", root)
        } else {
            root.to_string()
        };
        let mut reply = Map::new();
        reply.insert(key, params);
        Value::Object(reply)
    }
}

#[async_trait]
impl MessageTransport for VirtualNetworkPrinter {
    async fn post(&self, request: &Value) -> Result<Value, NetworkError> {
        let mut state = self.lock();
        state.posts.push(request.clone());

        if state.faults.timeouts > 0 {
            state.faults.timeouts -= 1;
            return Err(NetworkError::Timeout);
        }
        let Some(root) = request
            .as_object()
            .and_then(|m| m.keys().next())
            .cloned()
        else {
            return Err(NetworkError::StatusCode(400));
        };

        let reply = Self::answer(&mut state, &root);
        debug!("Replying {}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscal_protocol::hasar2g::{self, JsonRequest, Verdict};

    #[tokio::test]
    async fn test_replies_verify() {
        let printer = VirtualNetworkPrinter::new();
        let request = JsonRequest::new(CLOSE_DOCUMENT, json!({ "Copias": "0" }));
        let reply = printer.post(&request.to_value()).await.unwrap();

        assert_eq!(hasar2g::verify(&request, &reply), Verdict::Accepted);
        assert_eq!(hasar2g::receipt_number(&reply), 1);
        assert_eq!(printer.commands(), vec![CLOSE_DOCUMENT.to_string()]);
    }

    #[tokio::test]
    async fn test_faults() {
        let printer = VirtualNetworkPrinter::new().with_faults(NetworkFaults {
            wrong_root: true,
            ..Default::default()
        });
        let request = hasar2g::cancel_request();
        let reply = printer.post(&request.to_value()).await.unwrap();
        assert!(matches!(
            hasar2g::verify(&request, &reply),
            Verdict::Rejected(_)
        ));

        printer.set_faults(NetworkFaults {
            memory_full: true,
            ..Default::default()
        });
        let reply = printer.post(&request.to_value()).await.unwrap();
        assert_eq!(hasar2g::verify(&request, &reply), Verdict::MemoryFull);

        printer.set_faults(NetworkFaults {
            timeouts: 1,
            ..Default::default()
        });
        assert_eq!(
            printer.post(&request.to_value()).await,
            Err(NetworkError::Timeout)
        );
        assert!(printer.post(&request.to_value()).await.is_ok());
    }
}
