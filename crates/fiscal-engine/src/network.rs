//! HTTP transport for the JSON dialect

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::NetworkError;
use crate::transport::MessageTransport;

/// Posts JSON documents to the printer's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Create a transport for `url`, bounding each round trip by `timeout`
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    async fn post(&self, request: &Value) -> Result<Value, NetworkError> {
        debug!("POST {} {}", self.url, request);
        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::StatusCode(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("Reply {}", body);
        let reply: Value =
            serde_json::from_str(&body).map_err(|e| NetworkError::Parse(e.to_string()))?;
        if !reply.is_object() {
            return Err(NetworkError::Parse("reply is not an object".into()));
        }
        Ok(reply)
    }
}
