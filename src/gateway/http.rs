//! HTTP transport: `POST <endpoint>` with a JSON `{"command": ...}` body

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{CommandGateway, GatewayError};

#[derive(Clone)]
pub struct HttpGateway {
    endpoint: String,
    client: Client,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CommandGateway for HttpGateway {
    async fn send(&self, command: &str) -> Result<Value, GatewayError> {
        debug!(command, "player request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&json!({ "command": command }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let data: Value = serde_json::from_slice(&body)?;

        debug!(command, response = %data, "player response");
        Ok(data)
    }
}
