// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Clients for the Lambda Extensions API and Telemetry API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::http_utils::build_client;

pub const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
pub const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";
const EXTENSION_ROUTE: &str = "2020-01-01/extension";
const TELEMETRY_ROUTE: &str = "2022-07-01/telemetry";
const TELEMETRY_SCHEMA_VERSION: &str = "2022-07-01";
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("request to runtime API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("runtime API answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Register response did not carry an extension identifier")]
    MissingExtensionId,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Identity assigned by the Extensions API on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionId(pub String);

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "eventType")]
pub enum NextEvent {
    #[serde(rename = "INVOKE")]
    Invoke {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "deadlineMs")]
        deadline_ms: u64,
        #[serde(rename = "invokedFunctionArn", default)]
        invoked_function_arn: String,
    },
    #[serde(rename = "SHUTDOWN")]
    Shutdown {
        #[serde(rename = "shutdownReason")]
        shutdown_reason: String,
        #[serde(rename = "deadlineMs")]
        deadline_ms: u64,
    },
}

/// Lifecycle side of the Extensions API.
#[async_trait]
pub trait ExtensionApi {
    async fn register(&self, name: &str) -> Result<ExtensionId, ExtensionError>;
    /// Blocks until the runtime hands out the next lifecycle event.
    async fn next_event(&self, id: &ExtensionId) -> Result<NextEvent, ExtensionError>;
}

#[async_trait]
pub trait TelemetrySubscriber {
    async fn subscribe(&self, id: &ExtensionId, receiver_uri: &str) -> Result<(), ExtensionError>;
}

/// How the Telemetry API batches events before pushing them to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferingConfig {
    pub max_items: u32,
    pub max_bytes: u32,
    pub timeout_ms: u32,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            max_items: 1000,
            max_bytes: 256 * 1024,
            timeout_ms: 1000,
        }
    }
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, ExtensionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ExtensionError::Status { status, body })
}

#[derive(Debug, Clone)]
pub struct ExtensionApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExtensionApiClient {
    /// `runtime_api` is the `host:port` from `AWS_LAMBDA_RUNTIME_API`.
    pub fn new(runtime_api: &str) -> Result<Self, ExtensionError> {
        // No timeout: polling for the next event legitimately blocks for as
        // long as the sandbox stays frozen.
        let client = build_client(None, None).map_err(|e| ExtensionError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("http://{runtime_api}/{EXTENSION_ROUTE}"),
        })
    }
}

#[async_trait]
impl ExtensionApi for ExtensionApiClient {
    async fn register(&self, name: &str) -> Result<ExtensionId, ExtensionError> {
        let resp = self
            .client
            .post(format!("{}/register", self.base_url))
            .header(EXTENSION_NAME_HEADER, name)
            .json(&json!({ "events": ["INVOKE", "SHUTDOWN"] }))
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let id = resp
            .headers()
            .get(EXTENSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(ExtensionError::MissingExtensionId)?;
        Ok(ExtensionId(id.to_string()))
    }

    async fn next_event(&self, id: &ExtensionId) -> Result<NextEvent, ExtensionError> {
        let resp = self
            .client
            .get(format!("{}/event/next", self.base_url))
            .header(EXTENSION_ID_HEADER, &id.0)
            .send()
            .await?;
        let event = error_for_status(resp).await?.json::<NextEvent>().await?;
        debug!("Received lifecycle event {event:?}");
        Ok(event)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryApiClient {
    client: reqwest::Client,
    url: String,
    buffering: BufferingConfig,
}

impl TelemetryApiClient {
    pub fn new(runtime_api: &str, buffering: BufferingConfig) -> Result<Self, ExtensionError> {
        let client = build_client(None, Some(SUBSCRIBE_TIMEOUT))
            .map_err(|e| ExtensionError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("http://{runtime_api}/{TELEMETRY_ROUTE}"),
            buffering,
        })
    }

    fn subscription_body(&self, receiver_uri: &str) -> serde_json::Value {
        json!({
            "schemaVersion": TELEMETRY_SCHEMA_VERSION,
            "types": ["platform", "function"],
            "buffering": self.buffering,
            "destination": {
                "protocol": "HTTP",
                "URI": receiver_uri,
            },
        })
    }
}

#[async_trait]
impl TelemetrySubscriber for TelemetryApiClient {
    async fn subscribe(&self, id: &ExtensionId, receiver_uri: &str) -> Result<(), ExtensionError> {
        let resp = self
            .client
            .put(&self.url)
            .header(EXTENSION_ID_HEADER, &id.0)
            .json(&self.subscription_body(receiver_uri))
            .send()
            .await?;
        error_for_status(resp).await?;
        Ok(())
    }
}
