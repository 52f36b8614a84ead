// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::error::Error;
use std::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::http_utils::build_client;
use crate::parser::LogResource;
use crate::signer::Signer;

pub const LOG_EVENT_PATH: &str = "/core/log/LogEvent";
const API_VERSION: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request to logging service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("logging service answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to sign request: {0}")]
    Signing(#[from] reqwest::header::InvalidHeaderValue),
}

/// Destination for parsed log resources. A failure covers the whole slice.
#[async_trait]
pub trait LogStore {
    async fn store_resources(&self, resources: &[LogResource]) -> Result<(), StoreError>;
}

#[derive(Serialize)]
struct BundleEntry<'a> {
    resource: &'a LogResource,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Bundle<'a> {
    resource_type: &'static str,
    #[serde(rename = "type")]
    bundle_type: &'static str,
    total: usize,
    product_key: &'a str,
    entry: Vec<BundleEntry<'a>>,
}

/// Client for the HSP logging service ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HspLoggingClient {
    client: reqwest::Client,
    url: String,
    product_key: String,
    signer: Signer,
}

impl HspLoggingClient {
    pub fn new(config: &Config) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let client = build_client(config.https_proxy.as_deref(), Some(config.flush_timeout))?;
        Ok(Self {
            client,
            url: format!("{}{LOG_EVENT_PATH}", config.logging_base_url),
            product_key: config.product_key.clone(),
            signer: Signer::new(config.shared_key.clone(), config.shared_secret.clone()),
        })
    }
}

#[async_trait]
impl LogStore for HspLoggingClient {
    async fn store_resources(&self, resources: &[LogResource]) -> Result<(), StoreError> {
        if resources.is_empty() {
            return Ok(());
        }

        let bundle = Bundle {
            resource_type: "Bundle",
            bundle_type: "transaction",
            total: resources.len(),
            product_key: &self.product_key,
            entry: resources
                .iter()
                .map(|resource| BundleEntry { resource })
                .collect(),
        };

        let time = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .headers(self.signer.headers()?)
            .header("Api-Version", API_VERSION)
            .json(&bundle)
            .send()
            .await?;

        let status = resp.status();
        debug!(
            "Logging service answered {status} for {} resources in {} ms",
            resources.len(),
            time.elapsed().as_millis()
        );
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status { status, body })
    }
}
