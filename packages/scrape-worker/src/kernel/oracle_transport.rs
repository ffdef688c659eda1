//! Reqwest-backed `OracleTransport`: posts the truncated HTML and lowered
//! schema to the configured extraction-oracle endpoint and parses its JSON
//! response into `OracleRawResponse` (spec §4.10).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use scrape_core::error::OracleError;
use scrape_core::oracle::{OracleRawResponse, OracleTransport, SchemaDescription};

#[derive(Serialize)]
struct OracleRequest<'a> {
    html: &'a str,
    schema: &'a SchemaDescription,
}

pub struct HttpOracleTransport {
    client: Client,
    endpoint: String,
}

impl HttpOracleTransport {
    pub fn new(endpoint: String, timeout_ms: u64) -> Self {
        let client = Client::builder().timeout(Duration::from_millis(timeout_ms)).build().unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl OracleTransport for HttpOracleTransport {
    async fn call(&self, html: &str, schema: &SchemaDescription) -> Result<OracleRawResponse, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&OracleRequest { html, schema })
            .send()
            .await
            .map_err(|e| OracleError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Failed(format!("status {}", response.status())));
        }

        response.json::<OracleRawResponse>().await.map_err(|_| OracleError::ValidationFailed)
    }
}

/// Used when no `ORACLE_ENDPOINT` is configured: every call reports the
/// oracle as unavailable so the caller falls back to local selector
/// inference instead of trying a network call that can't succeed.
pub struct UnavailableOracleTransport;

#[async_trait]
impl OracleTransport for UnavailableOracleTransport {
    async fn call(&self, _html: &str, _schema: &SchemaDescription) -> Result<OracleRawResponse, OracleError> {
        Err(OracleError::Unavailable)
    }
}
