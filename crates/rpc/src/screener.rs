// Path: crates/rpc/src/screener.rs
//! The sanctions screener client.

use async_trait::async_trait;
use lightnode_api::screener::{Screener, ScreenerError};
use serde::Deserialize;
use serde_json::json;

/// A screener that never blocks anything. Used when no screening endpoint
/// is configured.
pub struct DisabledScreener;

#[async_trait]
impl Screener for DisabledScreener {
    async fn is_sanctioned(&self, _address: &str) -> Result<bool, ScreenerError> {
        Ok(false)
    }
}

/// The HTTP screener. POSTs `[{"address": …}]` and expects HTTP 201 with
/// exactly one row answering for that address; any other shape is an
/// error, which the caller treats as a refusal to pass judgement, not a
/// clean result.
pub struct HttpScreener {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ScreeningRow {
    address: String,
    #[serde(rename = "isSanctioned")]
    is_sanctioned: bool,
}

impl HttpScreener {
    /// Builds a screener against `url`, optionally authenticated.
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), url, api_key }
    }
}

#[async_trait]
impl Screener for HttpScreener {
    async fn is_sanctioned(&self, address: &str) -> Result<bool, ScreenerError> {
        let mut request = self.client.post(&self.url).json(&json!([{ "address": address }]));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }
        let response =
            request.send().await.map_err(|e| ScreenerError::Transport(e.to_string()))?;
        let status = response.status();
        if status.as_u16() != 201 {
            return Err(ScreenerError::UnexpectedResponse(format!("HTTP {}", status.as_u16())));
        }
        let rows: Vec<ScreeningRow> =
            response.json().await.map_err(|e| ScreenerError::UnexpectedResponse(e.to_string()))?;
        let mut matching = rows.iter().filter(|r| r.address.eq_ignore_ascii_case(address));
        match (matching.next(), matching.next()) {
            (Some(row), None) => Ok(row.is_sanctioned),
            _ => Err(ScreenerError::UnexpectedResponse(format!(
                "expected exactly one row for the queried address, got {}",
                rows.len()
            ))),
        }
    }
}
