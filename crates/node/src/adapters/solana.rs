// Path: crates/node/src/adapters/solana.rs
//! The Solana JSON-RPC provider.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_api::fetcher::FetcherError;
use lightnode_watcher::SolanaRpcProvider;
use serde_json::{json, Value as Json};

/// A Solana JSON-RPC client.
pub struct SolanaRpc {
    client: reqwest::Client,
    url: String,
}

impl SolanaRpc {
    /// Builds a client against `url`.
    pub fn new(url: &str) -> Self {
        Self { client: reqwest::Client::new(), url: url.to_string() }
    }

    async fn call(&self, method: &str, params: Json) -> Result<Json, FetcherError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetcherError::Rpc(e.to_string()))?;
        let payload: Json =
            response.json().await.map_err(|e| FetcherError::Rpc(e.to_string()))?;
        if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
            return Err(FetcherError::Rpc(error.to_string()));
        }
        Ok(payload.get("result").cloned().unwrap_or(Json::Null))
    }
}

#[async_trait]
impl SolanaRpcProvider for SolanaRpc {
    async fn get_account_data(&self, address: &str) -> Result<Option<Vec<u8>>, FetcherError> {
        let result = self
            .call("getAccountInfo", json!([address, { "encoding": "base64" }]))
            .await?;
        let value = result.get("value");
        match value {
            None | Some(Json::Null) => Ok(None),
            Some(value) => {
                let encoded = value
                    .pointer("/data/0")
                    .and_then(Json::as_str)
                    .ok_or_else(|| {
                        FetcherError::Decode("account data missing base64 payload".to_string())
                    })?;
                Ok(Some(B64.decode(encoded).map_err(|e| {
                    FetcherError::Decode(format!("account data is not base64: {e}"))
                })?))
            }
        }
    }

    async fn earliest_signature_for(
        &self,
        address: &str,
    ) -> Result<Option<String>, FetcherError> {
        let result = self
            .call("getSignaturesForAddress", json!([address, { "limit": 1000 }]))
            .await?;
        let list = result
            .as_array()
            .ok_or_else(|| FetcherError::Decode("expected signature list".to_string()))?;
        // The API returns newest first; the creation signature is last.
        Ok(list
            .last()
            .and_then(|entry| entry.get("signature"))
            .and_then(Json::as_str)
            .map(str::to_string))
    }
}
