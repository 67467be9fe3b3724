// Path: crates/node/src/adapters/utxo.rs
//! The bitcoind-family UTXO client.

use async_trait::async_trait;
use lightnode_api::chain::{ChainClientError, Utxo, UtxoClient};
use primitive_types::U256;
use serde_json::{json, Value as Json};

/// A JSON-RPC client for bitcoind-compatible nodes (`gettxout`).
pub struct BitcoindClient {
    client: reqwest::Client,
    url: String,
}

impl BitcoindClient {
    /// Builds a client against `url` (credentials in the URL, as bitcoind
    /// setups conventionally do).
    pub fn new(url: &str) -> Self {
        Self { client: reqwest::Client::new(), url: url.to_string() }
    }

    async fn call(&self, method: &str, params: Json) -> Result<Json, ChainClientError> {
        let body = json!({ "jsonrpc": "1.0", "id": "lightnode", "method": method, "params": params });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainClientError::Rpc(e.to_string()))?;
        let payload: Json =
            response.json().await.map_err(|e| ChainClientError::Rpc(e.to_string()))?;
        if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
            return Err(ChainClientError::Rpc(error.to_string()));
        }
        Ok(payload.get("result").cloned().unwrap_or(Json::Null))
    }
}

#[async_trait]
impl UtxoClient for BitcoindClient {
    async fn output(&self, txid: &[u8], vout: u32) -> Result<Utxo, ChainClientError> {
        // bitcoind spells txids in display order, byte-reversed relative
        // to the canonical order we carry.
        let display: Vec<u8> = txid.iter().rev().copied().collect();
        let result = self
            .call("gettxout", json!([hex::encode(&display), vout, true]))
            .await?;
        if result.is_null() {
            return Err(ChainClientError::OutputNotFound { txid: txid.to_vec(), vout });
        }
        let btc = result
            .get("value")
            .and_then(Json::as_f64)
            .ok_or_else(|| ChainClientError::Rpc("gettxout missing value".to_string()))?;
        // Satoshi conversion; the float has at most 8 decimal places.
        let sats = (btc * 1e8).round() as u64;
        let script_hex = result
            .pointer("/scriptPubKey/hex")
            .and_then(Json::as_str)
            .unwrap_or_default();
        let pubkey_script = hex::decode(script_hex)
            .map_err(|e| ChainClientError::Rpc(format!("bad scriptPubKey hex: {e}")))?;
        Ok(Utxo { amount: U256::from(sats), pubkey_script })
    }
}
