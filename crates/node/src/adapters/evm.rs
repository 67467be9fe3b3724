// Path: crates/node/src/adapters/evm.rs
//! The EVM JSON-RPC log provider.

use async_trait::async_trait;
use lightnode_api::fetcher::FetcherError;
use lightnode_watcher::{EvmLogProvider, RawLog};
use serde_json::{json, Value as Json};

fn hex_u64(v: &Json) -> Result<u64, FetcherError> {
    let s = v
        .as_str()
        .ok_or_else(|| FetcherError::Decode("expected hex quantity".to_string()))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| FetcherError::Decode(format!("bad hex quantity {s:?}: {e}")))
}

fn hex_bytes(v: &Json) -> Result<Vec<u8>, FetcherError> {
    let s = v
        .as_str()
        .ok_or_else(|| FetcherError::Decode("expected hex data".to_string()))?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| FetcherError::Decode(format!("bad hex data: {e}")))
}

fn hex_b32(v: &Json) -> Result<[u8; 32], FetcherError> {
    let bytes = hex_bytes(v)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| FetcherError::Decode(format!("want 32 bytes, got {}", bytes.len())))
}

/// An `eth_*` JSON-RPC client.
pub struct EvmRpc {
    client: reqwest::Client,
    url: String,
}

impl EvmRpc {
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
impl EvmLogProvider for EvmRpc {
    async fn latest_block_number(&self) -> Result<u64, FetcherError> {
        hex_u64(&self.call("eth_blockNumber", json!([])).await?)
    }

    async fn get_logs(
        &self,
        address: &str,
        topic0: [u8; 32],
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, FetcherError> {
        let filter = json!([{
            "address": address,
            "topics": [format!("0x{}", hex::encode(topic0))],
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
        }]);
        let result = self.call("eth_getLogs", filter).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| FetcherError::Decode("eth_getLogs did not return a list".to_string()))?;
        logs.iter()
            .map(|log| {
                let topics = log
                    .get("topics")
                    .and_then(Json::as_array)
                    .ok_or_else(|| FetcherError::Decode("log missing topics".to_string()))?
                    .iter()
                    .map(hex_b32)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RawLog {
                    address: log
                        .get("address")
                        .and_then(Json::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    topics,
                    data: hex_bytes(
                        log.get("data").unwrap_or(&Json::String("0x".to_string())),
                    )?,
                    block_number: hex_u64(log.get("blockNumber").unwrap_or(&Json::Null))?,
                    tx_hash: hex_b32(log.get("transactionHash").unwrap_or(&Json::Null))?,
                })
            })
            .collect()
    }
}
