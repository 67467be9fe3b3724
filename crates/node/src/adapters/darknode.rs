// Path: crates/node/src/adapters/darknode.rs
//! The HTTP Darknode dispatcher: round-robin over the bootstrap set with
//! bounded retry on transient failures.

use async_trait::async_trait;
use lightnode_api::darknode::{DarknodeCaller, DarknodeError};
use serde_json::{json, Value as Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{sleep, Duration};

const HTTP_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 100;

fn retry_delay(attempt: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << attempt).min(2_000))
}

/// Round-robin JSON-RPC client over the configured Darknode endpoints.
pub struct HttpDarknodeCaller {
    client: reqwest::Client,
    endpoints: Vec<String>,
    next: AtomicUsize,
}

impl HttpDarknodeCaller {
    /// Builds a caller over the bootstrap endpoints.
    pub fn new(endpoints: Vec<String>) -> Result<Self, DarknodeError> {
        if endpoints.is_empty() {
            return Err(DarknodeError::Transport("no darknode endpoints configured".into()));
        }
        Ok(Self { client: reqwest::Client::new(), endpoints, next: AtomicUsize::new(0) })
    }

    fn pick(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        &self.endpoints[i % self.endpoints.len()]
    }
}

#[async_trait]
impl DarknodeCaller for HttpDarknodeCaller {
    async fn call(&self, method: &str, params: Json) -> Result<Json, DarknodeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut attempt = 0;
        loop {
            let url = self.pick();
            let response = match self.client.post(url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt < HTTP_RETRIES {
                        tracing::debug!(
                            target: "darknode",
                            attempt,
                            error = %e,
                            "send failed, retrying on the next peer"
                        );
                        sleep(retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DarknodeError::Transport(e.to_string()));
                }
            };
            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                if attempt < HTTP_RETRIES {
                    sleep(retry_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(DarknodeError::Transport(format!("HTTP {}", status.as_u16())));
            }
            let payload: Json = response
                .json()
                .await
                .map_err(|e| DarknodeError::Transport(e.to_string()))?;
            if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
                return Err(DarknodeError::Remote {
                    code: error.get("code").and_then(Json::as_i64).unwrap_or(-32603),
                    message: error
                        .get("message")
                        .and_then(Json::as_str)
                        .unwrap_or("unknown darknode error")
                        .to_string(),
                });
            }
            return Ok(payload.get("result").cloned().unwrap_or(Json::Null));
        }
    }
}
