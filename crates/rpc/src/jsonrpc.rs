// Path: crates/rpc/src/jsonrpc.rs
//! JSON-RPC 2.0 framing and the gateway's method table.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The request was malformed, rate-limited, or named an unknown peer.
pub const ERR_INVALID_REQUEST: i64 = -32600;
/// The method is not part of the gateway surface.
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
/// The params failed schema or semantic validation.
pub const ERR_INVALID_PARAMS: i64 = -32602;
/// Back-pressure overflow, timeouts, or store failures.
pub const ERR_INTERNAL: i64 = -32603;

/// Method names, as the wire spells them.
pub mod methods {
    /// Query a single block.
    pub const QUERY_BLOCK: &str = "ren_queryBlock";
    /// Query a range of blocks.
    pub const QUERY_BLOCKS: &str = "ren_queryBlocks";
    /// Submit a transaction.
    pub const SUBMIT_TX: &str = "ren_submitTx";
    /// Query a transaction by hash.
    pub const QUERY_TX: &str = "ren_queryTx";
    /// Query the peer multi-addresses.
    pub const QUERY_PEERS: &str = "ren_queryPeers";
    /// Query the number of peers.
    pub const QUERY_NUM_PEERS: &str = "ren_queryNumPeers";
    /// Legacy-only: query the shard layout.
    pub const QUERY_SHARDS: &str = "ren_queryShards";
    /// Query node statistics.
    pub const QUERY_STAT: &str = "ren_queryStat";
    /// Legacy-only: query minting and burning fees.
    pub const QUERY_FEES: &str = "ren_queryFees";
    /// Query the node configuration.
    pub const QUERY_CONFIG: &str = "ren_queryConfig";
    /// Query the system state.
    pub const QUERY_STATE: &str = "ren_queryState";
    /// Query the state at a block.
    pub const QUERY_BLOCK_STATE: &str = "ren_queryBlockState";
    /// Query locally persisted transactions.
    pub const QUERY_TXS: &str = "ren_queryTxs";
    /// Less-common extension: query a gateway.
    pub const QUERY_GATEWAY: &str = "ren_queryGateway";
    /// Less-common extension: query a transaction by underlying txid.
    pub const QUERY_TX_BY_TXID: &str = "ren_queryTxByTxid";
    /// Less-common extension: submit a gateway.
    pub const SUBMIT_GATEWAY: &str = "ren_submitGateway";
}

/// Every method the gateway accepts.
pub const SUPPORTED_METHODS: [&str; 16] = [
    methods::QUERY_BLOCK,
    methods::QUERY_BLOCKS,
    methods::SUBMIT_TX,
    methods::QUERY_TX,
    methods::QUERY_PEERS,
    methods::QUERY_NUM_PEERS,
    methods::QUERY_SHARDS,
    methods::QUERY_STAT,
    methods::QUERY_FEES,
    methods::QUERY_CONFIG,
    methods::QUERY_STATE,
    methods::QUERY_BLOCK_STATE,
    methods::QUERY_TXS,
    methods::QUERY_GATEWAY,
    methods::QUERY_TX_BY_TXID,
    methods::SUBMIT_GATEWAY,
];

/// True when the gateway recognises `method`.
pub fn is_supported(method: &str) -> bool {
    SUPPORTED_METHODS.contains(&method)
}

/// An incoming JSON-RPC request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The request id, echoed back verbatim.
    pub id: Json,
    /// The method name.
    pub method: String,
    /// The method params; defaults to an empty object.
    #[serde(default)]
    pub params: Json,
}

/// A JSON-RPC error object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error code.
    pub code: i64,
    /// The human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
}

impl ErrorObject {
    /// Builds an error object with no data payload.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// An `InvalidRequest` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ERR_INVALID_REQUEST, message)
    }

    /// An `InvalidParams` error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ERR_INVALID_PARAMS, message)
    }

    /// An `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ERR_INTERNAL, message)
    }
}

/// An outgoing JSON-RPC response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The request id this responds to.
    pub id: Json,
    /// The result payload, when the call succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    /// The error object, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// A successful response.
    pub fn ok(id: Json, result: Json) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    /// A failed response.
    pub fn error(id: Json, error: ErrorObject) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }
}

/// Serializes a JSON value with object keys sorted recursively, so
/// logically equal params always produce the same cache key.
pub fn canonical_json_bytes(v: &Json) -> Vec<u8> {
    fn write(v: &Json, out: &mut Vec<u8>) {
        match v {
            Json::Object(map) => {
                out.push(b'{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend_from_slice(
                        serde_json::to_string(key).unwrap_or_default().as_bytes(),
                    );
                    out.push(b':');
                    write(&map[key.as_str()], out);
                }
                out.push(b'}');
            }
            Json::Array(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    write(item, out);
                }
                out.push(b']');
            }
            other => {
                out.extend_from_slice(serde_json::to_string(other).unwrap_or_default().as_bytes());
            }
        }
    }
    let mut out = Vec::with_capacity(128);
    write(v, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_sort_keys_recursively() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(canonical_json_bytes(&a), canonical_json_bytes(&b));
        assert_eq!(
            String::from_utf8(canonical_json_bytes(&a)).unwrap(),
            r#"{"a":{"x":3,"y":2},"b":1}"#
        );
    }

    #[test]
    fn response_serializes_result_xor_error() {
        let ok = Response::ok(json!(1), json!({}));
        let s = serde_json::to_string(&ok).unwrap();
        assert!(s.contains("result") && !s.contains("error"));

        let err = Response::error(json!(1), ErrorObject::invalid_request("nope"));
        let s = serde_json::to_string(&err).unwrap();
        assert!(s.contains("error") && !s.contains("result"));
        assert!(s.contains("-32600"));
    }

    #[test]
    fn method_table_is_complete() {
        assert!(is_supported("ren_queryTx"));
        assert!(is_supported("ren_queryShards"));
        assert!(is_supported("ren_submitGateway"));
        assert!(!is_supported("ren_mintMoney"));
    }
}
