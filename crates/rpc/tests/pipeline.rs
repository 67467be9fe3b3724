// Path: crates/rpc/tests/pipeline.rs
//! End-to-end pipeline tests: requests enter through the validator and
//! come back out of the resolver, with only the Darknode dispatcher and
//! the chain clients mocked.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_api::chain::{
    AddressCodecRegistry, AddressEncodeDecoder, ChainClientError, Utxo, UtxoClient,
};
use lightnode_api::darknode::{DarknodeCaller, DarknodeError};
use lightnode_api::storage::TxStore as _;
use lightnode_compat::store::CompatStore;
use lightnode_compat::translate::Bindings;
use lightnode_rpc::checker::Verifier;
use lightnode_rpc::jsonrpc::{methods, Request, Response, ERR_INVALID_REQUEST};
use lightnode_rpc::screener::DisabledScreener;
use lightnode_rpc::{Cacher, RateLimiter, Resolver, TxChecker, Validator};
use lightnode_storage::{MemKv, RedbTxStore};
use lightnode_types::config::LimiterConfig;
use lightnode_types::tx::Transaction;
use primitive_types::U256;
use serde_json::{json, Value as Json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

struct StaticDarknode;

#[async_trait]
impl DarknodeCaller for StaticDarknode {
    async fn call(&self, method: &str, params: Json) -> Result<Json, DarknodeError> {
        match method {
            methods::QUERY_TX => {
                Ok(json!({ "tx": { "hash": params["txHash"] }, "txStatus": "confirming" }))
            }
            _ => Ok(json!({ "method": method })),
        }
    }
}

struct FixedUtxoClient;

#[async_trait]
impl UtxoClient for FixedUtxoClient {
    async fn output(&self, _txid: &[u8], _vout: u32) -> Result<Utxo, ChainClientError> {
        Ok(Utxo { amount: U256::from(10_000u64), pubkey_script: Vec::new() })
    }
}

struct Base58Codec;

impl AddressEncodeDecoder for Base58Codec {
    fn decode_address(&self, addr: &str) -> Result<Vec<u8>, ChainClientError> {
        bs58::decode(addr).into_vec().map_err(|e| ChainClientError::AddressCodec {
            chain: "Bitcoin".to_string(),
            msg: e.to_string(),
        })
    }

    fn encode_address(&self, raw: &[u8]) -> Result<String, ChainClientError> {
        Ok(bs58::encode(raw).into_string())
    }
}

struct AcceptAll;

#[async_trait]
impl Verifier for AcceptAll {
    async fn verify(&self, _tx: &Transaction) -> Result<(), String> {
        Ok(())
    }
}

struct Pipeline {
    _dir: tempfile::TempDir,
    validator: Validator,
    resolver: Resolver,
    store: Arc<RedbTxStore>,
}

impl Pipeline {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RedbTxStore::open(dir.path().join("txs.redb")).unwrap());
        let kv = Arc::new(MemKv::new());
        let compat = Arc::new(CompatStore::new(kv, store.clone(), Duration::from_secs(3600)));

        let mut codecs = AddressCodecRegistry::new();
        codecs.register("Bitcoin", Arc::new(Base58Codec));
        let codecs = Arc::new(codecs);
        let mut bindings = Bindings::new(codecs);
        bindings.register_token(
            "BTC",
            hex::decode("0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f").unwrap().try_into().unwrap(),
        );
        bindings.register_utxo_client("Bitcoin", Arc::new(FixedUtxoClient));
        let bindings = Arc::new(bindings);

        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));
        let validator =
            Validator::new(limiter, compat.clone(), bindings.clone(), vec![2u8; 33]);

        let cacher = Cacher::new(Arc::new(StaticDarknode), Duration::from_secs(60));
        let checker = TxChecker::new(Arc::new(AcceptAll), store.clone());
        let resolver = Resolver::new(
            cacher,
            store.clone(),
            compat,
            bindings,
            checker,
            Arc::new(DisabledScreener),
        );
        Self { _dir: dir, validator, resolver, store }
    }

    async fn call(&self, method: &str, params: Json) -> Response {
        self.call_from(method, params, "192.0.2.10:4000").await
    }

    async fn call_from(&self, method: &str, params: Json, remote: &str) -> Response {
        let request = Request {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        };
        let remote: SocketAddr = remote.parse().unwrap();
        match self.validator.validate(request, Some(remote), None).await {
            Ok(validated) => self.resolver.resolve(validated).await,
            Err(error) => Response::error(json!(1), error),
        }
    }
}

fn v0_lock_params() -> Json {
    json!({ "tx": {
        "to": "BTC0Btc2Eth",
        "in": [
            {"name": "p", "type": "ext_ethCompatPayload",
             "value": {"abi": B64.encode(b"[{\"name\":\"mint\"}]"), "value": B64.encode(b"args"), "fn": B64.encode(b"mint")}},
            {"name": "token", "type": "ext_ethCompatAddress",
             "value": "0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f"},
            {"name": "to", "type": "ext_ethCompatAddress",
             "value": "7DDFA2e5435027f6e13Ca8Db2f32ebd5551158Bb"},
            {"name": "n", "type": "b32", "value": B64.encode([7u8; 32])},
            {"name": "utxo", "type": "ext_btcCompatUTXO",
             "value": {"txHash": B64.encode([9u8; 32]), "vOut": 0}}
        ]
    }})
}

#[tokio::test]
async fn v0_lock_submits_and_round_trips_through_query() {
    let pipeline = Pipeline::new();

    // Submit the legacy lock; the response carries the legacy hash.
    let response = pipeline.call(methods::SUBMIT_TX, v0_lock_params()).await;
    let result = response.result.expect("submit should succeed");
    let v0_hash = result["tx"]["hash"].as_str().expect("legacy hash").to_string();

    // One row landed in the store.
    let stored = pipeline.store.page(0, 10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].input.amount, U256::from(10_000u64));

    // Querying by the legacy hash returns the v0 shape, payload intact.
    let response = pipeline.call(methods::QUERY_TX, json!({ "txHash": v0_hash })).await;
    let result = response.result.expect("query should succeed");
    assert_eq!(result["txStatus"], "confirming");
    assert_eq!(result["tx"]["to"], "BTC0Btc2Eth");
    let args = result["tx"]["in"].as_array().unwrap();
    let payload = args.iter().find(|a| a["name"] == "p").expect("payload arg");
    assert_eq!(payload["value"]["abi"], B64.encode(b"[{\"name\":\"mint\"}]"));

    // Re-submitting the same lock is answered with the same hash.
    let response = pipeline.call(methods::SUBMIT_TX, v0_lock_params()).await;
    assert_eq!(response.result.unwrap()["tx"]["hash"].as_str().unwrap(), v0_hash);
    assert_eq!(pipeline.store.page(0, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn per_ip_rate_limit_caps_a_volley() {
    let pipeline = Pipeline::new();
    let mut accepted = 0;
    let mut last_error = None;
    for _ in 0..30 {
        let response = pipeline.call(methods::QUERY_TXS, json!({})).await;
        match response.error {
            None => accepted += 1,
            Some(error) => last_error = Some(error),
        }
    }
    assert_eq!(accepted, 10);
    let error = last_error.expect("volley should trip the limiter");
    assert_eq!(error.code, ERR_INVALID_REQUEST);
    assert_eq!(error.message, "rate limit exceeded for 192.0.2.10");

    // A different client is unaffected.
    let response = pipeline.call_from(methods::QUERY_TXS, json!({}), "192.0.2.11:4000").await;
    assert!(response.error.is_none());
}

#[tokio::test]
async fn unknown_methods_are_refused() {
    let pipeline = Pipeline::new();
    let response = pipeline.call("ren_queryMagic", json!({})).await;
    assert_eq!(response.error.unwrap().code, lightnode_rpc::jsonrpc::ERR_METHOD_NOT_FOUND);
}

#[tokio::test]
async fn malformed_submissions_are_invalid_params() {
    let pipeline = Pipeline::new();
    let response = pipeline.call(methods::SUBMIT_TX, json!({ "tx": { "nonsense": true } })).await;
    assert_eq!(
        response.error.unwrap().code,
        lightnode_rpc::jsonrpc::ERR_INVALID_PARAMS
    );
}

#[tokio::test]
async fn standard_queries_reach_the_darknodes() {
    let pipeline = Pipeline::new();
    let response = pipeline.call(methods::QUERY_BLOCK, json!({})).await;
    assert_eq!(response.result.unwrap()["method"], methods::QUERY_BLOCK);
}
