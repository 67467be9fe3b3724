// Path: crates/rpc/src/validator.rs
//! Request validation: client identification, rate limiting, v0→v1
//! rewriting, and schema checks, in that order, for every request.

use crate::jsonrpc::{self, ErrorObject, Request};
use crate::limiter::RateLimiter;
use lightnode_compat::hash::contract_is_lock;
use lightnode_compat::store::CompatStore;
use lightnode_compat::translate::{v0_burn_hash, v0_lock_to_v1, Bindings};
use lightnode_compat::v0::V0Tx;
use lightnode_types::selector::Selector;
use lightnode_types::tx::{Transaction, TxHash, Version};
use primitive_types::U256;
use serde_json::{json, Value as Json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// How a submit request should be handled downstream.
#[derive(Debug)]
pub enum SubmitKind {
    /// A full v1 transaction, possibly translated from a v0 lock.
    V1 {
        /// The (possibly rewritten) transaction.
        tx: Transaction,
        /// The legacy hash to echo back when the submission arrived in v0
        /// shape.
        v0_hash: Option<[u8; 32]>,
    },
    /// A legacy v0 burn. Deliberately bypasses deep validation: the
    /// watcher is the source of truth for burns, this submission only
    /// teaches the client its v0 hash.
    LegacyBurn {
        /// The burn selector (`<ASSET>/fromEthereum`).
        selector: Selector,
        /// The burn ref.
        burn_ref: U256,
        /// The v0 burn hash.
        v0_hash: [u8; 32],
    },
}

/// A request that passed validation, with any rewriting applied.
#[derive(Debug)]
pub enum Validated {
    /// Forwarded as-is.
    Standard(Request),
    /// A transaction query, hash parsed and params rewritten to v1 shape.
    QueryTx {
        /// The rewritten request.
        request: Request,
        /// The queried hash (may be a v0 hash; the resolver maps it).
        hash: TxHash,
    },
    /// A transaction submission.
    SubmitTx {
        /// The rewritten request.
        request: Request,
        /// The submit flavour.
        kind: SubmitKind,
    },
}

/// The entry point for every request.
pub struct Validator {
    limiter: Arc<RateLimiter>,
    compat: Arc<CompatStore>,
    bindings: Arc<Bindings>,
    gpubkey: Vec<u8>,
}

impl Validator {
    /// Builds a validator over the shared limiter, compat store, chain
    /// bindings, and the active shard public key.
    pub fn new(
        limiter: Arc<RateLimiter>,
        compat: Arc<CompatStore>,
        bindings: Arc<Bindings>,
        gpubkey: Vec<u8>,
    ) -> Self {
        Self { limiter, compat, bindings, gpubkey }
    }

    /// Validates a request, returning the rewritten form or a well-formed
    /// JSON-RPC error. Never panics.
    pub async fn validate(
        &self,
        mut request: Request,
        remote_addr: Option<SocketAddr>,
        forwarded_for: Option<&str>,
    ) -> Result<Validated, ErrorObject> {
        let ip = client_ip(forwarded_for, remote_addr)?;
        if !self.limiter.allow(&request.method, ip) {
            return Err(ErrorObject::invalid_request(format!("rate limit exceeded for {ip}")));
        }
        if !jsonrpc::is_supported(&request.method) {
            return Err(ErrorObject::new(
                jsonrpc::ERR_METHOD_NOT_FOUND,
                format!("unsupported method {:?}", request.method),
            ));
        }

        match request.method.as_str() {
            jsonrpc::methods::QUERY_TX => {
                let hash = parse_query_tx(&request.params)?;
                // Rewrite to the v1 shape regardless of which alphabet the
                // hash arrived in.
                request.params = json!({ "txHash": hash.to_string() });
                validate_schema(&request)?;
                Ok(Validated::QueryTx { request, hash })
            }
            jsonrpc::methods::SUBMIT_TX => self.validate_submit(request).await,
            _ => {
                validate_schema(&request)?;
                Ok(Validated::Standard(request))
            }
        }
    }

    async fn validate_submit(&self, mut request: Request) -> Result<Validated, ErrorObject> {
        let tx_json = request
            .params
            .get("tx")
            .cloned()
            .ok_or_else(|| ErrorObject::invalid_params("missing tx"))?;

        // Legacy SDKs submit burns in v1 shape before the watcher has seen
        // the event: an all-zero hash plus a "v0hash" input field. Answer
        // with the v0 hash, never forwarding.
        if let Some(kind) = legacy_zero_hash_burn(&tx_json)? {
            return Ok(Validated::SubmitTx { request, kind });
        }

        if tx_json.get("selector").is_some() {
            // Native v1 shape.
            let mut tx = Transaction::from_json(&tx_json)
                .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
            if tx.version == Version::V1 && tx.selector.is_burn() && !tx.input.gpubkey.is_empty() {
                // Old SDKs still attach a gpubkey to burns; strip it and
                // re-derive the gateway hash against the active shard.
                tx = self.strip_gpubkey(tx)?;
            }
            tx.input
                .check_derived_hashes()
                .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
            request.params = json!({ "tx": tx.to_json() });
            validate_schema(&request)?;
            if tx.selector.is_burn() {
                // Keep the v0 view of this burn queryable.
                if let Err(e) = self.compat.persist_v0_burn_from_v1(&tx) {
                    return Err(ErrorObject::internal(e.to_string()));
                }
            }
            return Ok(Validated::SubmitTx { request, kind: SubmitKind::V1 { tx, v0_hash: None } });
        }

        if tx_json.get("to").is_some() {
            // Legacy v0 shape.
            let mut v0tx = V0Tx::from_json(&tx_json)
                .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
            if contract_is_lock(&v0tx.to) {
                let tx = v0_lock_to_v1(
                    &mut v0tx,
                    &self.bindings,
                    self.gpubkey.clone(),
                    &self.compat,
                )
                .await
                .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
                request.params = json!({ "tx": tx.to_json() });
                validate_schema(&request)?;
                return Ok(Validated::SubmitTx {
                    request,
                    kind: SubmitKind::V1 { tx, v0_hash: Some(v0tx.hash) },
                });
            }
            // v0 burn: short-circuit with the ref-derived hash and skip the
            // schema validator.
            let (selector, burn_ref, v0_hash) =
                v0_burn_hash(&v0tx).map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
            return Ok(Validated::SubmitTx {
                request,
                kind: SubmitKind::LegacyBurn { selector, burn_ref, v0_hash },
            });
        }

        Err(ErrorObject::invalid_params("tx is neither v1 nor v0 shaped"))
    }

    fn strip_gpubkey(&self, tx: Transaction) -> Result<Transaction, ErrorObject> {
        let mut input = tx.input.clone();
        input.gpubkey = Vec::new();
        // Re-derive ghash with the v1 recipe when the destination address
        // decodes; otherwise keep the submitted value (some release chains
        // have no codec registered on this node).
        match self.bindings.codecs.decode(tx.selector.destination(), &input.to) {
            Ok(raw) => {
                input.ghash =
                    lightnode_types::hash::ghash(&tx.selector, &input.phash, &raw, &input.nonce);
            }
            Err(e) => {
                tracing::debug!(target: "validator", error = %e, "gpubkey strip kept submitted ghash");
            }
        }
        Transaction::new(tx.version, tx.selector, input)
            .map_err(|e| ErrorObject::invalid_params(e.to_string()))
    }
}

/// Detects the legacy burn-before-watcher shape: a v1-framed submission
/// whose hash is absent or all zeros and whose input carries a `v0hash`.
fn legacy_zero_hash_burn(tx_json: &Json) -> Result<Option<SubmitKind>, ErrorObject> {
    let v0hash_json = match tx_json.pointer("/in/v0hash") {
        Some(v) => v,
        None => return Ok(None),
    };
    let zero_hash = match tx_json.get("hash").and_then(Json::as_str) {
        None => true,
        Some(s) => TxHash::from_b64(s).map(|h| h.is_zero()).unwrap_or(false),
    };
    if !zero_hash {
        return Ok(None);
    }
    let selector_str = tx_json
        .get("selector")
        .and_then(Json::as_str)
        .ok_or_else(|| ErrorObject::invalid_params("missing selector"))?;
    let selector = Selector::new(selector_str)
        .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
    if !selector.is_burn() {
        return Err(ErrorObject::invalid_params("v0hash is only valid on burns"));
    }
    let v0_hash_str = v0hash_json
        .as_str()
        .ok_or_else(|| ErrorObject::invalid_params("v0hash must be a string"))?;
    let v0_hash = TxHash::from_b64(v0_hash_str)
        .map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
    let burn_ref = tx_json
        .pointer("/in/nonce")
        .and_then(Json::as_str)
        .and_then(|s| lightnode_types::value::decode_b64_flexible(s).ok())
        .map(|bytes| U256::from_big_endian(&bytes))
        .unwrap_or_else(U256::zero);
    Ok(Some(SubmitKind::LegacyBurn { selector, burn_ref, v0_hash: v0_hash.0 }))
}

/// Determines the client IP: the last non-empty, trimmed element of
/// `X-Forwarded-For` wins; the socket address is the fallback.
fn client_ip(
    forwarded_for: Option<&str>,
    remote_addr: Option<SocketAddr>,
) -> Result<IpAddr, ErrorObject> {
    if let Some(header) = forwarded_for {
        if let Some(candidate) = header.split(',').map(str::trim).filter(|s| !s.is_empty()).last()
        {
            if let Ok(ip) = candidate.parse::<IpAddr>() {
                return Ok(ip);
            }
            // Some proxies forward host:port.
            if let Ok(sock) = candidate.parse::<SocketAddr>() {
                return Ok(sock.ip());
            }
            return Err(ErrorObject::invalid_request(format!(
                "invalid client address in forwarded header {header:?}"
            )));
        }
    }
    match remote_addr {
        Some(addr) => Ok(addr.ip()),
        None => Err(ErrorObject::invalid_request(format!(
            "unable to determine client address from forwarded header {:?}",
            forwarded_for.unwrap_or("")
        ))),
    }
}

fn parse_query_tx(params: &Json) -> Result<TxHash, ErrorObject> {
    let s = params
        .get("txHash")
        .and_then(Json::as_str)
        .ok_or_else(|| ErrorObject::invalid_params("missing txHash"))?;
    TxHash::from_b64(s).map_err(|e| ErrorObject::invalid_params(e.to_string()))
}

/// The generic per-method schema validator applied after rewriting.
fn validate_schema(request: &Request) -> Result<(), ErrorObject> {
    use jsonrpc::methods as m;
    let params = &request.params;
    let need_object = || -> Result<(), ErrorObject> {
        if params.is_object() || params.is_null() {
            Ok(())
        } else {
            Err(ErrorObject::invalid_params("params must be an object"))
        }
    };
    match request.method.as_str() {
        m::QUERY_TX => {
            parse_query_tx(params)?;
        }
        m::SUBMIT_TX => {
            let tx = params
                .get("tx")
                .ok_or_else(|| ErrorObject::invalid_params("missing tx"))?;
            Transaction::from_json(tx).map_err(|e| ErrorObject::invalid_params(e.to_string()))?;
        }
        m::QUERY_BLOCK => {
            need_object()?;
            if let Some(height) = params.get("blockHeight") {
                if !height.is_u64() && !height.is_string() {
                    return Err(ErrorObject::invalid_params("blockHeight must be a number"));
                }
            }
        }
        m::QUERY_TXS => {
            need_object()?;
            for field in ["offset", "limit"] {
                if let Some(v) = params.get(field) {
                    if !v.is_u64() && !v.is_string() {
                        return Err(ErrorObject::invalid_params(format!(
                            "{field} must be a number"
                        )));
                    }
                }
            }
        }
        _ => {
            need_object()?;
            // A darknode id, when given, must at least be a string.
            if let Some(id) = params.get("id") {
                if !id.is_string() {
                    return Err(ErrorObject::invalid_request("unknown darknode id"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;
    use lightnode_api::chain::{AddressCodecRegistry, ChainClientError, Utxo, UtxoClient};
    use lightnode_api::storage::TxStore as _;
    use lightnode_storage::{MemKv, RedbTxStore};
    use lightnode_types::config::LimiterConfig;
    use lightnode_types::tx::LockMintBurnReleaseInput;
    use std::time::Duration;

    struct FixedUtxoClient;

    #[async_trait]
    impl UtxoClient for FixedUtxoClient {
        async fn output(&self, _txid: &[u8], _vout: u32) -> Result<Utxo, ChainClientError> {
            Ok(Utxo { amount: U256::from(10_000u64), pubkey_script: vec![] })
        }
    }

    struct Env {
        _dir: tempfile::TempDir,
        validator: Validator,
        store: Arc<RedbTxStore>,
        compat: Arc<CompatStore>,
    }

    fn env() -> Env {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RedbTxStore::open(dir.path().join("txs.redb")).unwrap());
        let kv = Arc::new(MemKv::new());
        let compat =
            Arc::new(CompatStore::new(kv, store.clone(), Duration::from_secs(3600)));
        let mut bindings = Bindings::new(Arc::new(AddressCodecRegistry::new()));
        bindings.register_token(
            "BTC",
            hex::decode("0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f").unwrap().try_into().unwrap(),
        );
        bindings.register_utxo_client("Bitcoin", Arc::new(FixedUtxoClient));
        let validator = Validator::new(
            Arc::new(RateLimiter::new(LimiterConfig::default())),
            compat.clone(),
            Arc::new(bindings),
            vec![2u8; 33],
        );
        Env { _dir: dir, validator, store, compat }
    }

    fn req(method: &str, params: Json) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params,
        }
    }

    fn remote() -> Option<SocketAddr> {
        Some("192.0.2.7:5000".parse().unwrap())
    }

    fn v1_burn_tx(gpubkey: Vec<u8>) -> Transaction {
        let nonce = [0u8; 32];
        let payload = Vec::new();
        let txid = vec![3u8; 32];
        let input = LockMintBurnReleaseInput {
            phash: lightnode_types::hash::phash(&payload),
            nhash: lightnode_types::hash::nhash(&nonce, &txid, 0),
            txid,
            txindex: 0,
            amount: U256::from(10_000u64),
            payload,
            to: "miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6".to_string(),
            nonce,
            gpubkey,
            ghash: [4u8; 32],
        };
        Transaction::new(Version::V1, Selector::new("BTC/fromEthereum").unwrap(), input).unwrap()
    }

    #[test]
    fn xff_last_element_wins() {
        let ip = client_ip(Some("203.0.113.5, 198.51.100.9"), remote()).unwrap();
        assert_eq!(ip.to_string(), "198.51.100.9");
        // Trailing empties are skipped.
        let ip = client_ip(Some("203.0.113.5, , "), remote()).unwrap();
        assert_eq!(ip.to_string(), "203.0.113.5");
        // host:port entries parse too.
        let ip = client_ip(Some("203.0.113.5:4431"), remote()).unwrap();
        assert_eq!(ip.to_string(), "203.0.113.5");
        // Fallback to the socket address.
        let ip = client_ip(None, remote()).unwrap();
        assert_eq!(ip.to_string(), "192.0.2.7");
        // Nothing at all: error names the header.
        let err = client_ip(None, None).unwrap_err();
        assert!(err.message.contains("forwarded header"));
    }

    #[tokio::test]
    async fn rate_limited_request_names_the_ip() {
        let env = env();
        for _ in 0..10 {
            let _ = env
                .validator
                .validate(req("ren_submitTx", json!({})), remote(), None)
                .await;
        }
        let err = env
            .validator
            .validate(req("ren_submitTx", json!({})), remote(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, jsonrpc::ERR_INVALID_REQUEST);
        assert_eq!(err.message, "rate limit exceeded for 192.0.2.7");
    }

    #[tokio::test]
    async fn query_tx_rewrites_to_v1_hash_encoding() {
        let env = env();
        let hash = [0xfeu8; 32];
        let validated = env
            .validator
            .validate(
                req("ren_queryTx", json!({ "txHash": B64.encode(hash) })),
                remote(),
                None,
            )
            .await
            .unwrap();
        match validated {
            Validated::QueryTx { request, hash: parsed } => {
                assert_eq!(parsed.0, hash);
                let rewritten = request.params["txHash"].as_str().unwrap();
                assert!(!rewritten.contains('='));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn v0_lock_submission_is_translated() {
        let env = env();
        let params = json!({ "tx": {
            "to": "BTC0Btc2Eth",
            "in": [
                {"name": "p", "type": "ext_ethCompatPayload",
                 "value": {"abi": B64.encode(b"[]"), "value": B64.encode(b"xyz"), "fn": B64.encode(b"mint")}},
                {"name": "token", "type": "ext_ethCompatAddress",
                 "value": "0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f"},
                {"name": "to", "type": "ext_ethCompatAddress",
                 "value": "7DDFA2e5435027f6e13Ca8Db2f32ebd5551158Bb"},
                {"name": "n", "type": "b32", "value": B64.encode([7u8; 32])},
                {"name": "utxo", "type": "ext_btcCompatUTXO",
                 "value": {"txHash": B64.encode([9u8; 32]), "vOut": 0}}
            ]
        }});
        let validated =
            env.validator.validate(req("ren_submitTx", params), remote(), None).await.unwrap();
        match validated {
            Validated::SubmitTx { request, kind: SubmitKind::V1 { tx, v0_hash } } => {
                assert_eq!(tx.version, Version::V0);
                assert_eq!(tx.selector.as_str(), "BTC/toEthereum");
                assert!(v0_hash.is_some());
                // The params now carry the v1 shape.
                assert!(request.params["tx"]["selector"].is_string());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn v0_burn_short_circuits_without_deep_validation() {
        let env = env();
        let params = json!({ "tx": {
            "to": "BTC0Eth2Btc",
            "in": [{"name": "ref", "type": "u256", "value": "0"}]
        }});
        let validated =
            env.validator.validate(req("ren_submitTx", params), remote(), None).await.unwrap();
        match validated {
            Validated::SubmitTx { kind: SubmitKind::LegacyBurn { selector, burn_ref, v0_hash }, .. } => {
                assert_eq!(selector.as_str(), "BTC/fromEthereum");
                assert_eq!(burn_ref, U256::zero());
                assert_eq!(
                    v0_hash,
                    lightnode_compat::hash::burn_tx_hash("BTC0Eth2Btc", U256::zero())
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_hash_v0hash_submission_short_circuits() {
        let env = env();
        let v0_hash = [0x6bu8; 32];
        let params = json!({ "tx": {
            "version": "1",
            "hash": lightnode_types::tx::TxHash::default().to_string(),
            "selector": "BTC/fromEthereum",
            "in": { "v0hash": B64.encode(v0_hash), "nonce": B64.encode([0u8; 32]) }
        }});
        let validated =
            env.validator.validate(req("ren_submitTx", params), remote(), None).await.unwrap();
        match validated {
            Validated::SubmitTx { kind: SubmitKind::LegacyBurn { v0_hash: got, .. }, .. } => {
                assert_eq!(got, v0_hash);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn v1_burn_strips_gpubkey_and_persists_mapping() {
        let env = env();
        let with_gpubkey = v1_burn_tx(vec![2u8; 33]);
        let params = json!({ "tx": with_gpubkey.to_json() });
        let validated =
            env.validator.validate(req("ren_submitTx", params), remote(), None).await.unwrap();
        let tx = match validated {
            Validated::SubmitTx { kind: SubmitKind::V1 { tx, .. }, .. } => tx,
            other => panic!("unexpected {other:?}"),
        };
        assert!(tx.input.gpubkey.is_empty());
        // The stripped tx hashes differently from the submitted one.
        assert_ne!(tx.hash, with_gpubkey.hash);
        // And the v0 mapping for ref 0 now exists.
        env.store.insert(&tx).unwrap();
        let v0_hash = lightnode_compat::hash::burn_tx_hash("BTC0Eth2Btc", U256::zero());
        assert_eq!(env.compat.get_v1_hash_from_hash(&v0_hash).unwrap(), tx.hash);
    }

    #[tokio::test]
    async fn bad_derived_hashes_are_invalid_params() {
        let env = env();
        let mut tx = v1_burn_tx(Vec::new());
        tx.input.nhash = [0u8; 32];
        // Rebuild the wire form with a consistent outer hash but a broken
        // nhash.
        let rebuilt = Transaction::new(tx.version, tx.selector.clone(), tx.input.clone()).unwrap();
        let params = json!({ "tx": rebuilt.to_json() });
        let err =
            env.validator.validate(req("ren_submitTx", params), remote(), None).await.unwrap_err();
        assert_eq!(err.code, jsonrpc::ERR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let env = env();
        let err = env
            .validator
            .validate(req("ren_stealFunds", json!({})), remote(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, jsonrpc::ERR_METHOD_NOT_FOUND);
    }
}
