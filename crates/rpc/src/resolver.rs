// Path: crates/rpc/src/resolver.rs
//! Top-level method dispatch.
//!
//! Standard queries ride the cacher; `ren_queryTxs` is answered from the
//! local store; the two legacy-only endpoints are synthesized from a
//! cached `ren_queryState`; submissions go through the screener and the
//! tx checker; and `ren_queryTx` consults the compat store so legacy
//! clients get v0-shaped answers, including a locally synthesized
//! `confirming` response while the Darknodes have not finalised.

use crate::cacher::Cacher;
use crate::checker::TxChecker;
use crate::jsonrpc::{methods, ErrorObject, Request, Response};
use crate::validator::{SubmitKind, Validated};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_api::darknode::DarknodeError;
use lightnode_api::screener::Screener;
use lightnode_api::storage::{StorageError, TxStore};
use lightnode_compat::legacy;
use lightnode_compat::store::CompatStore;
use lightnode_compat::translate::{v0_query_response, Bindings};
use lightnode_types::tx::{Transaction, TxHash, TxStatus, Version};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Default page size for `ren_queryTxs`.
const DEFAULT_TXS_LIMIT: u64 = 8;

/// The method dispatcher.
pub struct Resolver {
    cacher: Arc<Cacher>,
    store: Arc<dyn TxStore>,
    compat: Arc<CompatStore>,
    bindings: Arc<Bindings>,
    checker: TxChecker,
    screener: Arc<dyn Screener>,
}

impl Resolver {
    /// Wires the dispatcher over its collaborators.
    pub fn new(
        cacher: Arc<Cacher>,
        store: Arc<dyn TxStore>,
        compat: Arc<CompatStore>,
        bindings: Arc<Bindings>,
        checker: TxChecker,
        screener: Arc<dyn Screener>,
    ) -> Self {
        Self { cacher, store, compat, bindings, checker, screener }
    }

    /// Resolves a validated request into a response.
    pub async fn resolve(&self, validated: Validated) -> Response {
        match validated {
            Validated::Standard(request) => self.resolve_standard(request).await,
            Validated::QueryTx { request, hash } => self.resolve_query_tx(request, hash).await,
            Validated::SubmitTx { request, kind } => self.resolve_submit(request, kind).await,
        }
    }

    async fn resolve_standard(&self, request: Request) -> Response {
        let id = request.id.clone();
        let peer = peer_id(&request.params);
        let result = match request.method.as_str() {
            methods::QUERY_SHARDS => self
                .query_state(&peer)
                .await
                .map(|state| legacy::shards_response_from_state(&state)),
            methods::QUERY_FEES => self
                .query_state(&peer)
                .await
                .map(|state| legacy::fees_response_from_state(&state)),
            methods::QUERY_TXS => self.query_txs(&request.params),
            _ => self
                .cacher
                .call(&request.method, request.params.clone(), &peer)
                .await
                .map_err(map_darknode_error),
        };
        match result {
            Ok(result) => Response::ok(id, result),
            Err(e) => Response::error(id, e),
        }
    }

    async fn query_state(&self, peer: &str) -> Result<Json, ErrorObject> {
        self.cacher
            .call(methods::QUERY_STATE, json!({}), peer)
            .await
            .map_err(map_darknode_error)
    }

    fn query_txs(&self, params: &Json) -> Result<Json, ErrorObject> {
        let as_u64 = |field: &str| -> Option<u64> {
            params
                .get(field)
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        };
        let offset = as_u64("offset").unwrap_or(0);
        let limit = as_u64("limit").unwrap_or(DEFAULT_TXS_LIMIT);
        let txs = self
            .store
            .page(offset, limit)
            .map_err(|e| ErrorObject::internal(e.to_string()))?;
        Ok(json!({ "txs": txs.iter().map(Transaction::to_json).collect::<Vec<_>>() }))
    }

    async fn resolve_query_tx(&self, request: Request, hash: TxHash) -> Response {
        let id = request.id.clone();
        match self.query_tx(hash).await {
            Ok(result) => Response::ok(id, result),
            Err(e) => Response::error(id, e),
        }
    }

    async fn query_tx(&self, hash: TxHash) -> Result<Json, ErrorObject> {
        // Map the queried hash: it may already be a v1 hash, or a v0 hash
        // recorded by the translator or the watcher.
        let (v1_hash, via_v0) = match self.store.get(&hash) {
            Ok(_) => (hash, false),
            Err(StorageError::NotFound) => match self.compat.get_v1_hash_from_hash(&hash.0) {
                Ok(mapped) => (mapped, true),
                Err(_) => (hash, false),
            },
            Err(e) => return Err(ErrorObject::internal(e.to_string())),
        };

        match self.store.get(&v1_hash) {
            Ok(tx) => {
                let want_v0 = via_v0 || tx.version == Version::V0;
                let status = self
                    .store
                    .status(&v1_hash)
                    .map_err(|e| ErrorObject::internal(e.to_string()))?;
                if status != TxStatus::Confirmed {
                    // Synthesize locally; the Darknodes may not know the
                    // transaction yet.
                    return self.render_query_response(&tx, "confirming", want_v0);
                }
                let result = self
                    .cacher
                    .call(methods::QUERY_TX, json!({ "txHash": v1_hash.to_string() }), "")
                    .await
                    .map_err(map_darknode_error)?;
                self.translate_query_result(result, want_v0)
            }
            Err(StorageError::NotFound) => {
                // Unknown locally: pass the query upstream untouched.
                let result = self
                    .cacher
                    .call(methods::QUERY_TX, json!({ "txHash": v1_hash.to_string() }), "")
                    .await
                    .map_err(map_darknode_error)?;
                self.translate_query_result(result, via_v0)
            }
            Err(e) => Err(ErrorObject::internal(e.to_string())),
        }
    }

    fn render_query_response(
        &self,
        tx: &Transaction,
        status: &str,
        want_v0: bool,
    ) -> Result<Json, ErrorObject> {
        if want_v0 {
            v0_query_response(tx, status, &self.compat, &self.bindings)
                .map_err(|e| ErrorObject::internal(e.to_string()))
        } else {
            Ok(json!({ "tx": tx.to_json(), "txStatus": status }))
        }
    }

    fn translate_query_result(&self, result: Json, want_v0: bool) -> Result<Json, ErrorObject> {
        if !want_v0 {
            return Ok(result);
        }
        let status = result
            .get("txStatus")
            .and_then(Json::as_str)
            .unwrap_or("done")
            .to_string();
        let tx_json = result
            .get("tx")
            .ok_or_else(|| ErrorObject::internal("darknode response missing tx"))?;
        let tx = Transaction::from_json(tx_json)
            .map_err(|e| ErrorObject::internal(e.to_string()))?;
        self.render_query_response(&tx, &status, true)
    }

    async fn resolve_submit(&self, request: Request, kind: SubmitKind) -> Response {
        let id = request.id.clone();
        match kind {
            // Legacy burn: answer with the ref-derived hash and never
            // forward. The watcher submits the real transaction once the
            // burn event lands on chain.
            SubmitKind::LegacyBurn { v0_hash, .. } => {
                Response::ok(id, json!({ "tx": { "hash": B64.encode(v0_hash) } }))
            }
            SubmitKind::V1 { tx, v0_hash } => {
                match self.screener.is_sanctioned(&tx.input.to).await {
                    Ok(false) => {}
                    Ok(true) => {
                        return Response::error(
                            id,
                            ErrorObject::invalid_params(format!(
                                "address {} is sanctioned",
                                tx.input.to
                            )),
                        )
                    }
                    Err(e) => return Response::error(id, ErrorObject::internal(e.to_string())),
                }
                match self.checker.submit(tx).await {
                    Ok(hash) => match v0_hash {
                        // Legacy submitters get the v0 hash back.
                        Some(v0) => Response::ok(id, json!({ "tx": { "hash": B64.encode(v0) } })),
                        None => {
                            let _ = hash;
                            Response::ok(id, json!({}))
                        }
                    },
                    Err(e) => Response::error(id, e),
                }
            }
        }
    }
}

fn peer_id(params: &Json) -> String {
    params.get("id").and_then(Json::as_str).unwrap_or("").to_string()
}

fn map_darknode_error(e: DarknodeError) -> ErrorObject {
    match e {
        DarknodeError::Remote { code, message } => ErrorObject::new(code, message),
        DarknodeError::BackPressure => ErrorObject::internal(e.to_string()),
        DarknodeError::Transport(_) => ErrorObject::internal(e.to_string()),
    }
}
