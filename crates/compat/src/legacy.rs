// Path: crates/compat/src/legacy.rs
//! Synthesized responses for the two legacy-only endpoints.
//!
//! `ren_queryShards` and `ren_queryFees` were removed from the Darknode
//! surface; v0 SDKs still call them. Both are rebuilt entirely from a
//! cached `ren_queryState` response with a fixed per-chain mapping.

use serde_json::{json, Value as Json};

/// The assets legacy SDKs expect shard and fee entries for, with their
/// origin chains.
const LEGACY_ASSETS: [(&str, &str); 3] =
    [("BTC", "Bitcoin"), ("ZEC", "Zcash"), ("BCH", "BitcoinCash")];

/// Mint fee charged on the Ethereum host chain, in basis points. Fee
/// accrual is not exposed by the Darknodes yet, so the legacy constant is
/// served as-is.
pub const MINT_FEE_BPS: u64 = 25;
/// Burn fee charged on the Ethereum host chain, in basis points.
pub const BURN_FEE_BPS: u64 = 10;

/// Digs the active shard public key out of a `ren_queryState` response.
fn shard_pubkey(state: &Json) -> String {
    state
        .pointer("/state/System/shards/primary/0/pubKey")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Reads the per-asset gas numbers from the state, multiplying
/// `gasLimit * gasCap` into the flat lock/release fee the v0 shape wants.
fn chain_fee(state: &Json, asset_chain: &str) -> u64 {
    let limit = state
        .pointer(&format!("/state/{asset_chain}/gasLimit"))
        .and_then(Json::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let cap = state
        .pointer(&format!("/state/{asset_chain}/gasCap"))
        .and_then(Json::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    limit.saturating_mul(cap)
}

/// Builds a v0 `ren_queryShards` response from a cached `ren_queryState`
/// response.
pub fn shards_response_from_state(state: &Json) -> Json {
    let pubkey = shard_pubkey(state);
    let gateways: Vec<Json> = LEGACY_ASSETS
        .iter()
        .map(|(asset, origin)| {
            json!({
                "asset": asset,
                "hosts": ["Ethereum"],
                "locked": "0",
                "origin": origin,
                "pubKey": pubkey,
            })
        })
        .collect();
    json!({
        "shards": [{
            "darknodesRootHash": "",
            "gateways": gateways,
            "gatewaysRootHash": "",
            "primary": true,
            "pubKey": pubkey,
        }]
    })
}

/// Builds a v0 `ren_queryFees` response from a cached `ren_queryState`
/// response. Mint and burn fees on the Ethereum host are the fixed legacy
/// constants; lock and release fees come from the chain gas numbers.
pub fn fees_response_from_state(state: &Json) -> Json {
    let mut fees = serde_json::Map::new();
    for (asset, origin) in LEGACY_ASSETS {
        let flat = chain_fee(state, origin);
        fees.insert(
            asset.to_lowercase(),
            json!({
                "lock": flat.to_string(),
                "release": flat.to_string(),
                "ethereum": {
                    "mint": MINT_FEE_BPS.to_string(),
                    "burn": BURN_FEE_BPS.to_string(),
                },
            }),
        );
    }
    json!({ "fees": fees })
}
