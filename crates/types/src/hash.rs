// Path: crates/types/src/hash.rs
//! The v1 fingerprint recipes.
//!
//! Three keccak-256 fingerprints identify a cross-chain transaction:
//! `phash` (payload), `nhash` (nonce + outpoint), and `ghash` (gateway
//! parameters). The content-addressed transaction hash is sha-256 over the
//! canonical binary serialization of `(version, selector, input)`.
//!
//! The legacy v0 recipes differ in txid byte order and in what feeds
//! `ghash`; they live in the compat crate as their own named functions and
//! must never be conflated with these.

use crate::error::ValueError;
use crate::selector::Selector;
use crate::value::Value;
use sha2::{Digest as _, Sha256};
use sha3::{Digest as _, Keccak256};

/// Computes keccak-256 over `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Computes sha-256 over `data`.
pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// `phash = keccak256(payload)`.
pub fn phash(payload: &[u8]) -> [u8; 32] {
    keccak256(payload)
}

/// `nhash = keccak256(nonce ‖ txid ‖ u32-BE(txindex))`.
///
/// The txid here is the chain-canonical byte order, as transmitted in v1
/// submissions.
pub fn nhash(nonce: &[u8; 32], txid: &[u8], txindex: u32) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(nonce);
    hasher.update(txid);
    hasher.update(txindex.to_be_bytes());
    hasher.finalize().into()
}

/// The network-independent token identifier of the selector's asset,
/// `sha256(asset-tag)`. This is what feeds the v1 `ghash`, in contrast to
/// the v0 recipe which uses a host-chain ERC-20 contract address.
pub fn asset_token_id(selector: &Selector) -> [u8; 32] {
    sha256(selector.asset().as_bytes())
}

/// `ghash = keccak256(assetTokenId(selector) ‖ phash ‖ decodedTo ‖ nonce)`.
pub fn ghash(selector: &Selector, phash: &[u8; 32], to: &[u8], nonce: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(asset_token_id(selector));
    hasher.update(phash);
    hasher.update(to);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Computes the content-addressed transaction hash:
/// `sha256(marshal(version) ‖ marshal(selector) ‖ marshal(input))`, all
/// three marshalled with the canonical binary codec (records in
/// lexicographic field order).
pub fn tx_hash(version: &str, selector: &Selector, input: &Value) -> Result<[u8; 32], ValueError> {
    let mut buf = Vec::with_capacity(256);
    Value::Str(version.to_string()).marshal_into(&mut buf)?;
    Value::Str(selector.as_str().to_string()).marshal_into(&mut buf)?;
    input.marshal_into(&mut buf)?;
    Ok(sha256(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    #[test]
    fn nhash_depends_on_txindex_endianness() {
        let nonce = [1u8; 32];
        let txid = [2u8; 32];
        // Big-endian index: changing the low byte must change the hash.
        assert_ne!(nhash(&nonce, &txid, 0), nhash(&nonce, &txid, 1));
        // And the recipe must match a hand-rolled keccak.
        let mut buf = Vec::new();
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&txid);
        buf.extend_from_slice(&7u32.to_be_bytes());
        assert_eq!(nhash(&nonce, &txid, 7), keccak256(&buf));
    }

    #[test]
    fn ghash_matches_recipe() {
        let sel = Selector::new("BTC/toEthereum").unwrap();
        let ph = phash(b"payload");
        let to = [3u8; 20];
        let nonce = [4u8; 32];
        let mut buf = Vec::new();
        buf.extend_from_slice(&asset_token_id(&sel));
        buf.extend_from_slice(&ph);
        buf.extend_from_slice(&to);
        buf.extend_from_slice(&nonce);
        assert_eq!(ghash(&sel, &ph, &to, &nonce), keccak256(&buf));
    }

    #[test]
    fn tx_hash_is_insertion_order_independent() {
        let sel = Selector::new("BTC/toEthereum").unwrap();
        let a = Value::Record(vec![
            ("amount".to_string(), Value::U256(U256::from(1u64))),
            ("txindex".to_string(), Value::U32(0)),
        ]);
        let b = Value::Record(vec![
            ("txindex".to_string(), Value::U32(0)),
            ("amount".to_string(), Value::U256(U256::from(1u64))),
        ]);
        assert_eq!(tx_hash("1", &sel, &a).unwrap(), tx_hash("1", &sel, &b).unwrap());
    }

    #[test]
    fn tx_hash_distinguishes_versions_and_selectors() {
        let mint = Selector::new("BTC/toEthereum").unwrap();
        let burn = Selector::new("BTC/fromEthereum").unwrap();
        let input = Value::Record(vec![("txindex".to_string(), Value::U32(0))]);
        let h1 = tx_hash("1", &mint, &input).unwrap();
        assert_ne!(h1, tx_hash("0", &mint, &input).unwrap());
        assert_ne!(h1, tx_hash("1", &burn, &input).unwrap());
    }
}
