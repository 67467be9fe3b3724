// Path: crates/compat/src/hash.rs
//! The legacy v0 fingerprint recipes.
//!
//! These differ from the v1 recipes in two load-bearing ways: the txid is
//! hashed in the v0 display order (byte-reversed relative to the
//! chain-canonical order), and `ghash` commits to the host-chain ERC-20
//! contract address the user asked to receive, not the network-independent
//! asset token id.

use crate::error::CompatError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_types::selector::Selector;
use primitive_types::U256;
use sha3::{Digest as _, Keccak256};

fn keccak(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Reverses a byte string. The v0 wire stores UTXO transaction hashes in
/// display order; the chains and the v1 wire use the canonical order.
pub fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// The v0 gateway hash:
/// `keccak256(tokenAddress ‖ phash ‖ decodedTo ‖ nonce)`.
pub fn ghash(token: &[u8; 20], phash: &[u8; 32], to: &[u8; 20], nonce: &[u8; 32]) -> [u8; 32] {
    keccak(&[token, phash, to, nonce])
}

/// The v0 nonce hash:
/// `keccak256(nonce ‖ txid-v0-order ‖ u32-LE(txindex))`.
///
/// `txid` here is the v0 display order, i.e. already reversed relative to
/// the chain-canonical order the v1 recipe hashes.
pub fn nhash(nonce: &[u8; 32], txid_v0: &[u8], txindex: u32) -> [u8; 32] {
    keccak(&[nonce, txid_v0, &txindex.to_le_bytes()])
}

/// The v0 signature hash the Darknodes sign for a mint:
/// `keccak256(phash ‖ u256-BE(amount) ‖ tokenAddress ‖ to ‖ nhash)`.
pub fn sighash(
    phash: &[u8; 32],
    amount: U256,
    token: &[u8; 20],
    to: &[u8; 20],
    nhash: &[u8; 32],
) -> [u8; 32] {
    let mut amount_be = [0u8; 32];
    amount.to_big_endian(&mut amount_be);
    keccak(&[phash, &amount_be, token, to, nhash])
}

/// The v0 hash of a lock/mint transaction:
/// `keccak256("txHash_<to>_<b64std(ghash)>_<b64std(txid-v0-order)>_<vout>")`.
pub fn mint_tx_hash(to_contract: &str, ghash: &[u8; 32], txid_v0: &[u8], vout: u32) -> [u8; 32] {
    let preimage = format!(
        "txHash_{}_{}_{}_{}",
        to_contract,
        B64.encode(ghash),
        B64.encode(txid_v0),
        vout
    );
    keccak(&[preimage.as_bytes()])
}

/// The v0 hash of a burn transaction:
/// `keccak256("txHash_<to>_<ref>")` with the ref in decimal.
pub fn burn_tx_hash(to_contract: &str, burn_ref: U256) -> [u8; 32] {
    let preimage = format!("txHash_{to_contract}_{burn_ref}");
    keccak(&[preimage.as_bytes()])
}

/// The short legacy chain tag used inside contract names
/// (`Bitcoin` → `Btc`, `Ethereum` → `Eth`, ...).
fn short_chain_tag(chain: &str) -> Option<&'static str> {
    Some(match chain {
        "Bitcoin" => "Btc",
        "BitcoinCash" => "Bch",
        "Zcash" => "Zec",
        "DigiByte" => "Dgb",
        "Dogecoin" => "Doge",
        "Filecoin" => "Fil",
        "Terra" => "Luna",
        "Solana" => "Sol",
        "Ethereum" => "Eth",
        _ => return None,
    })
}

fn chain_from_short_tag(tag: &str) -> Option<&'static str> {
    Some(match tag {
        "Btc" => "Bitcoin",
        "Bch" => "BitcoinCash",
        "Zec" => "Zcash",
        "Dgb" => "DigiByte",
        "Doge" => "Dogecoin",
        "Fil" => "Filecoin",
        "Luna" => "Terra",
        "Sol" => "Solana",
        "Eth" => "Ethereum",
        _ => return None,
    })
}

/// Derives the legacy contract name from a v1 selector:
/// `BTC/toEthereum` → `BTC0Btc2Eth`, `BTC/fromEthereum` → `BTC0Eth2Btc`.
pub fn to_from_v1_selector(selector: &Selector) -> Result<String, CompatError> {
    let src = short_chain_tag(selector.source())
        .ok_or_else(|| CompatError::MalformedContract(selector.as_str().to_string()))?;
    let dst = short_chain_tag(selector.destination())
        .ok_or_else(|| CompatError::MalformedContract(selector.as_str().to_string()))?;
    Ok(format!("{}0{}2{}", selector.asset(), src, dst))
}

/// Parses a legacy contract name back into a v1 selector:
/// `BTC0Btc2Eth` → `BTC/toEthereum`, `BTC0Eth2Btc` → `BTC/fromEthereum`.
pub fn selector_from_contract(contract: &str) -> Result<Selector, CompatError> {
    let malformed = || CompatError::MalformedContract(contract.to_string());
    let (asset, route) = contract.split_once('0').ok_or_else(malformed)?;
    let (src_tag, dst_tag) = route.split_once('2').ok_or_else(malformed)?;
    let src = chain_from_short_tag(src_tag).ok_or_else(malformed)?;
    let dst = chain_from_short_tag(dst_tag).ok_or_else(malformed)?;
    let origin = lightnode_types::selector::asset_origin_chain(asset).ok_or_else(malformed)?;
    if src == origin {
        // Lock: asset moves from its origin chain to the host chain.
        Selector::lock(asset, dst).map_err(|_| malformed())
    } else if dst == origin {
        // Burn: the host-chain representation is released back home.
        Selector::burn(asset, src).map_err(|_| malformed())
    } else {
        Err(malformed())
    }
}

/// True when the contract name denotes a lock (mint) on the host chain.
pub fn contract_is_lock(contract: &str) -> bool {
    selector_from_contract(contract).map(|s| s.is_lock()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn contract_names_roundtrip() {
        let mint = Selector::new("BTC/toEthereum").unwrap();
        assert_eq!(to_from_v1_selector(&mint).unwrap(), "BTC0Btc2Eth");
        assert_eq!(selector_from_contract("BTC0Btc2Eth").unwrap(), mint);

        let burn = Selector::new("BTC/fromEthereum").unwrap();
        assert_eq!(to_from_v1_selector(&burn).unwrap(), "BTC0Eth2Btc");
        assert_eq!(selector_from_contract("BTC0Eth2Btc").unwrap(), burn);

        assert!(contract_is_lock("ZEC0Zec2Eth"));
        assert!(!contract_is_lock("ZEC0Eth2Zec"));
    }

    #[test]
    fn malformed_contract_names_are_rejected() {
        for name in ["BTC", "BTC0Btc", "BTC0Xyz2Eth", "XYZ0Btc2Eth", "BTC0Eth2Eth"] {
            assert!(selector_from_contract(name).is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn burn_tx_hash_matches_preimage() {
        // BurnTxHash("BTC0Eth2Btc", 0) must hash the literal preimage
        // "txHash_BTC0Eth2Btc_0".
        let expected = keccak(&[b"txHash_BTC0Eth2Btc_0"]);
        assert_eq!(burn_tx_hash("BTC0Eth2Btc", U256::zero()), expected);
        // Large refs render in full decimal, not scientific notation.
        let r = U256::from_dec_str("340282366920938463463374607431768211456").unwrap();
        let expected = keccak(&[format!("txHash_BTC0Eth2Btc_{r}").as_bytes()]);
        assert_eq!(burn_tx_hash("BTC0Eth2Btc", r), expected);
    }

    #[test]
    fn mint_tx_hash_matches_preimage() {
        let ghash = [1u8; 32];
        let txid = [2u8; 32];
        let preimage =
            format!("txHash_BTC0Btc2Eth_{}_{}_0", B64.encode(ghash), B64.encode(txid));
        assert_eq!(
            mint_tx_hash("BTC0Btc2Eth", &ghash, &txid, 0),
            keccak(&[preimage.as_bytes()])
        );
    }

    #[test]
    fn v0_nhash_uses_little_endian_index() {
        let nonce = [1u8; 32];
        let txid = [2u8; 32];
        let mut buf = Vec::new();
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&txid);
        buf.extend_from_slice(&7u32.to_le_bytes());
        assert_eq!(nhash(&nonce, &txid, 7), keccak(&[&buf]));
        // And therefore differs from the v1 recipe over identical parts.
        assert_ne!(nhash(&nonce, &txid, 7), lightnode_types::hash::nhash(&nonce, &txid, 7));
    }

    #[test]
    fn reverse_bytes_is_involutive() {
        let data: Vec<u8> = (0..32).collect();
        assert_eq!(reverse_bytes(&reverse_bytes(&data)), data);
    }
}
