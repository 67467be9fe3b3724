// Path: crates/compat/src/translate.rs
//! The bidirectional v0↔v1 translator.
//!
//! Submit side: a legacy v0 lock is rebuilt as a v1 transaction using the
//! v0 fingerprint recipes, tagged `Version::V0` so every response for it
//! is translated back. Query side: a v1 transaction tagged `Version::V0`
//! is rebuilt into the v0 shape the legacy SDK expects, restoring the
//! preserved payload where the submit side stored one.

use crate::error::CompatError;
use crate::hash as v0hash;
use crate::store::CompatStore;
use crate::v0::{V0Arg, V0Tx};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_api::chain::{AddressCodecRegistry, UtxoClient};
use lightnode_types::selector::Selector;
use lightnode_types::tx::{LockMintBurnReleaseInput, Transaction, Version};
use lightnode_types::value::Value;
use primitive_types::U256;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Chain-side bindings the translator needs: address codecs, the
/// asset→ERC-20 token table for the host chain, and a UTXO client per
/// lock chain.
pub struct Bindings {
    /// Address codecs, one per chain. Shared with the watchers.
    pub codecs: Arc<AddressCodecRegistry>,
    tokens: BTreeMap<String, [u8; 20]>,
    utxo_clients: BTreeMap<String, Arc<dyn UtxoClient>>,
}

impl Bindings {
    /// Creates empty bindings; the node registers codecs, tokens, and
    /// clients at startup.
    pub fn new(codecs: Arc<AddressCodecRegistry>) -> Self {
        Self { codecs, tokens: BTreeMap::new(), utxo_clients: BTreeMap::new() }
    }

    /// Registers the host-chain ERC-20 contract address for an asset.
    pub fn register_token(&mut self, asset: &str, address: [u8; 20]) {
        self.tokens.insert(asset.to_string(), address);
    }

    /// Registers the UTXO client for a lock chain.
    pub fn register_utxo_client(&mut self, chain: &str, client: Arc<dyn UtxoClient>) {
        self.utxo_clients.insert(chain.to_string(), client);
    }

    /// The ERC-20 contract address minted for `asset` on the host chain.
    pub fn token_address(&self, asset: &str) -> Result<[u8; 20], CompatError> {
        self.tokens
            .get(asset)
            .copied()
            .ok_or_else(|| CompatError::Abi(format!("no token registered for asset {asset:?}")))
    }

    /// The UTXO client for `chain`.
    pub fn utxo_client(&self, chain: &str) -> Result<&Arc<dyn UtxoClient>, CompatError> {
        self.utxo_clients
            .get(chain)
            .ok_or_else(|| CompatError::Abi(format!("no utxo client registered for {chain:?}")))
    }
}

/// The argument set every v0 lock contract declares.
const LOCK_ABI: [(&str, &str); 5] = [
    ("p", "ext_ethCompatPayload"),
    ("token", "ext_ethCompatAddress"),
    ("to", "ext_ethCompatAddress"),
    ("n", "b32"),
    ("utxo", "ext_btcCompatUTXO"),
];

fn validate_lock_abi(v0tx: &V0Tx) -> Result<(), CompatError> {
    for (name, ty) in LOCK_ABI {
        match v0tx.arg(name) {
            Some(arg) if arg.ty == ty => {}
            Some(arg) => {
                return Err(CompatError::Abi(format!(
                    "argument {name:?} has type {:?}, want {ty:?}",
                    arg.ty
                )))
            }
            None => return Err(CompatError::Abi(format!("missing argument {name:?}"))),
        }
    }
    Ok(())
}

struct LockArgs {
    payload: Vec<u8>,
    token: [u8; 20],
    to: [u8; 20],
    nonce: [u8; 32],
    utxo_tx_hash: [u8; 32],
    utxo_v_out: u32,
}

fn lock_args(v0tx: &V0Tx) -> Result<LockArgs, CompatError> {
    validate_lock_abi(v0tx)?;
    let payload = match &v0tx.arg("p").map(|a| &a.value) {
        Some(Value::EthPayload(p)) => p.value.clone(),
        _ => return Err(CompatError::Abi("argument \"p\" is not a payload".to_string())),
    };
    let eth_addr = |name: &str| -> Result<[u8; 20], CompatError> {
        match v0tx.arg(name).map(|a| &a.value) {
            Some(Value::EthAddress(a)) => Ok(*a),
            _ => Err(CompatError::Abi(format!("argument {name:?} is not an address"))),
        }
    };
    let nonce = match v0tx.arg("n").map(|a| &a.value) {
        Some(Value::B32(n)) => *n,
        _ => return Err(CompatError::Abi("argument \"n\" is not a b32".to_string())),
    };
    let (utxo_tx_hash, utxo_v_out) = match v0tx.arg("utxo").map(|a| &a.value) {
        Some(Value::BtcUtxo(u)) => (u.tx_hash, u.v_out),
        _ => return Err(CompatError::Abi("argument \"utxo\" is not a utxo".to_string())),
    };
    Ok(LockArgs { payload, token: eth_addr("token")?, to: eth_addr("to")?, nonce, utxo_tx_hash, utxo_v_out })
}

/// Translates a v0 lock submission into a v1 transaction.
///
/// Consults the compat store first so a re-submission returns the
/// previously translated transaction; otherwise queries the lock chain
/// for the deposited amount, computes the legacy-recipe fingerprints,
/// persists the bidirectional mappings, and fills in `v0tx.hash`.
pub async fn v0_lock_to_v1(
    v0tx: &mut V0Tx,
    bindings: &Bindings,
    gpubkey: Vec<u8>,
    compat: &CompatStore,
) -> Result<Transaction, CompatError> {
    let args = lock_args(v0tx)?;
    let selector = v0hash::selector_from_contract(&v0tx.to)?;
    if !selector.is_lock() {
        return Err(CompatError::Abi(format!("{:?} is not a lock contract", v0tx.to)));
    }

    if let Ok(existing) = compat.get_v1_tx_from_tx(v0tx) {
        v0tx.hash = v0hash::mint_tx_hash(
            &v0tx.to,
            &existing.input.ghash,
            &args.utxo_tx_hash,
            args.utxo_v_out,
        );
        return Ok(existing);
    }

    // The v0 wire stores the tx hash in display order; the chain client
    // and the v1 input want the canonical order.
    let txid = v0hash::reverse_bytes(&args.utxo_tx_hash);
    let output = bindings
        .utxo_client(selector.source())?
        .output(&txid, args.utxo_v_out)
        .await?;

    let phash = lightnode_types::hash::phash(&args.payload);
    let ghash = v0hash::ghash(&args.token, &phash, &args.to, &args.nonce);
    let nhash = v0hash::nhash(&args.nonce, &args.utxo_tx_hash, args.utxo_v_out);

    let input = LockMintBurnReleaseInput {
        txid,
        txindex: args.utxo_v_out,
        amount: output.amount,
        payload: args.payload,
        phash,
        to: format!("0x{}", hex::encode(args.to)),
        nonce: args.nonce,
        nhash,
        gpubkey,
        ghash,
    };
    let v1tx = Transaction::new(Version::V0, selector, input)?;

    v0tx.hash = v0hash::mint_tx_hash(&v0tx.to, &ghash, &args.utxo_tx_hash, args.utxo_v_out);
    compat.persist_mappings(v0tx, &v1tx)?;
    Ok(v1tx)
}

/// Extracts the burn ref of a v0 burn submission and computes its v0
/// hash. The pre-image is cheap, so no chain round-trip is needed.
pub fn v0_burn_hash(v0tx: &V0Tx) -> Result<(Selector, U256, [u8; 32]), CompatError> {
    let selector = v0hash::selector_from_contract(&v0tx.to)?;
    if selector.is_lock() {
        return Err(CompatError::Abi(format!("{:?} is not a burn contract", v0tx.to)));
    }
    let burn_ref = match v0tx.arg("ref").map(|a| &a.value) {
        Some(Value::U256(r)) => *r,
        Some(Value::U64(r)) => U256::from(*r),
        _ => return Err(CompatError::Abi("burn tx missing ref argument".to_string())),
    };
    let hash = v0hash::burn_tx_hash(&v0tx.to, burn_ref);
    Ok((selector, burn_ref, hash))
}

/// Rebuilds the v0-shaped transaction for a v1 transaction that entered
/// through the compat path, for query responses to legacy SDKs.
pub fn v1_tx_to_v0(
    tx: &Transaction,
    compat: &CompatStore,
    bindings: &Bindings,
) -> Result<V0Tx, CompatError> {
    if tx.selector.is_lock() {
        mint_tx_to_v0(tx, compat, bindings)
    } else {
        burn_tx_to_v0(tx)
    }
}

fn mint_tx_to_v0(
    tx: &Transaction,
    compat: &CompatStore,
    bindings: &Bindings,
) -> Result<V0Tx, CompatError> {
    let contract = v0hash::to_from_v1_selector(&tx.selector)?;
    let token = bindings.token_address(tx.selector.asset())?;
    let to_hex = tx.input.to.strip_prefix("0x").unwrap_or(&tx.input.to);
    let to: [u8; 20] = hex::decode(to_hex)
        .map_err(|e| CompatError::Abi(format!("recipient is not hex: {e}")))?
        .as_slice()
        .try_into()
        .map_err(|_| CompatError::Abi("recipient is not 20 bytes".to_string()))?;
    let txid_v0 = v0hash::reverse_bytes(&tx.input.txid);
    let utxo_tx_hash: [u8; 32] = txid_v0
        .as_slice()
        .try_into()
        .map_err(|_| CompatError::Abi("txid is not 32 bytes".to_string()))?;
    let utxo = lightnode_types::value::ExtBtcCompatUtxo {
        tx_hash: utxo_tx_hash,
        v_out: tx.input.txindex,
    };

    // Restore the submitted payload verbatim when the submit side stored
    // it; otherwise fall back to the lossy re-creation legacy SDKs
    // tolerate (abi = "{}").
    let payload_json = compat
        .get_payload_from_utxo(&utxo_tx_hash, tx.input.txindex)
        .unwrap_or_else(|_| {
            json!({
                "abi": B64.encode(b"{}"),
                "value": B64.encode(&tx.input.payload),
                "fn": "",
            })
        });

    let sighash = v0hash::sighash(&tx.input.phash, tx.input.amount, &token, &to, &tx.input.nhash);

    let input = vec![
        V0Arg::new("p", "ext_ethCompatPayload", payload_from_json(&payload_json)?),
        V0Arg::new("token", "ext_ethCompatAddress", Value::EthAddress(token)),
        V0Arg::new("to", "ext_ethCompatAddress", Value::EthAddress(to)),
        V0Arg::new("n", "b32", Value::B32(tx.input.nonce)),
        V0Arg::new("utxo", "ext_btcCompatUTXO", Value::BtcUtxo(utxo.clone())),
    ];
    let autogen = vec![
        V0Arg::new("phash", "b32", Value::B32(tx.input.phash)),
        V0Arg::new("ghash", "b32", Value::B32(tx.input.ghash)),
        V0Arg::new("nhash", "b32", Value::B32(tx.input.nhash)),
        V0Arg::new("amount", "u256", Value::U256(tx.input.amount)),
        V0Arg::new("sighash", "b32", Value::B32(sighash)),
    ];
    let mut out = Vec::new();
    if let Some(sig) = &tx.output.sig {
        // sig = r ‖ s ‖ v.
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig[..32]);
        s.copy_from_slice(&sig[32..64]);
        out.push(V0Arg::new("r", "b32", Value::B32(r)));
        out.push(V0Arg::new("s", "b32", Value::B32(s)));
        out.push(V0Arg::new("v", "u8", Value::U8(sig[64])));
        if let Some(amount) = tx.output.amount {
            out.push(V0Arg::new("amount", "u256", Value::U256(amount)));
        }
    }
    if let Some(revert) = &tx.output.revert {
        out.push(V0Arg::new("revert", "str", Value::Str(revert.clone())));
    }

    Ok(V0Tx {
        hash: v0hash::mint_tx_hash(&contract, &tx.input.ghash, &utxo_tx_hash, tx.input.txindex),
        to: contract,
        input,
        autogen,
        out,
    })
}

fn burn_tx_to_v0(tx: &Transaction) -> Result<V0Tx, CompatError> {
    let contract = v0hash::to_from_v1_selector(&tx.selector)?;
    let burn_ref = U256::from_big_endian(&tx.input.nonce);
    let input = vec![
        V0Arg::new("ref", "u256", Value::U256(burn_ref)),
        V0Arg::new("to", "str", Value::Str(tx.input.to.clone())),
        V0Arg::new("amount", "u256", Value::U256(tx.input.amount)),
    ];
    Ok(V0Tx {
        hash: v0hash::burn_tx_hash(&contract, burn_ref),
        to: contract,
        input,
        autogen: Vec::new(),
        out: Vec::new(),
    })
}

fn payload_from_json(v: &serde_json::Value) -> Result<Value, CompatError> {
    crate::v0::value_from_v0_json("ext_ethCompatPayload", v)
}

/// Renders a stored v1 transaction as the legacy query-response JSON:
/// `{"tx": <v0 shape>, "txStatus": <status>}`.
pub fn v0_query_response(
    tx: &Transaction,
    status: &str,
    compat: &CompatStore,
    bindings: &Bindings,
) -> Result<serde_json::Value, CompatError> {
    let v0tx = v1_tx_to_v0(tx, compat, bindings)?;
    Ok(json!({ "tx": v0tx.to_json(), "txStatus": status }))
}
