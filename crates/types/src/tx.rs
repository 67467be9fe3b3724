// Path: crates/types/src/tx.rs
//! The v1 transaction model.
//!
//! A transaction is an immutable `(version, selector, input)` triple plus
//! the output record the Darknodes fill in after signing. The `hash` field
//! is fully determined by the first three and is recomputed, never
//! trusted.

use crate::error::{TxError, ValueError};
use crate::hash;
use crate::selector::Selector;
use crate::value::{b32_from_json, decode_b64_flexible, u256_from_json, Value};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use base64::Engine as _;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::fmt;

/// A wire-format protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
    /// A v1 transaction synthesized from a legacy v0 submission. Responses
    /// for such transactions must be translated back to the v0 shape.
    V0,
    /// A native v1 transaction.
    V1,
}

impl Version {
    /// The wire representation of this version.
    pub fn as_str(self) -> &'static str {
        match self {
            Version::V0 => "0",
            Version::V1 => "1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Version {
    type Error = TxError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "0" => Ok(Version::V0),
            "1" => Ok(Version::V1),
            other => Err(TxError::InvalidField {
                field: "version",
                msg: format!("unknown version {other:?}"),
            }),
        }
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.as_str().to_string()
    }
}

/// A 32-byte content-addressed transaction hash.
///
/// Displayed and serialized as base64-URL without padding (the v1 wire
/// encoding); the parser additionally accepts the standard alphabet that
/// v0 clients use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Parses a hash from any accepted base64 dialect.
    pub fn from_b64(s: &str) -> Result<Self, ValueError> {
        let bytes = decode_b64_flexible(s)?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ValueError::InvalidLength { what: "tx hash", expected: 32, got: bytes.len() }
        })?;
        Ok(TxHash(arr))
    }

    /// True when every byte is zero (the legacy burn-submit placeholder).
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&B64URL.encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::from_b64(&s).map_err(serde::de::Error::custom)
    }
}

/// The persisted lifecycle status of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Persisted locally, not yet acknowledged as done by the Darknodes.
    Confirming,
    /// The Darknodes reported the transaction done.
    Confirmed,
}

/// The fixed input field set for lock-mint-burn-release transactions.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LockMintBurnReleaseInput {
    /// The source-chain transaction id, big-endian as transmitted.
    pub txid: Vec<u8>,
    /// The output index within the source transaction.
    pub txindex: u32,
    /// The locked or burned amount.
    pub amount: U256,
    /// The contract call payload.
    pub payload: Vec<u8>,
    /// `keccak256(payload)`.
    pub phash: [u8; 32],
    /// The recipient address on the target chain, as a string.
    pub to: String,
    /// The 32-byte nonce.
    pub nonce: [u8; 32],
    /// `keccak256(nonce ‖ txid ‖ u32-BE(txindex))`.
    pub nhash: [u8; 32],
    /// The active shard's 33-byte compressed secp256k1 public key. Empty
    /// for burns.
    pub gpubkey: Vec<u8>,
    /// `keccak256(assetTokenId ‖ phash ‖ decodedTo ‖ nonce)`.
    pub ghash: [u8; 32],
}

impl LockMintBurnReleaseInput {
    /// Converts the typed input into its tagged-value record.
    pub fn to_value(&self) -> Value {
        Value::Record(vec![
            ("txid".to_string(), Value::Bytes(self.txid.clone())),
            ("txindex".to_string(), Value::U32(self.txindex)),
            ("amount".to_string(), Value::U256(self.amount)),
            ("payload".to_string(), Value::Bytes(self.payload.clone())),
            ("phash".to_string(), Value::B32(self.phash)),
            ("to".to_string(), Value::Str(self.to.clone())),
            ("nonce".to_string(), Value::B32(self.nonce)),
            ("nhash".to_string(), Value::B32(self.nhash)),
            ("gpubkey".to_string(), Value::Bytes(self.gpubkey.clone())),
            ("ghash".to_string(), Value::B32(self.ghash)),
        ])
    }

    /// Rebuilds the typed input from a tagged-value record.
    pub fn from_value(value: &Value) -> Result<Self, TxError> {
        let invalid = |field: &'static str| TxError::InvalidField {
            field,
            msg: "missing or mistyped".to_string(),
        };
        let bytes = |field: &'static str| -> Result<Vec<u8>, TxError> {
            match value.field(field) {
                Some(Value::Bytes(b)) => Ok(b.clone()),
                _ => Err(invalid(field)),
            }
        };
        let b32 = |field: &'static str| -> Result<[u8; 32], TxError> {
            match value.field(field) {
                Some(Value::B32(b)) => Ok(*b),
                _ => Err(invalid(field)),
            }
        };
        let txindex = match value.field("txindex") {
            Some(Value::U32(x)) => *x,
            _ => return Err(invalid("txindex")),
        };
        let amount = match value.field("amount") {
            Some(Value::U256(x)) => *x,
            _ => return Err(invalid("amount")),
        };
        let to = match value.field("to") {
            Some(Value::Str(s)) | Some(Value::Address(s)) => s.clone(),
            _ => return Err(invalid("to")),
        };
        Ok(Self {
            txid: bytes("txid")?,
            txindex,
            amount,
            payload: bytes("payload")?,
            phash: b32("phash")?,
            to,
            nonce: b32("nonce")?,
            nhash: b32("nhash")?,
            gpubkey: bytes("gpubkey")?,
            ghash: b32("ghash")?,
        })
    }

    /// Parses the input from its JSON object form.
    pub fn from_json(v: &Json) -> Result<Self, TxError> {
        let obj = v.as_object().ok_or(TxError::InvalidField {
            field: "input",
            msg: "expected object".to_string(),
        })?;
        let field = |name: &'static str| -> Result<&Json, TxError> {
            obj.get(name).ok_or(TxError::InvalidField { field: name, msg: "missing".to_string() })
        };
        let bytes = |name: &'static str| -> Result<Vec<u8>, TxError> {
            let s = field(name)?.as_str().ok_or(TxError::InvalidField {
                field: name,
                msg: "expected string".to_string(),
            })?;
            decode_b64_flexible(s).map_err(TxError::Marshal)
        };
        // gpubkey is optional on the wire: v1 burns omit it, and some SDKs
        // send it as an empty string.
        let gpubkey = match obj.get("gpubkey") {
            None => Vec::new(),
            Some(Json::String(s)) if s.is_empty() => Vec::new(),
            Some(Json::String(s)) => decode_b64_flexible(s).map_err(TxError::Marshal)?,
            Some(_) => {
                return Err(TxError::InvalidField {
                    field: "gpubkey",
                    msg: "expected string".to_string(),
                })
            }
        };
        let txindex_json = field("txindex")?;
        let txindex = txindex_json
            .as_u64()
            .or_else(|| txindex_json.as_str().and_then(|s| s.parse().ok()))
            .ok_or(TxError::InvalidField { field: "txindex", msg: "expected u32".to_string() })?
            as u32;
        Ok(Self {
            txid: bytes("txid")?,
            txindex,
            amount: u256_from_json(field("amount")?).map_err(TxError::Marshal)?,
            payload: bytes("payload")?,
            phash: b32_from_json(field("phash")?).map_err(TxError::Marshal)?,
            to: field("to")?
                .as_str()
                .ok_or(TxError::InvalidField { field: "to", msg: "expected string".to_string() })?
                .to_string(),
            nonce: b32_from_json(field("nonce")?).map_err(TxError::Marshal)?,
            nhash: b32_from_json(field("nhash")?).map_err(TxError::Marshal)?,
            gpubkey,
            ghash: b32_from_json(field("ghash")?).map_err(TxError::Marshal)?,
        })
    }

    /// Serializes the input to its JSON object form.
    pub fn to_json(&self) -> Json {
        self.to_value().to_json()
    }

    /// Checks that `phash` and `nhash` agree with the values derivable
    /// from the rest of the input. `ghash` needs the target-chain address
    /// codec and is checked by the transaction verifier instead.
    pub fn check_derived_hashes(&self) -> Result<(), TxError> {
        if self.phash != hash::phash(&self.payload) {
            return Err(TxError::HashMismatch { field: "phash" });
        }
        if self.nhash != hash::nhash(&self.nonce, &self.txid, self.txindex) {
            return Err(TxError::HashMismatch { field: "nhash" });
        }
        Ok(())
    }
}

/// The output record filled in by the Darknodes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LockMintBurnReleaseOutput {
    /// The minted or released amount, net of fees.
    pub amount: Option<U256>,
    /// The 65-byte signature, `r ‖ s ‖ v`.
    pub sig: Option<Vec<u8>>,
    /// The revert reason, when the Darknodes rejected the transaction.
    pub revert: Option<String>,
}

impl LockMintBurnReleaseOutput {
    /// True when the Darknodes have not produced any output yet.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.sig.is_none() && self.revert.is_none()
    }

    /// Serializes the output to its JSON object form. An empty output is
    /// an empty object.
    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        if let Some(amount) = &self.amount {
            map.insert("amount".to_string(), json!(amount.to_string()));
        }
        if let Some(sig) = &self.sig {
            map.insert("sig".to_string(), json!(B64URL.encode(sig)));
        }
        if let Some(revert) = &self.revert {
            map.insert("revert".to_string(), json!(revert));
        }
        Json::Object(map)
    }

    /// Parses the output from its JSON object form. Absent fields stay
    /// `None`; an absent or empty object is the empty output.
    pub fn from_json(v: &Json) -> Result<Self, TxError> {
        let obj = match v {
            Json::Null => return Ok(Self::default()),
            Json::Object(obj) => obj,
            _ => {
                return Err(TxError::InvalidField {
                    field: "out",
                    msg: "expected object".to_string(),
                })
            }
        };
        let amount = match obj.get("amount") {
            Some(a) => Some(u256_from_json(a).map_err(TxError::Marshal)?),
            None => None,
        };
        let sig = match obj.get("sig") {
            Some(Json::String(s)) if !s.is_empty() => {
                let bytes = decode_b64_flexible(s).map_err(TxError::Marshal)?;
                if bytes.len() != 65 {
                    return Err(TxError::InvalidField {
                        field: "sig",
                        msg: format!("expected 65 bytes, got {}", bytes.len()),
                    });
                }
                Some(bytes)
            }
            _ => None,
        };
        let revert = obj.get("revert").and_then(Json::as_str).map(str::to_string);
        Ok(Self { amount, sig, revert: revert.filter(|r| !r.is_empty()) })
    }

    /// Converts the output into its tagged-value record.
    pub fn to_value(&self) -> Value {
        let mut fields = Vec::new();
        if let Some(amount) = &self.amount {
            fields.push(("amount".to_string(), Value::U256(*amount)));
        }
        if let Some(sig) = &self.sig {
            fields.push(("sig".to_string(), Value::Bytes(sig.clone())));
        }
        if let Some(revert) = &self.revert {
            fields.push(("revert".to_string(), Value::Str(revert.clone())));
        }
        Value::Record(fields)
    }
}

/// An immutable v1 transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The wire-format version the submission arrived in.
    pub version: Version,
    /// The content-addressed hash over `(version, selector, input)`.
    pub hash: TxHash,
    /// The cross-chain selector.
    pub selector: Selector,
    /// The typed input record.
    pub input: LockMintBurnReleaseInput,
    /// The output record, empty until the Darknodes fill it.
    pub output: LockMintBurnReleaseOutput,
}

impl Transaction {
    /// Builds a transaction, computing its hash from the other fields.
    pub fn new(
        version: Version,
        selector: Selector,
        input: LockMintBurnReleaseInput,
    ) -> Result<Self, TxError> {
        let hash = TxHash(hash::tx_hash(version.as_str(), &selector, &input.to_value())?);
        Ok(Self { version, hash, selector, input, output: LockMintBurnReleaseOutput::default() })
    }

    /// Recomputes the content hash and compares it with the stored one.
    pub fn verify_hash(&self) -> Result<(), TxError> {
        let expected =
            TxHash(hash::tx_hash(self.version.as_str(), &self.selector, &self.input.to_value())?);
        if expected != self.hash {
            return Err(TxError::HashMismatch { field: "hash" });
        }
        Ok(())
    }

    /// Serializes the transaction to its JSON wire form.
    pub fn to_json(&self) -> Json {
        json!({
            "version": self.version.as_str(),
            "hash": self.hash.to_string(),
            "selector": self.selector.as_str(),
            "in": self.input.to_json(),
            "out": self.output.to_json(),
        })
    }

    /// Parses a transaction from its JSON wire form, recomputing and
    /// checking the hash when one is present.
    pub fn from_json(v: &Json) -> Result<Self, TxError> {
        let obj = v.as_object().ok_or(TxError::InvalidField {
            field: "tx",
            msg: "expected object".to_string(),
        })?;
        let version = match obj.get("version").and_then(Json::as_str) {
            Some("0") => Version::V0,
            // Old SDKs omit the version on v1 submissions.
            Some("1") | None => Version::V1,
            Some(other) => {
                return Err(TxError::InvalidField {
                    field: "version",
                    msg: format!("unknown version {other:?}"),
                })
            }
        };
        let selector_str = obj.get("selector").and_then(Json::as_str).ok_or(
            TxError::InvalidField { field: "selector", msg: "missing".to_string() },
        )?;
        let selector = Selector::new(selector_str)?;
        let input = LockMintBurnReleaseInput::from_json(obj.get("in").ok_or(
            TxError::InvalidField { field: "in", msg: "missing".to_string() },
        )?)?;
        let output = match obj.get("out") {
            Some(out) => LockMintBurnReleaseOutput::from_json(out)?,
            None => LockMintBurnReleaseOutput::default(),
        };
        let mut tx = Transaction::new(version, selector, input)?;
        tx.output = output;
        if let Some(Json::String(claimed)) = obj.get("hash") {
            let claimed = TxHash::from_b64(claimed).map_err(TxError::Marshal)?;
            if claimed != tx.hash {
                return Err(TxError::HashMismatch { field: "hash" });
            }
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{nhash, phash};

    fn sample_input() -> LockMintBurnReleaseInput {
        let payload = b"sample payload".to_vec();
        let nonce = [5u8; 32];
        let txid = vec![9u8; 32];
        let txindex = 1;
        LockMintBurnReleaseInput {
            phash: phash(&payload),
            nhash: nhash(&nonce, &txid, txindex),
            txid,
            txindex,
            amount: U256::from(10_000u64),
            payload,
            to: "0x7DDFA2e5435027f6e13Ca8Db2f32ebd5551158Bb".to_string(),
            nonce,
            gpubkey: vec![2u8; 33],
            ghash: [8u8; 32],
        }
    }

    #[test]
    fn hash_is_deterministic_and_unique_per_input() {
        let sel = Selector::new("BTC/toEthereum").unwrap();
        let tx1 = Transaction::new(Version::V1, sel.clone(), sample_input()).unwrap();
        let tx2 = Transaction::new(Version::V1, sel.clone(), sample_input()).unwrap();
        assert_eq!(tx1.hash, tx2.hash);

        let mut other = sample_input();
        other.txindex = 2;
        let tx3 = Transaction::new(Version::V1, sel, other).unwrap();
        assert_ne!(tx1.hash, tx3.hash);
    }

    #[test]
    fn verify_hash_detects_tampering() {
        let sel = Selector::new("BTC/toEthereum").unwrap();
        let mut tx = Transaction::new(Version::V1, sel, sample_input()).unwrap();
        tx.verify_hash().unwrap();
        tx.input.amount = U256::from(1u64);
        assert!(matches!(tx.verify_hash(), Err(TxError::HashMismatch { .. })));
    }

    #[test]
    fn derived_hash_checks() {
        let mut input = sample_input();
        input.check_derived_hashes().unwrap();
        input.nhash = [0u8; 32];
        assert!(matches!(
            input.check_derived_hashes(),
            Err(TxError::HashMismatch { field: "nhash" })
        ));
    }

    #[test]
    fn json_roundtrip_preserves_hash() {
        let sel = Selector::new("BTC/fromEthereum").unwrap();
        let mut input = sample_input();
        input.gpubkey = Vec::new();
        let tx = Transaction::new(Version::V1, sel, input).unwrap();
        let json = tx.to_json();
        let back = Transaction::from_json(&json).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn json_with_wrong_claimed_hash_is_rejected() {
        let sel = Selector::new("BTC/toEthereum").unwrap();
        let tx = Transaction::new(Version::V1, sel, sample_input()).unwrap();
        let mut json = tx.to_json();
        json["hash"] = serde_json::json!(TxHash([1u8; 32]).to_string());
        assert!(matches!(
            Transaction::from_json(&json),
            Err(TxError::HashMismatch { .. })
        ));
    }

    #[test]
    fn output_json_roundtrip() {
        let out = LockMintBurnReleaseOutput {
            amount: Some(U256::from(9_975u64)),
            sig: Some(vec![1u8; 65]),
            revert: None,
        };
        let back = LockMintBurnReleaseOutput::from_json(&out.to_json()).unwrap();
        assert_eq!(out, back);
        assert!(LockMintBurnReleaseOutput::from_json(&serde_json::json!({})).unwrap().is_empty());
    }

    #[test]
    fn tx_hash_display_is_base64_url_no_pad() {
        let h = TxHash([0xffu8; 32]);
        let s = h.to_string();
        assert!(!s.contains('='));
        assert!(!s.contains('+'));
        assert!(!s.contains('/'));
        assert_eq!(TxHash::from_b64(&s).unwrap(), h);
        // Standard-alphabet input is accepted too.
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let std = STANDARD.encode([0xffu8; 32]);
        assert_eq!(TxHash::from_b64(&std).unwrap(), h);
    }
}
