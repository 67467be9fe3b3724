// Path: crates/compat/src/v0.rs
//! The legacy v0 transaction model and codec.
//!
//! A v0 transaction names a contract (`BTC0Btc2Eth`) and carries ordered
//! argument lists (`in`, `autogen`, `out`) of `{name, type, value}`
//! triples. Lookup is by name and runs in linear time; the lists are
//! short. On the wire, byte-ish values use the standard base64 alphabet
//! (v1 uses URL-safe), and Ethereum addresses are bare hex.

use crate::error::CompatError;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use lightnode_types::value::{
    decode_b64_flexible, u256_from_json, ExtBtcCompatUtxo, ExtEthCompatPayload, Value,
};
use serde_json::{json, Map, Value as Json};

/// One named, typed argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V0Arg {
    /// The argument name (`p`, `token`, `to`, `n`, `utxo`, `ref`, ...).
    pub name: String,
    /// The wire type name (`b32`, `ext_btcCompatUTXO`, ...).
    pub ty: String,
    /// The value.
    pub value: Value,
}

impl V0Arg {
    /// Convenience constructor.
    pub fn new(name: &str, ty: &str, value: Value) -> Self {
        Self { name: name.to_string(), ty: ty.to_string(), value }
    }
}

/// A legacy v0 transaction.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct V0Tx {
    /// The v0 content hash (standard base64 on the wire).
    pub hash: [u8; 32],
    /// The legacy contract name.
    pub to: String,
    /// User-supplied arguments.
    pub input: Vec<V0Arg>,
    /// Arguments derived by the gateway or Darknodes.
    pub autogen: Vec<V0Arg>,
    /// Darknode outputs.
    pub out: Vec<V0Arg>,
}

impl V0Tx {
    /// Finds an argument by name in the `in` list.
    pub fn arg(&self, name: &str) -> Option<&V0Arg> {
        self.input.iter().find(|a| a.name == name)
    }

    /// Parses a v0 transaction from its JSON wire form.
    pub fn from_json(v: &Json) -> Result<Self, CompatError> {
        let obj = v
            .as_object()
            .ok_or_else(|| CompatError::Abi("expected tx object".to_string()))?;
        let to = obj
            .get("to")
            .and_then(Json::as_str)
            .ok_or_else(|| CompatError::Abi("missing contract name".to_string()))?
            .to_string();
        let hash = match obj.get("hash").and_then(Json::as_str) {
            Some(s) => {
                let bytes = decode_b64_flexible(s)?;
                bytes.as_slice().try_into().map_err(|_| {
                    CompatError::Corrupt(format!("v0 hash has {} bytes", bytes.len()))
                })?
            }
            None => [0u8; 32],
        };
        Ok(Self {
            hash,
            to,
            input: args_from_json(obj.get("in"))?,
            autogen: args_from_json(obj.get("autogen"))?,
            out: args_from_json(obj.get("out"))?,
        })
    }

    /// Serializes the transaction to its JSON wire form.
    pub fn to_json(&self) -> Json {
        json!({
            "hash": B64.encode(self.hash),
            "to": self.to,
            "in": args_to_json(&self.input),
            "autogen": args_to_json(&self.autogen),
            "out": args_to_json(&self.out),
        })
    }

    /// Marshals the transaction with the canonical binary layout: the
    /// contract name, then each argument list as a count followed by
    /// `name ‖ type ‖ value`. List values have no canonical binary form
    /// and are rejected.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, CompatError> {
        let mut out = Vec::with_capacity(256);
        Value::Str(self.to.clone()).marshal_into(&mut out)?;
        for section in [&self.input, &self.autogen, &self.out] {
            out.extend_from_slice(&(section.len() as u32).to_le_bytes());
            for arg in section {
                if matches!(arg.value, Value::List(_)) {
                    return Err(CompatError::ListNotSerializable);
                }
                Value::Str(arg.name.clone()).marshal_into(&mut out)?;
                Value::Str(arg.ty.clone()).marshal_into(&mut out)?;
                arg.value.marshal_into(&mut out)?;
            }
        }
        Ok(out)
    }
}

fn args_from_json(v: Option<&Json>) -> Result<Vec<V0Arg>, CompatError> {
    let arr = match v {
        Some(Json::Array(arr)) => arr,
        Some(Json::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(CompatError::Abi(format!(
                "expected argument array, got {other}"
            )))
        }
    };
    arr.iter()
        .map(|item| {
            let obj = item
                .as_object()
                .ok_or_else(|| CompatError::Abi("expected argument object".to_string()))?;
            let name = obj
                .get("name")
                .and_then(Json::as_str)
                .ok_or_else(|| CompatError::Abi("argument missing name".to_string()))?;
            let ty = obj
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| CompatError::Abi(format!("argument {name:?} missing type")))?;
            let value = obj
                .get("value")
                .ok_or_else(|| CompatError::Abi(format!("argument {name:?} missing value")))?;
            Ok(V0Arg {
                name: name.to_string(),
                ty: ty.to_string(),
                value: value_from_v0_json(ty, value)?,
            })
        })
        .collect()
}

fn args_to_json(args: &[V0Arg]) -> Json {
    Json::Array(
        args.iter()
            .map(|arg| {
                json!({
                    "name": arg.name,
                    "type": arg.ty,
                    "value": value_to_v0_json(&arg.value),
                })
            })
            .collect(),
    )
}

/// Parses a value in v0 JSON conventions, discriminated by the type name.
pub fn value_from_v0_json(ty: &str, v: &Json) -> Result<Value, CompatError> {
    Ok(match ty {
        "address" | "str" | "string" => Value::Str(
            v.as_str()
                .ok_or_else(|| CompatError::Abi(format!("{ty}: expected string")))?
                .to_string(),
        ),
        "b32" => Value::B32(lightnode_types::value::b32_from_json(v)?),
        "b" => Value::Bytes(decode_b64_flexible(
            v.as_str().ok_or_else(|| CompatError::Abi("b: expected string".to_string()))?,
        )?),
        "u32" => Value::U32(uint_json(v, "u32")? as u32),
        "u64" => Value::U64(uint_json(v, "u64")?),
        "u256" => Value::U256(u256_from_json(v)?),
        "ext_ethCompatAddress" => {
            let s = v
                .as_str()
                .ok_or_else(|| CompatError::Abi("ext_ethCompatAddress: expected string".into()))?;
            let stripped = s.strip_prefix("0x").unwrap_or(s);
            let bytes = hex::decode(stripped)
                .map_err(|e| CompatError::Abi(format!("ext_ethCompatAddress: {e}")))?;
            let arr: [u8; 20] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CompatError::Abi("ext_ethCompatAddress: want 20 bytes".into()))?;
            Value::EthAddress(arr)
        }
        "ext_btcCompatUTXO" => Value::BtcUtxo(utxo_from_v0_json(v)?),
        "ext_btcCompatUTXOs" => {
            let arr = v
                .as_array()
                .ok_or_else(|| CompatError::Abi("ext_btcCompatUTXOs: expected array".into()))?;
            Value::BtcUtxoList(
                arr.iter().map(utxo_from_v0_json).collect::<Result<Vec<_>, _>>()?,
            )
        }
        "ext_ethCompatTx" => {
            let obj = v
                .as_object()
                .ok_or_else(|| CompatError::Abi("ext_ethCompatTx: expected object".into()))?;
            let tx_hash = lightnode_types::value::b32_from_json(
                obj.get("txHash")
                    .ok_or_else(|| CompatError::Abi("ext_ethCompatTx: missing txHash".into()))?,
            )?;
            Value::EthTx(lightnode_types::value::ExtEthCompatTx { tx_hash })
        }
        "ext_ethCompatPayload" => {
            let obj = v
                .as_object()
                .ok_or_else(|| CompatError::Abi("ext_ethCompatPayload: expected object".into()))?;
            let get = |name: &str| -> Result<Vec<u8>, CompatError> {
                match obj.get(name).and_then(Json::as_str) {
                    Some(s) if !s.is_empty() => Ok(decode_b64_flexible(s)?),
                    _ => Ok(Vec::new()),
                }
            };
            Value::EthPayload(ExtEthCompatPayload {
                abi: get("abi")?,
                value: get("value")?,
                func: get("fn")?,
            })
        }
        other => return Err(CompatError::Abi(format!("unknown v0 type {other:?}"))),
    })
}

/// Serializes a value in v0 JSON conventions: standard base64 for bytes,
/// bare hex for Ethereum addresses, decimal strings for wide integers.
pub fn value_to_v0_json(value: &Value) -> Json {
    match value {
        Value::Address(s) | Value::Str(s) => json!(s),
        Value::B32(b) => json!(B64.encode(b)),
        Value::Bytes(b) => json!(B64.encode(b)),
        Value::U8(x) => json!(x),
        Value::U16(x) => json!(x),
        Value::U32(x) => json!(x),
        Value::U64(x) => json!(x.to_string()),
        Value::U128(x) => json!(x.to_string()),
        Value::U256(x) => json!(x.to_string()),
        Value::I8(x) => json!(x),
        Value::I16(x) => json!(x),
        Value::I32(x) => json!(x),
        Value::I64(x) => json!(x.to_string()),
        Value::I128(x) => json!(x.to_string()),
        Value::I256(x) => json!(x.to_string()),
        Value::Record(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, v) in fields {
                map.insert(name.clone(), value_to_v0_json(v));
            }
            Json::Object(map)
        }
        Value::List(items) => Json::Array(items.iter().map(value_to_v0_json).collect()),
        Value::EthAddress(a) => json!(hex::encode(a)),
        Value::BtcUtxo(u) => {
            json!({ "txHash": B64.encode(u.tx_hash), "vOut": u.v_out })
        }
        Value::BtcUtxoList(us) => Json::Array(
            us.iter()
                .map(|u| json!({ "txHash": B64.encode(u.tx_hash), "vOut": u.v_out }))
                .collect(),
        ),
        Value::EthTx(t) => json!({ "txHash": B64.encode(t.tx_hash) }),
        Value::EthPayload(p) => json!({
            "abi": B64.encode(&p.abi),
            "value": B64.encode(&p.value),
            "fn": B64.encode(&p.func),
        }),
    }
}

fn uint_json(v: &Json, what: &str) -> Result<u64, CompatError> {
    match v {
        Json::Number(n) => {
            n.as_u64().ok_or_else(|| CompatError::Abi(format!("{what}: {n} out of range")))
        }
        Json::String(s) => {
            s.parse::<u64>().map_err(|e| CompatError::Abi(format!("{what} {s:?}: {e}")))
        }
        other => Err(CompatError::Abi(format!("{what}: expected number, got {other}"))),
    }
}

fn utxo_from_v0_json(v: &Json) -> Result<ExtBtcCompatUtxo, CompatError> {
    let obj = v
        .as_object()
        .ok_or_else(|| CompatError::Abi("ext_btcCompatUTXO: expected object".into()))?;
    let tx_hash = lightnode_types::value::b32_from_json(
        obj.get("txHash")
            .ok_or_else(|| CompatError::Abi("ext_btcCompatUTXO: missing txHash".into()))?,
    )?;
    let v_out = match obj.get("vOut") {
        Some(x) => uint_json(x, "vOut")? as u32,
        None => 0,
    };
    Ok(ExtBtcCompatUtxo { tx_hash, v_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn sample_lock_json() -> Json {
        json!({
            "to": "BTC0Btc2Eth",
            "in": [
                {"name": "p", "type": "ext_ethCompatPayload",
                 "value": {"abi": B64.encode(b"[]"), "value": B64.encode(b"args"), "fn": B64.encode(b"mint")}},
                {"name": "token", "type": "ext_ethCompatAddress",
                 "value": "0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f"},
                {"name": "to", "type": "ext_ethCompatAddress",
                 "value": "7DDFA2e5435027f6e13Ca8Db2f32ebd5551158Bb"},
                {"name": "n", "type": "b32", "value": B64.encode([7u8; 32])},
                {"name": "utxo", "type": "ext_btcCompatUTXO",
                 "value": {"txHash": B64.encode([9u8; 32]), "vOut": 0}}
            ]
        })
    }

    #[test]
    fn parses_sample_lock_tx() {
        let tx = V0Tx::from_json(&sample_lock_json()).unwrap();
        assert_eq!(tx.to, "BTC0Btc2Eth");
        assert_eq!(tx.input.len(), 5);
        assert!(matches!(tx.arg("utxo").unwrap().value, Value::BtcUtxo(_)));
        assert!(matches!(tx.arg("n").unwrap().value, Value::B32(_)));
        match &tx.arg("p").unwrap().value {
            Value::EthPayload(p) => {
                assert_eq!(p.abi, b"[]");
                assert_eq!(p.value, b"args");
                assert_eq!(p.func, b"mint");
            }
            other => panic!("unexpected payload value {other:?}"),
        }
    }

    #[test]
    fn json_roundtrip() {
        let tx = V0Tx::from_json(&sample_lock_json()).unwrap();
        let back = V0Tx::from_json(&tx.to_json()).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn vout_accepts_string_or_number() {
        let a = value_from_v0_json("ext_btcCompatUTXO", &json!({"txHash": B64.encode([1u8;32]), "vOut": 3}))
            .unwrap();
        let b = value_from_v0_json("ext_btcCompatUTXO", &json!({"txHash": B64.encode([1u8;32]), "vOut": "3"}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(
            value_from_v0_json("ext_solCompatThing", &json!(null)),
            Err(CompatError::Abi(_))
        ));
    }

    #[test]
    fn binary_marshal_rejects_lists() {
        let mut tx = V0Tx::from_json(&sample_lock_json()).unwrap();
        tx.marshal_binary().unwrap();
        tx.input.push(V0Arg::new("xs", "list", Value::List(vec![Value::U8(1)])));
        assert!(matches!(tx.marshal_binary(), Err(CompatError::ListNotSerializable)));
    }

    #[test]
    fn missing_hash_defaults_to_zero() {
        let tx = V0Tx::from_json(&sample_lock_json()).unwrap();
        assert_eq!(tx.hash, [0u8; 32]);
    }
}
