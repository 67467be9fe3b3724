// Path: crates/types/src/value.rs
//! The tagged value model behind both wire-format protocol versions.
//!
//! Values are a closed sum over scalars, byte strings, records, lists, and
//! the five extended compatibility tags. Each variant carries a stable
//! binary tag, a JSON representation discriminated by a type name, and a
//! canonical binary encoding with hard upper bounds on every
//! variable-length field. The canonical encoding is what the
//! content-addressed transaction hash is computed over, so record fields
//! are always marshalled in lexicographic name order, never in insertion
//! order.
//!
//! The concrete record shapes used by the gateway
//! (`LockMintBurnReleaseInput`, `ExtBtcCompatUtxo`, ...) are surfaced as
//! structs elsewhere; this module is the serialization front end only.

use crate::error::ValueError;
use crate::{
    MAX_ADDRESS_BYTES, MAX_BYTES_LEN, MAX_FIELD_NAME_BYTES, MAX_LIST_LEN, MAX_RECORD_FIELDS,
    MAX_STRING_BYTES, MAX_UTXO_LIST_LEN,
};
use base64::engine::general_purpose::{STANDARD as B64, URL_SAFE_NO_PAD as B64URL};
use base64::Engine as _;
use primitive_types::U256;
use serde_json::{json, Map, Value as Json};

// Binary tag constants. These are part of the canonical encoding and must
// never be reordered.
const TAG_ADDRESS: u8 = 0x01;
const TAG_STR: u8 = 0x02;
const TAG_B32: u8 = 0x03;
const TAG_BYTES: u8 = 0x04;
const TAG_U8: u8 = 0x05;
const TAG_U16: u8 = 0x06;
const TAG_U32: u8 = 0x07;
const TAG_U64: u8 = 0x08;
const TAG_U128: u8 = 0x09;
const TAG_U256: u8 = 0x0a;
const TAG_I8: u8 = 0x0b;
const TAG_I16: u8 = 0x0c;
const TAG_I32: u8 = 0x0d;
const TAG_I64: u8 = 0x0e;
const TAG_I128: u8 = 0x0f;
const TAG_I256: u8 = 0x10;
const TAG_RECORD: u8 = 0x11;
const TAG_LIST: u8 = 0x12;
const TAG_ETH_ADDRESS: u8 = 0x13;
const TAG_BTC_UTXO: u8 = 0x14;
const TAG_BTC_UTXO_LIST: u8 = 0x15;
const TAG_ETH_TX: u8 = 0x16;
const TAG_ETH_PAYLOAD: u8 = 0x17;

/// A signed 256-bit integer, stored as a sign flag plus magnitude.
///
/// `primitive_types` has no signed 256-bit type; the wire encoding is an
/// explicit sign byte followed by the big-endian magnitude anyway, so this
/// representation maps onto it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct I256 {
    /// True when the value is negative.
    pub negative: bool,
    /// The absolute value.
    pub magnitude: U256,
}

impl I256 {
    /// The zero value. Zero is canonically non-negative.
    pub fn zero() -> Self {
        Self { negative: false, magnitude: U256::zero() }
    }

    /// Parses a decimal string with an optional leading minus sign.
    pub fn from_dec_str(s: &str) -> Result<Self, ValueError> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let magnitude = U256::from_dec_str(digits)
            .map_err(|e| ValueError::InvalidInteger(format!("{s:?}: {e}")))?;
        // Normalise -0 to 0 so equality stays structural.
        Ok(Self { negative: negative && !magnitude.is_zero(), magnitude })
    }
}

impl std::fmt::Display for I256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

/// A Bitcoin-family transaction output reference (`ext_btcCompatUTXO`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ExtBtcCompatUtxo {
    /// The transaction hash, in the byte order it was transmitted.
    pub tx_hash: [u8; 32],
    /// The output index within the transaction.
    pub v_out: u32,
}

/// An Ethereum-family transaction reference (`ext_ethCompatTx`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ExtEthCompatTx {
    /// The transaction hash.
    pub tx_hash: [u8; 32],
}

/// An ABI-shaped contract payload (`ext_ethCompatPayload`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ExtEthCompatPayload {
    /// The ABI fragment describing the called function.
    pub abi: Vec<u8>,
    /// The ABI-encoded argument bytes.
    pub value: Vec<u8>,
    /// The function name.
    pub func: Vec<u8>,
}

/// A runtime type descriptor, used to drive JSON unmarshalling where the
/// wire carries no discriminator (plain objects keyed by a known schema).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// A chain address, as a string.
    Address,
    /// A UTF-8 string.
    Str,
    /// A fixed 32-byte array.
    B32,
    /// A variable-length byte string.
    Bytes,
    /// Unsigned integers of the named width.
    U8,
    /// 16-bit unsigned.
    U16,
    /// 32-bit unsigned.
    U32,
    /// 64-bit unsigned.
    U64,
    /// 128-bit unsigned.
    U128,
    /// 256-bit unsigned.
    U256,
    /// Signed integers of the named width.
    I8,
    /// 16-bit signed.
    I16,
    /// 32-bit signed.
    I32,
    /// 64-bit signed.
    I64,
    /// 128-bit signed.
    I128,
    /// 256-bit signed.
    I256,
    /// A record with a declared field schema.
    Record(Vec<(String, Type)>),
    /// A homogeneous list.
    List(Box<Type>),
    /// A 20-byte Ethereum-compatible address.
    EthAddress,
    /// A Bitcoin-compatible UTXO reference.
    BtcUtxo,
    /// An array of Bitcoin-compatible UTXO references.
    BtcUtxoList,
    /// An Ethereum-compatible transaction reference.
    EthTx,
    /// An Ethereum-compatible contract payload.
    EthPayload,
}

impl Type {
    /// The wire name of this type, as used in ABI-style argument lists.
    pub fn name(&self) -> &'static str {
        match self {
            Type::Address => "address",
            Type::Str => "string",
            Type::B32 => "b32",
            Type::Bytes => "b",
            Type::U8 => "u8",
            Type::U16 => "u16",
            Type::U32 => "u32",
            Type::U64 => "u64",
            Type::U128 => "u128",
            Type::U256 => "u256",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::I128 => "i128",
            Type::I256 => "i256",
            Type::Record(_) => "record",
            Type::List(_) => "list",
            Type::EthAddress => "ext_ethCompatAddress",
            Type::BtcUtxo => "ext_btcCompatUTXO",
            Type::BtcUtxoList => "ext_btcCompatUTXOs",
            Type::EthTx => "ext_ethCompatTx",
            Type::EthPayload => "ext_ethCompatPayload",
        }
    }

    /// Resolves a scalar or extended type from its wire name. Record and
    /// list types carry structure and cannot be named alone.
    pub fn from_name(name: &str) -> Result<Type, ValueError> {
        Ok(match name {
            "address" => Type::Address,
            "string" | "str" => Type::Str,
            "b32" => Type::B32,
            "b" => Type::Bytes,
            "u8" => Type::U8,
            "u16" => Type::U16,
            "u32" => Type::U32,
            "u64" => Type::U64,
            "u128" => Type::U128,
            "u256" => Type::U256,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "i128" => Type::I128,
            "i256" => Type::I256,
            "ext_ethCompatAddress" => Type::EthAddress,
            "ext_btcCompatUTXO" => Type::BtcUtxo,
            "ext_btcCompatUTXOs" => Type::BtcUtxoList,
            "ext_ethCompatTx" => Type::EthTx,
            "ext_ethCompatPayload" => Type::EthPayload,
            other => return Err(ValueError::UnknownTypeName(other.to_string())),
        })
    }
}

/// A value of the tagged sum.
#[derive(Clone, Debug)]
pub enum Value {
    /// A chain address.
    Address(String),
    /// A UTF-8 string.
    Str(String),
    /// A fixed 32-byte array.
    B32([u8; 32]),
    /// A variable-length byte string.
    Bytes(Vec<u8>),
    /// 8-bit unsigned.
    U8(u8),
    /// 16-bit unsigned.
    U16(u16),
    /// 32-bit unsigned.
    U32(u32),
    /// 64-bit unsigned.
    U64(u64),
    /// 128-bit unsigned.
    U128(u128),
    /// 256-bit unsigned.
    U256(U256),
    /// 8-bit signed.
    I8(i8),
    /// 16-bit signed.
    I16(i16),
    /// 32-bit signed.
    I32(i32),
    /// 64-bit signed.
    I64(i64),
    /// 128-bit signed.
    I128(i128),
    /// 256-bit signed.
    I256(I256),
    /// A record of named fields. Insertion order is preserved for JSON
    /// output; hashing and the binary codec always use lexicographic order.
    Record(Vec<(String, Value)>),
    /// A homogeneous list.
    List(Vec<Value>),
    /// A 20-byte Ethereum-compatible address.
    EthAddress([u8; 20]),
    /// A Bitcoin-compatible UTXO reference.
    BtcUtxo(ExtBtcCompatUtxo),
    /// An array of Bitcoin-compatible UTXO references.
    BtcUtxoList(Vec<ExtBtcCompatUtxo>),
    /// An Ethereum-compatible transaction reference.
    EthTx(ExtEthCompatTx),
    /// An Ethereum-compatible contract payload.
    EthPayload(ExtEthCompatPayload),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Address(a), Address(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (B32(a), B32(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (U128(a), U128(b)) => a == b,
            (U256(a), U256(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (I128(a), I128(b)) => a == b,
            (I256(a), I256(b)) => a == b,
            // Records compare by key set, independent of insertion order.
            (Record(a), Record(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(name, va)| {
                        b.iter().any(|(n, vb)| n == name && vb == va)
                    })
            }
            (List(a), List(b)) => a == b,
            (EthAddress(a), EthAddress(b)) => a == b,
            (BtcUtxo(a), BtcUtxo(b)) => a == b,
            (BtcUtxoList(a), BtcUtxoList(b)) => a == b,
            (EthTx(a), EthTx(b)) => a == b,
            (EthPayload(a), EthPayload(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    /// The binary tag for this value.
    fn tag(&self) -> u8 {
        match self {
            Value::Address(_) => TAG_ADDRESS,
            Value::Str(_) => TAG_STR,
            Value::B32(_) => TAG_B32,
            Value::Bytes(_) => TAG_BYTES,
            Value::U8(_) => TAG_U8,
            Value::U16(_) => TAG_U16,
            Value::U32(_) => TAG_U32,
            Value::U64(_) => TAG_U64,
            Value::U128(_) => TAG_U128,
            Value::U256(_) => TAG_U256,
            Value::I8(_) => TAG_I8,
            Value::I16(_) => TAG_I16,
            Value::I32(_) => TAG_I32,
            Value::I64(_) => TAG_I64,
            Value::I128(_) => TAG_I128,
            Value::I256(_) => TAG_I256,
            Value::Record(_) => TAG_RECORD,
            Value::List(_) => TAG_LIST,
            Value::EthAddress(_) => TAG_ETH_ADDRESS,
            Value::BtcUtxo(_) => TAG_BTC_UTXO,
            Value::BtcUtxoList(_) => TAG_BTC_UTXO_LIST,
            Value::EthTx(_) => TAG_ETH_TX,
            Value::EthPayload(_) => TAG_ETH_PAYLOAD,
        }
    }

    /// The wire type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Address(_) => "address",
            Value::Str(_) => "string",
            Value::B32(_) => "b32",
            Value::Bytes(_) => "b",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::U128(_) => "u128",
            Value::U256(_) => "u256",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::I128(_) => "i128",
            Value::I256(_) => "i256",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::EthAddress(_) => "ext_ethCompatAddress",
            Value::BtcUtxo(_) => "ext_btcCompatUTXO",
            Value::BtcUtxoList(_) => "ext_btcCompatUTXOs",
            Value::EthTx(_) => "ext_ethCompatTx",
            Value::EthPayload(_) => "ext_ethCompatPayload",
        }
    }

    /// Looks up a field of a record by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => {
                fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    // ---- canonical binary codec ----

    /// Marshals this value into `out` using the canonical binary encoding:
    /// a tag byte, then the payload. Length prefixes are u32 little-endian;
    /// fixed-width integers are little-endian; 128/256-bit integers are a
    /// sign byte followed by the big-endian magnitude padded to width.
    pub fn marshal_into(&self, out: &mut Vec<u8>) -> Result<(), ValueError> {
        out.push(self.tag());
        match self {
            Value::Address(s) => {
                bound("address", s.len(), MAX_ADDRESS_BYTES)?;
                put_bytes(out, s.as_bytes());
            }
            Value::Str(s) => {
                bound("string", s.len(), MAX_STRING_BYTES)?;
                put_bytes(out, s.as_bytes());
            }
            Value::B32(b) => out.extend_from_slice(b),
            Value::Bytes(b) => {
                bound("byte string", b.len(), MAX_BYTES_LEN)?;
                put_bytes(out, b);
            }
            Value::U8(x) => out.push(*x),
            Value::U16(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::U32(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::U64(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::U128(x) => {
                out.push(0);
                out.extend_from_slice(&x.to_be_bytes());
            }
            Value::U256(x) => {
                out.push(0);
                let mut buf = [0u8; 32];
                x.to_big_endian(&mut buf);
                out.extend_from_slice(&buf);
            }
            Value::I8(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::I16(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::I32(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::I64(x) => out.extend_from_slice(&x.to_le_bytes()),
            Value::I128(x) => {
                out.push(u8::from(*x < 0));
                out.extend_from_slice(&x.unsigned_abs().to_be_bytes());
            }
            Value::I256(x) => {
                out.push(u8::from(x.negative));
                let mut buf = [0u8; 32];
                x.magnitude.to_big_endian(&mut buf);
                out.extend_from_slice(&buf);
            }
            Value::Record(fields) => {
                bound("record", fields.len(), MAX_RECORD_FIELDS)?;
                let mut sorted: Vec<&(String, Value)> = fields.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                put_u32(out, sorted.len() as u32);
                for (name, value) in sorted {
                    bound("field name", name.len(), MAX_FIELD_NAME_BYTES)?;
                    put_bytes(out, name.as_bytes());
                    value.marshal_into(out)?;
                }
            }
            Value::List(items) => {
                bound("list", items.len(), MAX_LIST_LEN)?;
                put_u32(out, items.len() as u32);
                for item in items {
                    item.marshal_into(out)?;
                }
            }
            Value::EthAddress(a) => out.extend_from_slice(a),
            Value::BtcUtxo(u) => {
                out.extend_from_slice(&u.tx_hash);
                out.extend_from_slice(&u.v_out.to_le_bytes());
            }
            Value::BtcUtxoList(us) => {
                bound("utxo list", us.len(), MAX_UTXO_LIST_LEN)?;
                put_u32(out, us.len() as u32);
                for u in us {
                    out.extend_from_slice(&u.tx_hash);
                    out.extend_from_slice(&u.v_out.to_le_bytes());
                }
            }
            Value::EthTx(t) => out.extend_from_slice(&t.tx_hash),
            Value::EthPayload(p) => {
                bound("payload abi", p.abi.len(), MAX_BYTES_LEN)?;
                bound("payload value", p.value.len(), MAX_BYTES_LEN)?;
                bound("payload fn", p.func.len(), MAX_BYTES_LEN)?;
                put_bytes(out, &p.abi);
                put_bytes(out, &p.value);
                put_bytes(out, &p.func);
            }
        }
        Ok(())
    }

    /// Marshals this value to a fresh buffer.
    pub fn marshal(&self) -> Result<Vec<u8>, ValueError> {
        let mut out = Vec::with_capacity(64);
        self.marshal_into(&mut out)?;
        Ok(out)
    }

    /// Unmarshals a single value from the front of `buf`, returning the
    /// value and the remaining bytes. Every bound enforced by
    /// [`Value::marshal_into`] is enforced here too.
    pub fn unmarshal(buf: &[u8]) -> Result<(Value, &[u8]), ValueError> {
        let (&tag, rest) = buf.split_first().ok_or(ValueError::UnexpectedEnd("tag"))?;
        match tag {
            TAG_ADDRESS => {
                let (bytes, rest) = take_bytes(rest, "address", MAX_ADDRESS_BYTES)?;
                Ok((Value::Address(utf8(bytes)?), rest))
            }
            TAG_STR => {
                let (bytes, rest) = take_bytes(rest, "string", MAX_STRING_BYTES)?;
                Ok((Value::Str(utf8(bytes)?), rest))
            }
            TAG_B32 => {
                let (arr, rest) = take_fixed::<32>(rest, "b32")?;
                Ok((Value::B32(arr), rest))
            }
            TAG_BYTES => {
                let (bytes, rest) = take_bytes(rest, "byte string", MAX_BYTES_LEN)?;
                Ok((Value::Bytes(bytes.to_vec()), rest))
            }
            TAG_U8 => {
                let (&x, rest) = rest.split_first().ok_or(ValueError::UnexpectedEnd("u8"))?;
                Ok((Value::U8(x), rest))
            }
            TAG_U16 => {
                let (arr, rest) = take_fixed::<2>(rest, "u16")?;
                Ok((Value::U16(u16::from_le_bytes(arr)), rest))
            }
            TAG_U32 => {
                let (arr, rest) = take_fixed::<4>(rest, "u32")?;
                Ok((Value::U32(u32::from_le_bytes(arr)), rest))
            }
            TAG_U64 => {
                let (arr, rest) = take_fixed::<8>(rest, "u64")?;
                Ok((Value::U64(u64::from_le_bytes(arr)), rest))
            }
            TAG_U128 => {
                let (sign, rest) = take_sign(rest, "u128")?;
                let (arr, rest) = take_fixed::<16>(rest, "u128")?;
                if sign {
                    return Err(ValueError::InvalidInteger("negative u128".into()));
                }
                Ok((Value::U128(u128::from_be_bytes(arr)), rest))
            }
            TAG_U256 => {
                let (sign, rest) = take_sign(rest, "u256")?;
                let (arr, rest) = take_fixed::<32>(rest, "u256")?;
                if sign {
                    return Err(ValueError::InvalidInteger("negative u256".into()));
                }
                Ok((Value::U256(U256::from_big_endian(&arr)), rest))
            }
            TAG_I8 => {
                let (arr, rest) = take_fixed::<1>(rest, "i8")?;
                Ok((Value::I8(i8::from_le_bytes(arr)), rest))
            }
            TAG_I16 => {
                let (arr, rest) = take_fixed::<2>(rest, "i16")?;
                Ok((Value::I16(i16::from_le_bytes(arr)), rest))
            }
            TAG_I32 => {
                let (arr, rest) = take_fixed::<4>(rest, "i32")?;
                Ok((Value::I32(i32::from_le_bytes(arr)), rest))
            }
            TAG_I64 => {
                let (arr, rest) = take_fixed::<8>(rest, "i64")?;
                Ok((Value::I64(i64::from_le_bytes(arr)), rest))
            }
            TAG_I128 => {
                let (sign, rest) = take_sign(rest, "i128")?;
                let (arr, rest) = take_fixed::<16>(rest, "i128")?;
                let magnitude = u128::from_be_bytes(arr);
                let x = if sign {
                    if magnitude > 1u128 << 127 {
                        return Err(ValueError::InvalidInteger("i128 overflow".into()));
                    }
                    (magnitude as i128).wrapping_neg()
                } else {
                    i128::try_from(magnitude)
                        .map_err(|_| ValueError::InvalidInteger("i128 overflow".into()))?
                };
                Ok((Value::I128(x), rest))
            }
            TAG_I256 => {
                let (sign, rest) = take_sign(rest, "i256")?;
                let (arr, rest) = take_fixed::<32>(rest, "i256")?;
                let magnitude = U256::from_big_endian(&arr);
                Ok((
                    Value::I256(I256 { negative: sign && !magnitude.is_zero(), magnitude }),
                    rest,
                ))
            }
            TAG_RECORD => {
                let (count, mut rest) = take_count(rest, "record", MAX_RECORD_FIELDS)?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let (name_bytes, r) = take_bytes(rest, "field name", MAX_FIELD_NAME_BYTES)?;
                    let name = utf8(name_bytes)?;
                    let (value, r) = Value::unmarshal(r)?;
                    fields.push((name, value));
                    rest = r;
                }
                Ok((Value::Record(fields), rest))
            }
            TAG_LIST => {
                let (count, mut rest) = take_count(rest, "list", MAX_LIST_LEN)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let (value, r) = Value::unmarshal(rest)?;
                    items.push(value);
                    rest = r;
                }
                Ok((Value::List(items), rest))
            }
            TAG_ETH_ADDRESS => {
                let (arr, rest) = take_fixed::<20>(rest, "eth address")?;
                Ok((Value::EthAddress(arr), rest))
            }
            TAG_BTC_UTXO => {
                let (tx_hash, rest) = take_fixed::<32>(rest, "utxo hash")?;
                let (vout_arr, rest) = take_fixed::<4>(rest, "utxo vout")?;
                Ok((
                    Value::BtcUtxo(ExtBtcCompatUtxo {
                        tx_hash,
                        v_out: u32::from_le_bytes(vout_arr),
                    }),
                    rest,
                ))
            }
            TAG_BTC_UTXO_LIST => {
                let (count, mut rest) = take_count(rest, "utxo list", MAX_UTXO_LIST_LEN)?;
                let mut utxos = Vec::with_capacity(count);
                for _ in 0..count {
                    let (tx_hash, r) = take_fixed::<32>(rest, "utxo hash")?;
                    let (vout_arr, r) = take_fixed::<4>(r, "utxo vout")?;
                    utxos.push(ExtBtcCompatUtxo { tx_hash, v_out: u32::from_le_bytes(vout_arr) });
                    rest = r;
                }
                Ok((Value::BtcUtxoList(utxos), rest))
            }
            TAG_ETH_TX => {
                let (tx_hash, rest) = take_fixed::<32>(rest, "eth tx hash")?;
                Ok((Value::EthTx(ExtEthCompatTx { tx_hash }), rest))
            }
            TAG_ETH_PAYLOAD => {
                let (abi, rest) = take_bytes(rest, "payload abi", MAX_BYTES_LEN)?;
                let (value, rest) = take_bytes(rest, "payload value", MAX_BYTES_LEN)?;
                let (func, rest) = take_bytes(rest, "payload fn", MAX_BYTES_LEN)?;
                Ok((
                    Value::EthPayload(ExtEthCompatPayload {
                        abi: abi.to_vec(),
                        value: value.to_vec(),
                        func: func.to_vec(),
                    }),
                    rest,
                ))
            }
            other => Err(ValueError::UnknownTag(other)),
        }
    }

    /// Unmarshals a value that must consume the entire buffer.
    pub fn unmarshal_all(buf: &[u8]) -> Result<Value, ValueError> {
        let (value, rest) = Value::unmarshal(buf)?;
        if !rest.is_empty() {
            return Err(ValueError::TrailingBytes);
        }
        Ok(value)
    }

    // ---- JSON codec ----

    /// Marshals this value to its JSON representation. Byte-ish values use
    /// base64-URL without padding; 64-bit-and-wider integers are decimal
    /// strings so JavaScript clients never lose precision.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Address(s) | Value::Str(s) => json!(s),
            Value::B32(b) => json!(B64URL.encode(b)),
            Value::Bytes(b) => json!(B64URL.encode(b)),
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
                for (name, value) in fields {
                    map.insert(name.clone(), value.to_json());
                }
                Json::Object(map)
            }
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::EthAddress(a) => json!(hex::encode(a)),
            Value::BtcUtxo(u) => json!({
                "txHash": B64URL.encode(u.tx_hash),
                "vOut": u.v_out,
            }),
            Value::BtcUtxoList(us) => Json::Array(
                us.iter()
                    .map(|u| json!({ "txHash": B64URL.encode(u.tx_hash), "vOut": u.v_out }))
                    .collect(),
            ),
            Value::EthTx(t) => json!({ "txHash": B64URL.encode(t.tx_hash) }),
            Value::EthPayload(p) => json!({
                "abi": B64URL.encode(&p.abi),
                "value": B64URL.encode(&p.value),
                "fn": B64URL.encode(&p.func),
            }),
        }
    }

    /// Unmarshals a JSON value against an expected type. Byte-ish fields
    /// accept both base64 alphabets, padded or not; integers accept both
    /// JSON numbers and decimal strings.
    pub fn from_json(ty: &Type, v: &Json) -> Result<Value, ValueError> {
        Ok(match ty {
            Type::Address => {
                let s = as_str(v, "address")?;
                bound("address", s.len(), MAX_ADDRESS_BYTES)?;
                Value::Address(s.to_string())
            }
            Type::Str => {
                let s = as_str(v, "string")?;
                bound("string", s.len(), MAX_STRING_BYTES)?;
                Value::Str(s.to_string())
            }
            Type::B32 => Value::B32(b32_from_json(v)?),
            Type::Bytes => {
                let bytes = decode_b64_flexible(as_str(v, "b")?)?;
                bound("byte string", bytes.len(), MAX_BYTES_LEN)?;
                Value::Bytes(bytes)
            }
            Type::U8 => Value::U8(narrow_uint(v, "u8")?),
            Type::U16 => Value::U16(narrow_uint(v, "u16")?),
            Type::U32 => Value::U32(narrow_uint(v, "u32")?),
            Type::U64 => Value::U64(uint_from_json(v, "u64")?),
            Type::U128 => Value::U128(u128_from_json(v)?),
            Type::U256 => Value::U256(u256_from_json(v)?),
            Type::I8 => Value::I8(narrow_int(v, "i8")?),
            Type::I16 => Value::I16(narrow_int(v, "i16")?),
            Type::I32 => Value::I32(narrow_int(v, "i32")?),
            Type::I64 => Value::I64(int_from_json(v, "i64")?),
            Type::I128 => {
                let s = int_str(v, "i128")?;
                Value::I128(
                    s.parse::<i128>()
                        .map_err(|e| ValueError::InvalidInteger(format!("{s:?}: {e}")))?,
                )
            }
            Type::I256 => Value::I256(I256::from_dec_str(&int_str(v, "i256")?)?),
            Type::Record(schema) => {
                let obj = v.as_object().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "record",
                    got: json_kind(v).to_string(),
                })?;
                bound("record", schema.len(), MAX_RECORD_FIELDS)?;
                let mut fields = Vec::with_capacity(schema.len());
                for (name, field_ty) in schema {
                    let field_json = obj.get(name).ok_or_else(|| ValueError::TypeMismatch {
                        expected: "record field",
                        got: format!("missing field {name:?}"),
                    })?;
                    fields.push((name.clone(), Value::from_json(field_ty, field_json)?));
                }
                Value::Record(fields)
            }
            Type::List(elem_ty) => {
                let arr = v.as_array().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "list",
                    got: json_kind(v).to_string(),
                })?;
                bound("list", arr.len(), MAX_LIST_LEN)?;
                let mut items = Vec::with_capacity(arr.len());
                for item in arr {
                    items.push(Value::from_json(elem_ty, item)?);
                }
                Value::List(items)
            }
            Type::EthAddress => {
                let s = as_str(v, "ext_ethCompatAddress")?;
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped).map_err(|e| ValueError::InvalidEncoding {
                    encoding: "hex",
                    msg: e.to_string(),
                })?;
                let arr: [u8; 20] = bytes.as_slice().try_into().map_err(|_| {
                    ValueError::InvalidLength { what: "eth address", expected: 20, got: bytes.len() }
                })?;
                Value::EthAddress(arr)
            }
            Type::BtcUtxo => Value::BtcUtxo(utxo_from_json(v)?),
            Type::BtcUtxoList => {
                let arr = v.as_array().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "ext_btcCompatUTXOs",
                    got: json_kind(v).to_string(),
                })?;
                bound("utxo list", arr.len(), MAX_UTXO_LIST_LEN)?;
                let mut utxos = Vec::with_capacity(arr.len());
                for item in arr {
                    utxos.push(utxo_from_json(item)?);
                }
                Value::BtcUtxoList(utxos)
            }
            Type::EthTx => {
                let obj = v.as_object().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "ext_ethCompatTx",
                    got: json_kind(v).to_string(),
                })?;
                let tx_hash = b32_from_json(
                    obj.get("txHash").ok_or_else(|| ValueError::TypeMismatch {
                        expected: "txHash",
                        got: "missing field".to_string(),
                    })?,
                )?;
                Value::EthTx(ExtEthCompatTx { tx_hash })
            }
            Type::EthPayload => {
                let obj = v.as_object().ok_or_else(|| ValueError::TypeMismatch {
                    expected: "ext_ethCompatPayload",
                    got: json_kind(v).to_string(),
                })?;
                let get = |name: &'static str| -> Result<Vec<u8>, ValueError> {
                    match obj.get(name) {
                        Some(s) => decode_b64_flexible(as_str(s, name)?),
                        None => Ok(Vec::new()),
                    }
                };
                Value::EthPayload(ExtEthCompatPayload {
                    abi: get("abi")?,
                    value: get("value")?,
                    func: get("fn")?,
                })
            }
        })
    }
}

// ---- codec helpers ----

fn bound(what: &'static str, len: usize, max: usize) -> Result<(), ValueError> {
    if len > max {
        return Err(ValueError::TooLong { what, len, max });
    }
    Ok(())
}

fn put_u32(out: &mut Vec<u8>, x: u32) {
    out.extend_from_slice(&x.to_le_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

fn take_fixed<'a, const N: usize>(buf: &'a [u8], what: &'static str) -> Result<([u8; N], &'a [u8]), ValueError> {
    if buf.len() < N {
        return Err(ValueError::UnexpectedEnd(what));
    }
    let (head, rest) = buf.split_at(N);
    let mut arr = [0u8; N];
    arr.copy_from_slice(head);
    Ok((arr, rest))
}

fn take_sign<'a>(buf: &'a [u8], what: &'static str) -> Result<(bool, &'a [u8]), ValueError> {
    let (&sign, rest) = buf.split_first().ok_or(ValueError::UnexpectedEnd(what))?;
    match sign {
        0 => Ok((false, rest)),
        1 => Ok((true, rest)),
        other => Err(ValueError::InvalidInteger(format!("invalid sign byte {other:#04x}"))),
    }
}

fn take_count<'a>(
    buf: &'a [u8],
    what: &'static str,
    max: usize,
) -> Result<(usize, &'a [u8]), ValueError> {
    let (arr, rest) = take_fixed::<4>(buf, what)?;
    let count = u32::from_le_bytes(arr) as usize;
    bound(what, count, max)?;
    Ok((count, rest))
}

fn take_bytes<'a>(
    buf: &'a [u8],
    what: &'static str,
    max: usize,
) -> Result<(&'a [u8], &'a [u8]), ValueError> {
    let (len, rest) = take_count(buf, what, max)?;
    if rest.len() < len {
        return Err(ValueError::UnexpectedEnd(what));
    }
    Ok(rest.split_at(len))
}

fn utf8(bytes: &[u8]) -> Result<String, ValueError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ValueError::InvalidEncoding {
        encoding: "utf-8",
        msg: e.to_string(),
    })
}

fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn as_str<'a>(v: &'a Json, expected: &'static str) -> Result<&'a str, ValueError> {
    v.as_str().ok_or_else(|| ValueError::TypeMismatch { expected, got: json_kind(v).to_string() })
}

/// Decodes base64 in any of the four common dialects: standard or URL-safe
/// alphabet, padded or unpadded. The two protocol versions disagree on the
/// alphabet, and some SDKs strip padding, so the reader accepts all of them.
pub fn decode_b64_flexible(s: &str) -> Result<Vec<u8>, ValueError> {
    use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE};
    B64URL
        .decode(s)
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| B64.decode(s))
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .map_err(|e| ValueError::InvalidEncoding { encoding: "base64", msg: e.to_string() })
}

/// Decodes a 32-byte value from a base64 JSON string.
pub fn b32_from_json(v: &Json) -> Result<[u8; 32], ValueError> {
    let bytes = decode_b64_flexible(as_str(v, "b32")?)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ValueError::InvalidLength { what: "b32", expected: 32, got: bytes.len() })
}

fn uint_from_json(v: &Json, what: &'static str) -> Result<u64, ValueError> {
    match v {
        Json::Number(n) => n
            .as_u64()
            .ok_or_else(|| ValueError::InvalidInteger(format!("{what}: {n} out of range"))),
        Json::String(s) => s
            .parse::<u64>()
            .map_err(|e| ValueError::InvalidInteger(format!("{what} {s:?}: {e}"))),
        other => {
            Err(ValueError::TypeMismatch { expected: what, got: json_kind(other).to_string() })
        }
    }
}

fn int_from_json(v: &Json, what: &'static str) -> Result<i64, ValueError> {
    match v {
        Json::Number(n) => n
            .as_i64()
            .ok_or_else(|| ValueError::InvalidInteger(format!("{what}: {n} out of range"))),
        Json::String(s) => s
            .parse::<i64>()
            .map_err(|e| ValueError::InvalidInteger(format!("{what} {s:?}: {e}"))),
        other => {
            Err(ValueError::TypeMismatch { expected: what, got: json_kind(other).to_string() })
        }
    }
}

fn narrow_uint<T: TryFrom<u64>>(v: &Json, what: &'static str) -> Result<T, ValueError> {
    let wide = uint_from_json(v, what)?;
    T::try_from(wide)
        .map_err(|_| ValueError::InvalidInteger(format!("{what}: {wide} out of range")))
}

fn narrow_int<T: TryFrom<i64>>(v: &Json, what: &'static str) -> Result<T, ValueError> {
    let wide = int_from_json(v, what)?;
    T::try_from(wide)
        .map_err(|_| ValueError::InvalidInteger(format!("{what}: {wide} out of range")))
}

fn int_str(v: &Json, what: &'static str) -> Result<String, ValueError> {
    match v {
        Json::Number(n) => Ok(n.to_string()),
        Json::String(s) => Ok(s.clone()),
        other => {
            Err(ValueError::TypeMismatch { expected: what, got: json_kind(other).to_string() })
        }
    }
}

fn u128_from_json(v: &Json) -> Result<u128, ValueError> {
    let s = int_str(v, "u128")?;
    s.parse::<u128>().map_err(|e| ValueError::InvalidInteger(format!("u128 {s:?}: {e}")))
}

/// Parses a 256-bit unsigned integer from a JSON number or decimal string.
pub fn u256_from_json(v: &Json) -> Result<U256, ValueError> {
    let s = int_str(v, "u256")?;
    U256::from_dec_str(&s).map_err(|e| ValueError::InvalidInteger(format!("u256 {s:?}: {e}")))
}

fn utxo_from_json(v: &Json) -> Result<ExtBtcCompatUtxo, ValueError> {
    let obj = v.as_object().ok_or_else(|| ValueError::TypeMismatch {
        expected: "ext_btcCompatUTXO",
        got: json_kind(v).to_string(),
    })?;
    let tx_hash = b32_from_json(obj.get("txHash").ok_or_else(|| ValueError::TypeMismatch {
        expected: "txHash",
        got: "missing field".to_string(),
    })?)?;
    let v_out = match obj.get("vOut") {
        Some(x) => narrow_uint(x, "vOut")?,
        None => 0,
    };
    Ok(ExtBtcCompatUtxo { tx_hash, v_out })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use proptest::prelude::*;

    fn sample_record() -> Value {
        Value::Record(vec![
            ("txid".to_string(), Value::Bytes(vec![1, 2, 3])),
            ("amount".to_string(), Value::U256(U256::from(10_000u64))),
            ("nonce".to_string(), Value::B32([7u8; 32])),
        ])
    }

    #[test]
    fn record_equality_is_order_independent() {
        let a = Value::Record(vec![
            ("x".to_string(), Value::U8(1)),
            ("y".to_string(), Value::U8(2)),
        ]);
        let b = Value::Record(vec![
            ("y".to_string(), Value::U8(2)),
            ("x".to_string(), Value::U8(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn record_marshal_is_order_independent() {
        let a = Value::Record(vec![
            ("x".to_string(), Value::U8(1)),
            ("y".to_string(), Value::U8(2)),
        ]);
        let b = Value::Record(vec![
            ("y".to_string(), Value::U8(2)),
            ("x".to_string(), Value::U8(1)),
        ]);
        assert_eq!(a.marshal().unwrap(), b.marshal().unwrap());
    }

    #[test]
    fn binary_roundtrip_record() {
        let v = sample_record();
        let bytes = v.marshal().unwrap();
        let decoded = Value::unmarshal_all(&bytes).unwrap();
        assert_eq!(v, decoded);
    }

    #[test]
    fn u256_marshals_sign_byte_then_big_endian() {
        let v = Value::U256(U256::from(0x0102u64));
        let bytes = v.marshal().unwrap();
        assert_eq!(bytes[0], TAG_U256);
        assert_eq!(bytes[1], 0); // sign
        assert_eq!(&bytes[2..32], &[0u8; 30]);
        assert_eq!(&bytes[32..34], &[0x01, 0x02]);
    }

    #[test]
    fn fixed_width_ints_are_little_endian() {
        let bytes = Value::U32(0x0a0b0c0d).marshal().unwrap();
        assert_eq!(&bytes[1..], &[0x0d, 0x0c, 0x0b, 0x0a]);
    }

    #[test]
    fn oversized_string_is_rejected() {
        let v = Value::Str("x".repeat(MAX_STRING_BYTES + 1));
        assert!(matches!(v.marshal(), Err(ValueError::TooLong { .. })));
    }

    #[test]
    fn oversized_record_count_is_rejected_on_decode() {
        let mut bytes = vec![TAG_RECORD];
        bytes.extend_from_slice(&(MAX_RECORD_FIELDS as u32 + 1).to_le_bytes());
        assert!(matches!(
            Value::unmarshal_all(&bytes),
            Err(ValueError::TooLong { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Value::U8(7).marshal().unwrap();
        bytes.push(0);
        assert!(matches!(Value::unmarshal_all(&bytes), Err(ValueError::TrailingBytes)));
    }

    #[test]
    fn json_roundtrip_lock_input_shape() {
        let schema = Type::Record(vec![
            ("txid".to_string(), Type::Bytes),
            ("txindex".to_string(), Type::U32),
            ("amount".to_string(), Type::U256),
            ("nonce".to_string(), Type::B32),
            ("to".to_string(), Type::Str),
        ]);
        let v = Value::Record(vec![
            ("txid".to_string(), Value::Bytes(vec![0xde, 0xad])),
            ("txindex".to_string(), Value::U32(1)),
            ("amount".to_string(), Value::U256(U256::from(123456789u64))),
            ("nonce".to_string(), Value::B32([9u8; 32])),
            ("to".to_string(), Value::Str("0x7ddf".to_string())),
        ]);
        let json = v.to_json();
        let back = Value::from_json(&schema, &json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn json_accepts_both_base64_alphabets() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        for encoded in [B64.encode(&bytes), B64URL.encode(&bytes)] {
            assert_eq!(decode_b64_flexible(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn json_integers_accept_numbers_and_strings() {
        assert_eq!(
            Value::from_json(&Type::U64, &json!(42)).unwrap(),
            Value::U64(42)
        );
        assert_eq!(
            Value::from_json(&Type::U64, &json!("42")).unwrap(),
            Value::U64(42)
        );
        assert_eq!(
            Value::from_json(&Type::U256, &json!("10000")).unwrap(),
            Value::U256(U256::from(10_000u64))
        );
    }

    #[test]
    fn eth_address_accepts_optional_0x_prefix() {
        let with = json!("0x0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f");
        let without = json!("0A9ADD98C076448CBcFAcf5E457DA12ddbEF4A8f");
        assert_eq!(
            Value::from_json(&Type::EthAddress, &with).unwrap(),
            Value::from_json(&Type::EthAddress, &without).unwrap()
        );
    }

    #[test]
    fn i256_parses_negative_decimal() {
        let x = I256::from_dec_str("-12345").unwrap();
        assert!(x.negative);
        assert_eq!(x.magnitude, U256::from(12345u64));
        assert_eq!(x.to_string(), "-12345");
        assert_eq!(I256::from_dec_str("-0").unwrap(), I256::zero());
    }

    proptest! {
        #[test]
        fn binary_roundtrip_bytes(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let v = Value::Bytes(data);
            let bytes = v.marshal().unwrap();
            prop_assert_eq!(Value::unmarshal_all(&bytes).unwrap(), v);
        }

        #[test]
        fn binary_roundtrip_ints(x in any::<u64>(), y in any::<i64>()) {
            for v in [Value::U64(x), Value::I64(y), Value::U128(x as u128), Value::I128(y as i128)] {
                let bytes = v.marshal().unwrap();
                prop_assert_eq!(Value::unmarshal_all(&bytes).unwrap(), v);
            }
        }
    }
}
