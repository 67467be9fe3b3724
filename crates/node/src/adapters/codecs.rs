// Path: crates/node/src/adapters/codecs.rs
//! Concrete address codecs, one per chain family.

use lightnode_api::chain::{AddressEncodeDecoder, ChainClientError};
use sha2::{Digest as _, Sha256};

fn codec_error(chain: &str, msg: impl Into<String>) -> ChainClientError {
    ChainClientError::AddressCodec { chain: chain.to_string(), msg: msg.into() }
}

/// Hex addresses with an optional `0x` prefix (Ethereum family).
pub struct EthereumCodec;

impl AddressEncodeDecoder for EthereumCodec {
    fn decode_address(&self, addr: &str) -> Result<Vec<u8>, ChainClientError> {
        let stripped = addr.strip_prefix("0x").unwrap_or(addr);
        let bytes =
            hex::decode(stripped).map_err(|e| codec_error("Ethereum", e.to_string()))?;
        if bytes.len() != 20 {
            return Err(codec_error("Ethereum", format!("want 20 bytes, got {}", bytes.len())));
        }
        Ok(bytes)
    }

    fn encode_address(&self, raw: &[u8]) -> Result<String, ChainClientError> {
        if raw.len() != 20 {
            return Err(codec_error("Ethereum", format!("want 20 bytes, got {}", raw.len())));
        }
        Ok(format!("0x{}", hex::encode(raw)))
    }
}

/// Base58Check addresses (Bitcoin family). The decoded form keeps the
/// version byte; only the four checksum bytes are stripped.
pub struct Base58CheckCodec {
    chain: String,
}

impl Base58CheckCodec {
    /// A codec for the named chain (used only for error messages).
    pub fn new(chain: &str) -> Self {
        Self { chain: chain.to_string() }
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let once = Sha256::digest(payload);
        let twice = Sha256::digest(once);
        let mut check = [0u8; 4];
        check.copy_from_slice(&twice[..4]);
        check
    }
}

impl AddressEncodeDecoder for Base58CheckCodec {
    fn decode_address(&self, addr: &str) -> Result<Vec<u8>, ChainClientError> {
        let bytes = bs58::decode(addr)
            .into_vec()
            .map_err(|e| codec_error(&self.chain, e.to_string()))?;
        if bytes.len() < 5 {
            return Err(codec_error(&self.chain, "address too short"));
        }
        let (payload, check) = bytes.split_at(bytes.len() - 4);
        if Self::checksum(payload) != check {
            return Err(codec_error(&self.chain, "bad checksum"));
        }
        Ok(payload.to_vec())
    }

    fn encode_address(&self, raw: &[u8]) -> Result<String, ChainClientError> {
        let mut bytes = raw.to_vec();
        bytes.extend_from_slice(&Self::checksum(raw));
        Ok(bs58::encode(bytes).into_string())
    }
}
