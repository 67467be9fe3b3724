// Path: crates/watcher/src/solana.rs
//! The Solana burn-record fetcher.
//!
//! The gateway program keeps a monotone burn counter in a Borsh-encoded
//! state account at a program-derived address; each burn writes its own
//! record account whose PDA seed is the little-endian burn index. The
//! watcher treats the counter as a height and iterates indices, so the
//! generic poll loop never knows the difference.

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::edwards::CompressedEdwardsY;
use lightnode_api::fetcher::{BurnLogFetcher, EventInfo, FetcherError};
use lightnode_types::selector::asset_origin_chain;
use primitive_types::U256;
use sha2::{Digest as _, Sha256};
use std::sync::Arc;

/// The seed of the gateway state account.
const GATEWAY_STATE_SEED: &[u8] = b"GatewayStateV0.1.4";

/// The Solana RPC seam.
#[async_trait]
pub trait SolanaRpcProvider: Send + Sync {
    /// Fetches the raw data of an account, `None` when it does not exist.
    async fn get_account_data(&self, address: &str) -> Result<Option<Vec<u8>>, FetcherError>;

    /// The earliest transaction signature covering an account, base58.
    async fn earliest_signature_for(&self, address: &str)
        -> Result<Option<String>, FetcherError>;
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY::from_slice(bytes)
        .map(|p| p.decompress().is_some())
        .unwrap_or(false)
}

/// Derives a program-derived address the way the Solana runtime does:
/// sha256 over the seeds, a bump byte counted down from 255, the program
/// id, and the domain separator, taking the first digest that is not a
/// curve point.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &[u8; 32],
) -> Result<(String, u8), FetcherError> {
    for bump in (0..=255u8).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id);
        hasher.update(b"ProgramDerivedAddress");
        let candidate: [u8; 32] = hasher.finalize().into();
        if !is_on_curve(&candidate) {
            return Ok((bs58::encode(candidate).into_string(), bump));
        }
    }
    Err(FetcherError::Decode("no off-curve bump for program-derived address".to_string()))
}

/// The gateway program's state account.
#[derive(BorshSerialize, BorshDeserialize, Debug)]
struct GatewayState {
    is_initialized: bool,
    renvm_authority: [u8; 20],
    selector_hash: [u8; 32],
    burn_count: u64,
    underlying_decimals: u8,
}

/// One burn record account.
#[derive(BorshSerialize, BorshDeserialize, Debug)]
struct BurnRecord {
    amount: u64,
    recipient: Vec<u8>,
}

/// The fetcher for one asset's gateway program on Solana.
pub struct SolanaFetcher {
    provider: Arc<dyn SolanaRpcProvider>,
    program_id: [u8; 32],
    asset: String,
}

impl SolanaFetcher {
    /// Builds a fetcher for `asset` against the gateway `program`
    /// (base58).
    pub fn new(
        provider: Arc<dyn SolanaRpcProvider>,
        program: &str,
        asset: &str,
    ) -> Result<Self, FetcherError> {
        let bytes = bs58::decode(program)
            .into_vec()
            .map_err(|e| FetcherError::Decode(format!("bad program address: {e}")))?;
        let program_id: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FetcherError::Decode("program address is not 32 bytes".to_string()))?;
        Ok(Self { provider, program_id, asset: asset.to_string() })
    }

    fn state_address(&self) -> Result<String, FetcherError> {
        Ok(find_program_address(&[GATEWAY_STATE_SEED], &self.program_id)?.0)
    }

    fn burn_address(&self, index: u64) -> Result<String, FetcherError> {
        Ok(find_program_address(&[&index.to_le_bytes()], &self.program_id)?.0)
    }
}

#[async_trait]
impl BurnLogFetcher for SolanaFetcher {
    /// The "height" of this chain is the gateway's burn count.
    async fn latest_block_height(&self) -> Result<u64, FetcherError> {
        let address = self.state_address()?;
        let data = self
            .provider
            .get_account_data(&address)
            .await?
            .ok_or_else(|| FetcherError::Decode("gateway state account missing".to_string()))?;
        let state = GatewayState::try_from_slice(&data)
            .map_err(|e| FetcherError::Decode(format!("gateway state: {e}")))?;
        Ok(state.burn_count)
    }

    async fn fetch_burn_logs(&self, from: u64, to: u64) -> Result<Vec<EventInfo>, FetcherError> {
        let target_chain = asset_origin_chain(&self.asset)
            .ok_or_else(|| FetcherError::Decode(format!("unknown asset {:?}", self.asset)))?;
        let mut events = Vec::new();
        for index in from..to {
            let address = self.burn_address(index)?;
            let Some(data) = self.provider.get_account_data(&address).await? else {
                tracing::warn!(
                    target: "watcher",
                    asset = %self.asset,
                    index,
                    "burn record below the counter is missing"
                );
                continue;
            };
            let record = BurnRecord::try_from_slice(&data)
                .map_err(|e| FetcherError::Decode(format!("burn record {index}: {e}")))?;
            // The earliest signature covering the record account is the
            // transaction that created it.
            let txid = match self.provider.earliest_signature_for(&address).await? {
                Some(signature) => bs58::decode(&signature)
                    .into_vec()
                    .map_err(|e| FetcherError::Decode(format!("bad signature: {e}")))?,
                None => Vec::new(),
            };
            let mut nonce = [0u8; 32];
            nonce[24..].copy_from_slice(&index.to_be_bytes());
            events.push(EventInfo {
                asset: self.asset.clone(),
                target_chain: target_chain.to_string(),
                txid,
                amount: U256::from(record.amount),
                to_bytes: record.recipient,
                nonce,
                block_number: index,
            });
        }
        Ok(events)
    }
}
