// Path: crates/types/src/config.rs
//! Shared configuration structures.
//!
//! The node binary deserializes these from a TOML file; nothing here reads
//! the environment or the command line. Durations are plain seconds so the
//! file stays hand-editable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The RenVM network the gateway fronts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// The development network.
    Devnet,
    /// A local single-machine network.
    Localnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Localnet => "localnet",
        })
    }
}

/// Per-chain connection and watcher settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// The chain RPC endpoint.
    pub rpc_url: String,
    /// Confirmations required before a deposit is considered final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// The gateway registry / gateway contract address on host chains.
    #[serde(default)]
    pub gateway_contract: Option<String>,
    /// Per-asset gateway contract (or program) addresses on this chain.
    #[serde(default)]
    pub gateways: BTreeMap<String, String>,
    /// Per-asset ERC-20 token contract addresses on this chain.
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    /// Assets whose burn events are watched on this chain.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Maximum blocks a single watcher tick may advance.
    #[serde(default = "default_max_block_advance")]
    pub max_block_advance: u64,
    /// Blocks below the tip treated as not yet safe. Chains with
    /// single-slot finality set this to zero.
    #[serde(default = "default_confidence_interval")]
    pub confidence_interval: u64,
}

fn default_confirmations() -> u64 {
    6
}

fn default_max_block_advance() -> u64 {
    1000
}

fn default_confidence_interval() -> u64 {
    6
}

/// Rate-limiter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Global fallback rate, requests per second across all clients.
    #[serde(default = "default_global_rate")]
    pub global_rate: f64,
    /// Per-IP fallback rate, requests per second.
    #[serde(default = "default_ip_rate")]
    pub ip_rate: f64,
    /// Per-method global rates overriding the fallback.
    #[serde(default)]
    pub method_rates: BTreeMap<String, f64>,
    /// Seconds an idle client entry survives before pruning.
    #[serde(default = "default_limiter_ttl")]
    pub ttl_secs: u64,
    /// Tracked-client count that triggers a pruning pass.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            global_rate: default_global_rate(),
            ip_rate: default_ip_rate(),
            method_rates: BTreeMap::new(),
            ttl_secs: default_limiter_ttl(),
            max_clients: default_max_clients(),
        }
    }
}

fn default_global_rate() -> f64 {
    1000.0
}

fn default_ip_rate() -> f64 {
    10.0
}

fn default_limiter_ttl() -> u64 {
    60
}

fn default_max_clients() -> usize {
    1000
}

/// Top-level gateway options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// The network being fronted.
    pub network: Network,
    /// Listen address for the HTTP server, e.g. `0.0.0.0:5000`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Bootstrap Darknode JSON-RPC endpoints.
    pub darknodes: Vec<String>,
    /// The active shard's compressed secp256k1 public key, hex-encoded.
    pub dist_pubkey: String,
    /// Path of the transaction database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Seconds a transaction and its compat mappings are retained.
    #[serde(default = "default_prune_window")]
    pub prune_window_secs: u64,
    /// Seconds between watcher polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds between confirmer sweeps.
    #[serde(default = "default_confirmer_interval")]
    pub confirmer_interval_secs: u64,
    /// Seconds a cached query response stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Sanctions-screening endpoint; screening is disabled when absent.
    #[serde(default)]
    pub screener_url: Option<String>,
    /// API key for the screening endpoint.
    #[serde(default)]
    pub screener_key: Option<String>,
    /// Rate-limiter settings.
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// Per-chain settings, keyed by chain name (`Ethereum`, `Bitcoin`, ...).
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_db_path() -> String {
    "lightnode.redb".to_string()
}

fn default_prune_window() -> u64 {
    7 * 24 * 60 * 60 // one week
}

fn default_poll_interval() -> u64 {
    15
}

fn default_confirmer_interval() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let toml = r#"
            network = "testnet"
            darknodes = ["http://127.0.0.1:18515"]
            dist_pubkey = "03b428c80c94b43023543e6bbbb0778901d05bbbd867d2e1158f4a30b54b727b51"

            [chains.Ethereum]
            rpc_url = "http://127.0.0.1:8545"
            gateway_contract = "0xe80d347DF1209a76DD9d2319d62912ba98C54DDD"
            assets = ["BTC", "ZEC"]
        "#;
        let opts: Options = toml::from_str(toml).unwrap();
        assert_eq!(opts.network, Network::Testnet);
        assert_eq!(opts.prune_window_secs, 7 * 24 * 60 * 60);
        assert_eq!(opts.limiter.global_rate, 1000.0);
        assert_eq!(opts.limiter.ip_rate, 10.0);
        assert_eq!(opts.limiter.max_clients, 1000);
        let eth = &opts.chains["Ethereum"];
        assert_eq!(eth.assets, vec!["BTC", "ZEC"]);
        assert_eq!(eth.confidence_interval, 6);
    }
}
