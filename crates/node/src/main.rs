// Path: crates/node/src/main.rs
//! The Lightnode gateway binary.
//!
//! Loads the TOML configuration, constructs every component once, threads
//! them through the graph as trait objects, and runs the HTTP surface
//! plus the background loops (watchers, confirmer, pruner) until a
//! shutdown signal.

#![forbid(unsafe_code)]

mod adapters;

use adapters::{Base58CheckCodec, BitcoindClient, EthereumCodec, EvmRpc, HttpDarknodeCaller, SolanaRpc};
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use lightnode_api::chain::AddressCodecRegistry;
use lightnode_api::storage::TxStore;
use lightnode_compat::store::CompatStore;
use lightnode_compat::translate::Bindings;
use lightnode_rpc::checker::DefaultVerifier;
use lightnode_rpc::screener::{DisabledScreener, HttpScreener};
use lightnode_rpc::server::{run_server, ServerConfig};
use lightnode_rpc::{Cacher, Confirmer, RateLimiter, Resolver, TxChecker, Validator};
use lightnode_storage::{MemKv, RedbTxStore};
use lightnode_types::config::Options;
use lightnode_types::selector::{asset_origin_chain, Selector};
use lightnode_types::tx::Transaction;
use lightnode_watcher::{EvmFetcher, SolanaFetcher, TxSubmitter, Watcher, WatcherConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Feeds watcher-synthesized transactions into the checker pipeline.
struct CheckerSubmitter {
    checker: TxChecker,
}

#[async_trait]
impl TxSubmitter for CheckerSubmitter {
    async fn submit_tx(&self, tx: Transaction) -> Result<(), String> {
        self.checker.submit(tx).await.map(|_| ()).map_err(|e| e.message)
    }
}

fn load_options() -> Result<Options> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "lightnode.toml".to_string());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    toml::from_str(&raw).with_context(|| format!("parsing {path}"))
}

fn parse_shard_pubkey(hex_key: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(hex_key.trim_start_matches("0x")).context("dist_pubkey is not hex")?;
    let key = secp256k1::PublicKey::from_slice(&bytes).context("dist_pubkey is not a point")?;
    Ok(key.serialize().to_vec())
}

fn parse_token(addr: &str) -> Result<[u8; 20]> {
    let bytes = hex::decode(addr.trim_start_matches("0x")).context("token address is not hex")?;
    bytes.as_slice().try_into().map_err(|_| anyhow!("token address is not 20 bytes"))
}

fn build_codecs(options: &Options) -> AddressCodecRegistry {
    let mut codecs = AddressCodecRegistry::new();
    codecs.register("Ethereum", Arc::new(EthereumCodec));
    for chain in options.chains.keys() {
        match chain.as_str() {
            "Ethereum" | "Solana" => {}
            other => codecs.register(other, Arc::new(Base58CheckCodec::new(other))),
        }
    }
    // Origin chains of watched assets need codecs even when the node has
    // no RPC endpoint for them (release-address validation).
    for chain_cfg in options.chains.values() {
        for asset in &chain_cfg.assets {
            if let Some(origin) = asset_origin_chain(asset) {
                if origin != "Ethereum" && origin != "Solana" {
                    codecs.register(origin, Arc::new(Base58CheckCodec::new(origin)));
                }
            }
        }
    }
    codecs
}

fn build_bindings(options: &Options, codecs: Arc<AddressCodecRegistry>) -> Result<Bindings> {
    let mut bindings = Bindings::new(codecs);
    for (chain, chain_cfg) in &options.chains {
        for (asset, token) in &chain_cfg.tokens {
            bindings.register_token(asset, parse_token(token)?);
        }
        match chain.as_str() {
            "Ethereum" | "Solana" => {}
            other => bindings
                .register_utxo_client(other, Arc::new(BitcoindClient::new(&chain_cfg.rpc_url))),
        }
    }
    Ok(bindings)
}

fn spawn_watchers(
    options: &Options,
    kv: Arc<MemKv>,
    compat: Arc<CompatStore>,
    codecs: Arc<AddressCodecRegistry>,
    submitter: Arc<dyn TxSubmitter>,
    shutdown: &watch::Receiver<bool>,
) -> Result<usize> {
    let known_chains: BTreeSet<String> = options.chains.keys().cloned().collect();
    let mut spawned = 0;
    for (chain, chain_cfg) in &options.chains {
        if chain_cfg.assets.is_empty() {
            continue;
        }
        let config = WatcherConfig {
            poll_interval: Duration::from_secs(options.poll_interval_secs),
            confidence_interval: chain_cfg.confidence_interval,
            max_block_advance: chain_cfg.max_block_advance,
        };
        match chain.as_str() {
            "Solana" => {
                // One fetcher per asset: each gateway program keeps its own
                // burn counter, and finality is single-slot.
                let provider = Arc::new(SolanaRpc::new(&chain_cfg.rpc_url));
                for asset in &chain_cfg.assets {
                    let program = chain_cfg.gateways.get(asset).ok_or_else(|| {
                        anyhow!("no gateway program configured for {asset} on Solana")
                    })?;
                    let fetcher =
                        Arc::new(SolanaFetcher::new(provider.clone(), program, asset)?);
                    let selector = Selector::burn(asset, chain)?;
                    let watcher = Watcher::new(
                        selector,
                        WatcherConfig { confidence_interval: 0, ..config.clone() },
                        fetcher,
                        kv.clone(),
                        compat.clone(),
                        codecs.clone(),
                        submitter.clone(),
                    );
                    tokio::spawn(watcher.run(shutdown.clone()));
                    spawned += 1;
                }
            }
            _ => {
                let provider = Arc::new(EvmRpc::new(&chain_cfg.rpc_url));
                let mut gateways = BTreeMap::new();
                for asset in &chain_cfg.assets {
                    let gateway = chain_cfg
                        .gateways
                        .get(asset)
                        .or(chain_cfg.gateway_contract.as_ref())
                        .ok_or_else(|| {
                            anyhow!("no gateway contract configured for {asset} on {chain}")
                        })?;
                    gateways.insert(asset.clone(), gateway.clone());
                }
                for asset in &chain_cfg.assets {
                    let mut single = BTreeMap::new();
                    single.insert(asset.clone(), gateways[asset].clone());
                    let fetcher = Arc::new(EvmFetcher::new(
                        provider.clone(),
                        single,
                        known_chains.clone(),
                    ));
                    let selector = Selector::burn(asset, chain)?;
                    let watcher = Watcher::new(
                        selector,
                        config.clone(),
                        fetcher,
                        kv.clone(),
                        compat.clone(),
                        codecs.clone(),
                        submitter.clone(),
                    );
                    tokio::spawn(watcher.run(shutdown.clone()));
                    spawned += 1;
                }
            }
        }
    }
    Ok(spawned)
}

#[tokio::main]
async fn main() -> Result<()> {
    lightnode_telemetry::init_tracing()?;
    let options = load_options()?;
    tracing::info!(target: "node", network = %options.network, "starting lightnode");

    let prune_window = Duration::from_secs(options.prune_window_secs);
    let store = Arc::new(RedbTxStore::open(&options.db_path)?);
    let kv = Arc::new(MemKv::new());
    let compat = Arc::new(CompatStore::new(kv.clone(), store.clone(), prune_window));

    let gpubkey = parse_shard_pubkey(&options.dist_pubkey)?;
    let codecs = Arc::new(build_codecs(&options));
    let bindings = Arc::new(build_bindings(&options, codecs.clone())?);

    let darknode = Arc::new(HttpDarknodeCaller::new(options.darknodes.clone())?);
    let cacher = Cacher::new(darknode, Duration::from_secs(options.cache_ttl_secs));
    let verifier = Arc::new(DefaultVerifier::new(bindings.clone(), gpubkey.clone()));
    let checker = TxChecker::new(verifier, store.clone());
    let screener: Arc<dyn lightnode_api::screener::Screener> = match &options.screener_url {
        Some(url) => Arc::new(HttpScreener::new(url.clone(), options.screener_key.clone())),
        None => Arc::new(DisabledScreener),
    };

    let limiter = Arc::new(RateLimiter::new(options.limiter.clone()));
    let validator = Arc::new(Validator::new(
        limiter,
        compat.clone(),
        bindings.clone(),
        gpubkey.clone(),
    ));
    let resolver = Arc::new(Resolver::new(
        cacher.clone(),
        store.clone(),
        compat.clone(),
        bindings.clone(),
        checker.clone(),
        screener,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let submitter: Arc<dyn TxSubmitter> =
        Arc::new(CheckerSubmitter { checker: checker.clone() });
    let spawned = spawn_watchers(
        &options,
        kv.clone(),
        compat.clone(),
        codecs,
        submitter,
        &shutdown_rx,
    )?;
    tracing::info!(target: "node", watchers = spawned, "watchers running");

    let confirmer = Confirmer::new(
        store.clone(),
        cacher.clone(),
        checker,
        Duration::from_secs(options.confirmer_interval_secs),
        prune_window,
    );
    tokio::spawn(confirmer.run(shutdown_rx.clone()));

    // Scheduled pruning: the transaction table and the mapping cache share
    // the retention window.
    {
        let store: Arc<dyn TxStore> = store.clone();
        let kv: Arc<MemKv> = kv.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.prune(prune_window) {
                            Ok(removed) if removed > 0 => {
                                tracing::info!(target: "node", removed, "pruned transactions");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(target: "node", error = %e, "prune failed");
                            }
                        }
                        let purged = kv.purge_expired();
                        if purged > 0 {
                            tracing::debug!(target: "node", purged, "purged expired mappings");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "node", "interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    run_server(
        ServerConfig { listen_addr: options.listen_addr.clone(), ..ServerConfig::default() },
        validator,
        resolver,
        shutdown_rx,
    )
    .await
}
