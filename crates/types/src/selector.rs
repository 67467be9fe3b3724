// Path: crates/types/src/selector.rs
//! Cross-chain selectors.
//!
//! A selector is a string of the form `<ASSET>/to<DEST>` (lock-and-mint)
//! or `<ASSET>/from<SRC>` (burn-and-release), e.g. `BTC/toEthereum` or
//! `BTC/fromEthereum`. The parse yields three tags: the asset, the source
//! chain, and the destination chain. For a lock the source is the asset's
//! origin chain; for a burn it is the host chain the representation lives
//! on.

use crate::error::SelectorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns the origin chain of a supported asset tag, if known.
pub fn asset_origin_chain(asset: &str) -> Option<&'static str> {
    Some(match asset {
        "BTC" => "Bitcoin",
        "BCH" => "BitcoinCash",
        "ZEC" => "Zcash",
        "DGB" => "DigiByte",
        "DOGE" => "Dogecoin",
        "FIL" => "Filecoin",
        "LUNA" => "Terra",
        "SOL" => "Solana",
        "ETH" => "Ethereum",
        _ => return None,
    })
}

/// A parsed cross-chain selector.
///
/// The raw string is kept verbatim (it participates in hashes and cache
/// keys); the parsed tags are computed once at construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector {
    raw: String,
    asset: String,
    source: String,
    destination: String,
    lock: bool,
}

impl Selector {
    /// Parses a selector string.
    pub fn new(raw: &str) -> Result<Self, SelectorError> {
        let (asset, rest) = raw
            .split_once('/')
            .ok_or_else(|| SelectorError::Malformed(raw.to_string()))?;
        if asset.is_empty() {
            return Err(SelectorError::Malformed(raw.to_string()));
        }
        let origin = asset_origin_chain(asset)
            .ok_or_else(|| SelectorError::UnknownAsset(asset.to_string()))?;
        if let Some(host) = rest.strip_prefix("to") {
            if host.is_empty() {
                return Err(SelectorError::Malformed(raw.to_string()));
            }
            Ok(Self {
                raw: raw.to_string(),
                asset: asset.to_string(),
                source: origin.to_string(),
                destination: host.to_string(),
                lock: true,
            })
        } else if let Some(host) = rest.strip_prefix("from") {
            if host.is_empty() {
                return Err(SelectorError::Malformed(raw.to_string()));
            }
            Ok(Self {
                raw: raw.to_string(),
                asset: asset.to_string(),
                source: host.to_string(),
                destination: origin.to_string(),
                lock: false,
            })
        } else {
            Err(SelectorError::Malformed(raw.to_string()))
        }
    }

    /// The raw selector string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The asset tag (`BTC`, `ZEC`, ...).
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// The chain the asset moves from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The chain the asset moves to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// True when the selector is of the `to<HostChain>` form: a deposit on
    /// the origin chain mints a representation on the host chain.
    pub fn is_lock(&self) -> bool {
        self.lock
    }

    /// True when the selector is of the `from<HostChain>` form: a burn on
    /// the host chain releases funds on the origin chain.
    pub fn is_burn(&self) -> bool {
        !self.lock
    }

    /// Synonym for [`Selector::is_lock`] on the outcome side.
    pub fn is_mint(&self) -> bool {
        self.is_lock()
    }

    /// Synonym for [`Selector::is_burn`] on the outcome side.
    pub fn is_release(&self) -> bool {
        self.is_burn()
    }

    /// The host chain: the destination for a lock, the source for a burn.
    pub fn host_chain(&self) -> &str {
        if self.lock {
            &self.destination
        } else {
            &self.source
        }
    }

    /// Builds the burn selector for an asset on a host chain, e.g.
    /// `("BTC", "Ethereum")` → `BTC/fromEthereum`.
    pub fn burn(asset: &str, host_chain: &str) -> Result<Self, SelectorError> {
        Self::new(&format!("{asset}/from{host_chain}"))
    }

    /// Builds the lock selector for an asset toward a host chain, e.g.
    /// `("BTC", "Ethereum")` → `BTC/toEthereum`.
    pub fn lock(asset: &str, host_chain: &str) -> Result<Self, SelectorError> {
        Self::new(&format!("{asset}/to{host_chain}"))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Selector {
    type Error = SelectorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Selector::new(&s)
    }
}

impl From<Selector> for String {
    fn from(s: Selector) -> String {
        s.raw
    }
}
