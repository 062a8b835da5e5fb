//! # Network Registry
//!
//! Static per-network configuration: explorer and RPC endpoints, AMM sources, pegged
//! tokens and the base asset. Built once from a single table, merged with the URL
//! overrides from [`Settings`], and validated completely before use.

use ethers::types::Address;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::errors::{ResolverError, Result};
use crate::settings::Settings;
use crate::types::PoolInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Eth,
    Bsc,
    Polygon,
    Mumbai,
}

impl Network {
    pub const ALL: [Network; 4] = [Network::Eth, Network::Bsc, Network::Polygon, Network::Mumbai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Eth => "eth",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
            Network::Mumbai => "mumbai",
        }
    }
}

impl FromStr for Network {
    type Err = ResolverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eth" => Ok(Network::Eth),
            "bsc" => Ok(Network::Bsc),
            "polygon" => Ok(Network::Polygon),
            "mumbai" => Ok(Network::Mumbai),
            _ => Err(ResolverError::UnknownNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An AMM deployment indexed by a subgraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmmSource {
    pub name: String,
    pub interface: PoolInterface,
    pub subgraph_url: String,
    pub router: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeggedToken {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub explorer_url: String,
    pub rpc_url: String,
    /// Currency symbol the explorer quotes token prices in.
    pub native_symbol: String,
    pub sources: Vec<AmmSource>,
    pub pegged: Vec<PeggedToken>,
    pub base_asset: Address,
}

impl NetworkConfig {
    pub fn is_pegged(&self, token: Address) -> bool {
        self.pegged.iter().any(|p| p.address == token)
    }

    pub fn is_base_asset(&self, token: Address) -> bool {
        self.base_asset == token
    }

    /// Reverse lookup: pegged token metadata by address.
    pub fn pegged_token(&self, token: Address) -> Option<&PeggedToken> {
        self.pegged.iter().find(|p| p.address == token)
    }

    pub fn base_token(&self) -> Option<&PeggedToken> {
        self.pegged_token(self.base_asset)
    }

    fn validate(&self) -> Result<()> {
        for (what, url) in [("explorer", &self.explorer_url), ("rpc", &self.rpc_url)] {
            Url::parse(url).map_err(|e| {
                ResolverError::Config(format!("{}: invalid {} url '{}': {}", self.network, what, url, e))
            })?;
        }
        for source in &self.sources {
            Url::parse(&source.subgraph_url).map_err(|e| {
                ResolverError::Config(format!(
                    "{}: invalid subgraph url for {}: {}",
                    self.network, source.name, e
                ))
            })?;
        }
        if !self.is_pegged(self.base_asset) {
            return Err(ResolverError::Config(format!(
                "{}: base asset {:?} is not a pegged token",
                self.network, self.base_asset
            )));
        }
        Ok(())
    }
}

struct SourceRow {
    name: &'static str,
    interface: PoolInterface,
    subgraph_url: &'static str,
    router: &'static str,
}

struct NetworkRow {
    network: Network,
    explorer_url: &'static str,
    rpc_url: &'static str,
    native_symbol: &'static str,
    sources: &'static [SourceRow],
    /// (symbol, address, decimals); the first entry is the base asset.
    pegged: &'static [(&'static str, &'static str, u8)],
}

const NETWORK_TABLE: &[NetworkRow] = &[
    NetworkRow {
        network: Network::Eth,
        explorer_url: "https://etherscan.io",
        rpc_url: "https://eth.llamarpc.com",
        native_symbol: "ETH",
        sources: &[
            SourceRow {
                name: "uniswapv2",
                interface: PoolInterface::UniswapV2,
                subgraph_url: "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v2",
                router: "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
            },
            SourceRow {
                name: "uniswapv3",
                interface: PoolInterface::UniswapV3,
                subgraph_url: "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v3",
                router: "0xe592427a0aece92de3edee1f18e0157c05861564",
            },
        ],
        pegged: &[
            ("WETH", "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", 18),
            ("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6),
            ("USDT", "0xdac17f958d2ee523a2206206994597c13d831ec7", 6),
            ("DAI", "0x6b175474e89094c44da98b954eedeac495271d0f", 18),
            ("WBTC", "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", 8),
            ("WMATIC", "0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0", 18),
        ],
    },
    NetworkRow {
        network: Network::Bsc,
        explorer_url: "https://bscscan.com",
        rpc_url: "https://bsc.llamarpc.com",
        native_symbol: "BNB",
        sources: &[SourceRow {
            name: "pancakeswap",
            interface: PoolInterface::UniswapV2,
            subgraph_url: "https://api.thegraph.com/subgraphs/name/pancakeswap/pairs",
            router: "0x05ff2b0db69458a0750badebc4f9e13add608c7f",
        }],
        pegged: &[
            ("WBNB", "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", 18),
            ("USDC", "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", 18),
            ("USDT", "0x55d398326f99059ff775485246999027b3197955", 18),
            ("DAI", "0x1af3f329e8be154074d8769d1ffa4ee058b1dbc3", 18),
            ("WBTC", "0x7130d2a12b9bcbfae4f2634d864a1ee1ce3ead9c", 18),
            ("WETH", "0x2170ed0880ac9a755fd29b2688956bd959f933f8", 18),
            ("BUSD", "0xe9e7cea3dedca5984780bafc599bd69add087d56", 18),
            ("CAKE", "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82", 18),
        ],
    },
    NetworkRow {
        network: Network::Polygon,
        explorer_url: "https://polygonscan.com",
        rpc_url: "https://polygon.llamarpc.com",
        native_symbol: "MATIC",
        sources: &[SourceRow {
            name: "uniswapv3",
            interface: PoolInterface::UniswapV3,
            subgraph_url: "https://api.thegraph.com/subgraphs/name/ianlapham/uniswap-v3-polygon",
            router: "0x1b02da8cb0d097eb8d57a175b88c7d8b47997506",
        }],
        pegged: &[
            ("WMATIC", "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270", 18),
            ("USDC", "0x2791bca1f2de4661ed88a30c99a7a9449aa84174", 6),
            ("USDT", "0xc2132d05d31c914a87c6611c10748aeb04b58e8f", 6),
            ("DAI", "0x8f3cf7ad23cd3cadbd9735aff958023239c6a063", 18),
            ("WBTC", "0x1bfd67037b42cf73acf2047067bd4f2c47d9bfd6", 8),
            ("WETH", "0x7ceb23fd6bc0add59e62ac25578270cff1b9f619", 18),
        ],
    },
    NetworkRow {
        network: Network::Mumbai,
        explorer_url: "https://mumbai.polygonscan.com",
        rpc_url: "https://rpc-mumbai.maticvigil.com",
        native_symbol: "MATIC",
        sources: &[],
        pegged: &[("WMATIC", "0x9c3c9283d3e44854697cd22d3faa240cfb032889", 18)],
    },
];

fn parse_address(network: Network, what: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw)
        .map_err(|e| ResolverError::Config(format!("{}: invalid {} address '{}': {}", network, what, raw, e)))
}

impl NetworkRow {
    fn build(&self, settings: &Settings) -> Result<NetworkConfig> {
        let overrides = settings.networks.get(self.network.as_str());

        let sources = self
            .sources
            .iter()
            .map(|s| {
                Ok(AmmSource {
                    name: s.name.to_string(),
                    interface: s.interface,
                    subgraph_url: s.subgraph_url.to_string(),
                    router: Some(parse_address(self.network, "router", s.router)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pegged = self
            .pegged
            .iter()
            .map(|(symbol, address, decimals)| {
                Ok(PeggedToken {
                    symbol: symbol.to_string(),
                    address: parse_address(self.network, symbol, address)?,
                    decimals: *decimals,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let base_asset = pegged
            .first()
            .map(|p| p.address)
            .ok_or_else(|| ResolverError::Config(format!("{}: no pegged tokens", self.network)))?;

        Ok(NetworkConfig {
            network: self.network,
            explorer_url: overrides
                .and_then(|o| o.explorer_url.clone())
                .unwrap_or_else(|| self.explorer_url.to_string()),
            rpc_url: overrides
                .and_then(|o| o.rpc_url.clone())
                .unwrap_or_else(|| self.rpc_url.to_string()),
            native_symbol: self.native_symbol.to_string(),
            sources,
            pegged,
            base_asset,
        })
    }
}

/// Immutable lookup table of every supported network.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: HashMap<Network, NetworkConfig>,
}

impl NetworkRegistry {
    pub fn new(settings: &Settings) -> Result<Self> {
        for key in settings.networks.keys() {
            key.parse::<Network>()
                .map_err(|_| ResolverError::Config(format!("override for unknown network '{}'", key)))?;
        }

        let mut networks = HashMap::new();
        for row in NETWORK_TABLE {
            let config = row.build(settings)?;
            config.validate()?;
            networks.insert(row.network, config);
        }
        info!("✅ Network registry ready ({} networks)", networks.len());
        Ok(Self { networks })
    }

    pub fn resolve(&self, network: Network) -> Result<&NetworkConfig> {
        self.networks
            .get(&network)
            .ok_or_else(|| ResolverError::UnknownNetwork(network.to_string()))
    }

    pub fn resolve_str(&self, network: &str) -> Result<&NetworkConfig> {
        self.resolve(network.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NetworkOverride;

    fn weth() -> Address {
        Address::from_str("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2").unwrap()
    }

    #[test]
    fn test_unknown_network() {
        let registry = NetworkRegistry::new(&Settings::default()).unwrap();
        assert!(matches!(
            registry.resolve_str("solana"),
            Err(ResolverError::UnknownNetwork(_))
        ));
        assert!(registry.resolve_str("ETH").is_ok());
    }

    #[test]
    fn test_every_network_has_a_pegged_base_asset() {
        let registry = NetworkRegistry::new(&Settings::default()).unwrap();
        for network in Network::ALL {
            let config = registry.resolve(network).unwrap();
            assert!(config.is_pegged(config.base_asset));
            assert!(config.base_token().is_some());
        }
    }

    #[test]
    fn test_pegged_membership_is_by_address() {
        let registry = NetworkRegistry::new(&Settings::default()).unwrap();
        let eth = registry.resolve(Network::Eth).unwrap();

        // mixed-case input parses to the same address
        assert!(eth.is_base_asset(weth()));
        let usdc = eth
            .pegged_token(Address::from_str("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").unwrap())
            .unwrap();
        assert_eq!(usdc.symbol, "USDC");
        assert_eq!(usdc.decimals, 6);

        // WETH on bsc is pegged, but not the base asset
        let bsc = registry.resolve(Network::Bsc).unwrap();
        assert!(!bsc.is_pegged(weth()));
        assert!(eth
            .sources
            .iter()
            .any(|s| s.name == "uniswapv3" && s.interface == PoolInterface::UniswapV3));
        assert!(registry.resolve(Network::Mumbai).unwrap().sources.is_empty());
    }

    #[test]
    fn test_url_overrides_and_validation() {
        let mut settings = Settings::default();
        settings.networks.insert(
            "polygon".to_string(),
            NetworkOverride {
                rpc_url: Some("http://localhost:8545".to_string()),
                explorer_url: None,
            },
        );
        let registry = NetworkRegistry::new(&settings).unwrap();
        let polygon = registry.resolve(Network::Polygon).unwrap();
        assert_eq!(polygon.rpc_url, "http://localhost:8545");
        assert_eq!(polygon.explorer_url, "https://polygonscan.com");

        settings.networks.insert(
            "bsc".to_string(),
            NetworkOverride {
                rpc_url: Some("not a url".to_string()),
                explorer_url: None,
            },
        );
        assert!(matches!(NetworkRegistry::new(&settings), Err(ResolverError::Config(_))));

        let mut settings = Settings::default();
        settings.networks.insert("avalanche".to_string(), NetworkOverride::default());
        assert!(matches!(NetworkRegistry::new(&settings), Err(ResolverError::Config(_))));
    }
}
