//! # Price Resolver
//!
//! Facade wiring the registry, fetcher, discovery, path finder, rate composer and
//! explorer scraper together. Takes raw string inputs, the way requests arrive.

use ethers::types::Address;
use log::info;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::FetchCache;
use crate::discovery::PairDiscovery;
use crate::errors::{ResolverError, Result};
use crate::explorer::ExplorerScraper;
use crate::fetcher::ResilientFetcher;
use crate::networks::{Network, NetworkRegistry};
use crate::pathfinder::PathFinder;
use crate::rates::RateComposer;
use crate::reserves::ReserveFetcher;
use crate::rpc::RpcClient;
use crate::settings::Settings;
use crate::transport::{HttpTransport, Transport};
use crate::types::{BasicInfo, BlockTag, RateQuote, SwapPathInfo, TokenPrice};

pub struct PriceResolver {
    registry: Arc<NetworkRegistry>,
    fetcher: Arc<ResilientFetcher>,
    pathfinder: PathFinder<PairDiscovery>,
    composer: RateComposer,
    explorer: ExplorerScraper,
}

pub fn parse_token(token: &str) -> Result<Address> {
    Address::from_str(token.trim()).map_err(|e| ResolverError::InvalidInput(format!("bad token address '{}': {}", token, e)))
}

impl PriceResolver {
    /// Resolver over the real HTTP transport.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_millis(settings.fetcher.http_timeout_ms))?;
        Self::new(settings, Arc::new(transport))
    }

    pub fn new(settings: &Settings, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_cache(settings, transport, Arc::new(FetchCache::new()))
    }

    /// Resolver sharing an externally owned memo cache.
    pub fn with_cache(settings: &Settings, transport: Arc<dyn Transport>, cache: Arc<FetchCache>) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| ResolverError::Config(e.to_string()))?;

        let registry = Arc::new(NetworkRegistry::new(settings)?);
        let fetcher = Arc::new(ResilientFetcher::with_cache(&settings.fetcher, cache)?);
        let rpc = Arc::new(RpcClient::new(transport.clone(), fetcher.clone(), registry.clone()));
        let discovery = Arc::new(PairDiscovery::new(
            transport.clone(),
            fetcher.clone(),
            rpc.clone(),
            registry.clone(),
            &settings.discovery,
        ));
        let reserves = Arc::new(ReserveFetcher::new(rpc));

        info!(
            "✅ Price resolver ready (max_hops={}, pairs_per_side={})",
            settings.discovery.max_hops, settings.discovery.pairs_per_side
        );
        Ok(Self {
            pathfinder: PathFinder::new(discovery, registry.clone(), settings.discovery.max_hops),
            composer: RateComposer::new(reserves, registry.clone()),
            explorer: ExplorerScraper::new(transport, fetcher.clone(), registry.clone()),
            registry,
            fetcher,
        })
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        self.fetcher.cache()
    }

    /// Every route from `token` to the base asset, reserves attached, all at one block.
    pub async fn swap_path(&self, network: &str, token: &str, block: &str) -> Result<SwapPathInfo> {
        let network = Network::from_str(network)?;
        let token = parse_token(token)?;
        let block = BlockTag::from_str(block)?;
        self.swap_path_at(network, token, block).await
    }

    pub async fn swap_path_at(&self, network: Network, token: Address, block: BlockTag) -> Result<SwapPathInfo> {
        let config = self.registry.resolve(network)?;
        let found = self.pathfinder.find_routes(token, network, block).await?;

        let mut routes = Vec::with_capacity(found.len());
        for route in &found {
            routes.push(self.composer.attach_reserves(route, network).await?);
        }

        info!("✅ {} swap routes for {:?} on {}", routes.len(), token, network);
        Ok(SwapPathInfo {
            routes,
            basic_info: BasicInfo {
                base_asset_address: config.base_asset,
                is_base_asset: config.is_base_asset(token),
            },
        })
    }

    /// Spot rate of every route, in route order.
    pub async fn quote(&self, network: &str, token: &str, block: &str) -> Result<Vec<RateQuote>> {
        let network = Network::from_str(network)?;
        let token = parse_token(token)?;
        let block = BlockTag::from_str(block)?;

        let info = self.swap_path_at(network, token, block).await?;
        let mut quotes = Vec::with_capacity(info.routes.len());
        for route in &info.routes {
            quotes.push(self.composer.quote(route, network).await?);
        }
        Ok(quotes)
    }

    /// Explorer price of `token` in the network's native currency.
    pub async fn price(&self, network: &str, token: &str) -> Result<TokenPrice> {
        let network = Network::from_str(network)?;
        let token = parse_token(token)?;
        self.explorer.token_price(network, token).await
    }
}
