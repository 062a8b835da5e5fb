//! # Pair Discovery
//!
//! Finds the liquidity pairs a token participates in, by querying each AMM source's
//! subgraph at a pinned block. Results come back as [`Hop`]s leaving the token; reserves
//! are attached later by the resolver.

use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{ResolverError, Result};
use crate::fetcher::{CallKind, CallSignature, ResilientFetcher};
use crate::networks::{AmmSource, Network, NetworkRegistry};
use crate::rpc::RpcClient;
use crate::settings::DiscoverySettings;
use crate::transport::{Transport, TransportError};
use crate::types::{BlockTag, Hop, HopKind, Pair, PoolInterface};

/// Source of graph edges for the path finder.
#[async_trait]
pub trait HopSource: Send + Sync {
    /// Turns a request block tag into the concrete block used for the whole request.
    async fn resolve_block(&self, network: Network, block: BlockTag) -> Result<u64>;

    /// Every discovered hop leaving `token` at `block`.
    async fn hops_from(&self, token: Address, network: Network, block: u64) -> Result<Vec<Hop>>;

    /// Hops from `token` straight into the network's base asset.
    async fn pegged_hops(&self, token: Address, network: Network, block: u64) -> Result<Vec<Hop>>;
}

#[derive(Debug, Deserialize)]
struct SubgraphResponse {
    data: Option<PairSides>,
}

#[derive(Debug, Deserialize)]
struct PairSides {
    #[serde(default)]
    p0: Vec<SubgraphPair>,
    #[serde(default)]
    p1: Vec<SubgraphPair>,
}

#[derive(Debug, Deserialize)]
struct SubgraphPair {
    id: String,
    token0: SubgraphToken,
    token1: SubgraphToken,
}

#[derive(Debug, Deserialize)]
struct SubgraphToken {
    id: String,
    /// Subgraphs serialize BigInt fields as strings; accept numbers too.
    decimals: Value,
}

fn entity_for(interface: PoolInterface) -> &'static str {
    match interface {
        PoolInterface::UniswapV2 => "pairs",
        PoolInterface::UniswapV3 => "pools",
    }
}

/// Two aliased selections: pools with `token` as token0 (`p0`) and as token1 (`p1`),
/// optionally restricted to a single counterpart token.
pub fn build_pairs_query(
    interface: PoolInterface,
    block: u64,
    first: u32,
    token: Address,
    counterpart: Option<Address>,
) -> String {
    let entity = entity_for(interface);
    let token = format!("{:?}", token);
    let (where0, where1) = match counterpart {
        Some(other) => {
            let other = format!("{:?}", other);
            (
                format!("token0: \"{}\", token1: \"{}\"", token, other),
                format!("token1: \"{}\", token0: \"{}\"", token, other),
            )
        }
        None => (format!("token0: \"{}\"", token), format!("token1: \"{}\"", token)),
    };
    let fields = "id token0 { decimals id } token1 { decimals id }";
    format!(
        "{{ p0: {entity}(block: {{number: {block}}}, first: {first}, where: {{{where0}}}) {{ {fields} }} \
         p1: {entity}(block: {{number: {block}}}, first: {first}, where: {{{where1}}}) {{ {fields} }} }}"
    )
}

fn parse_decimals(value: &Value) -> Result<u8> {
    let parsed = match value {
        Value::String(s) => s.trim().parse::<u8>().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| ResolverError::invalid_response(format!("bad token decimals {}", value)))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|e| ResolverError::invalid_response(format!("bad address '{}': {}", raw, e)))
}

impl SubgraphPair {
    fn into_pair(self, source: &AmmSource) -> Result<Pair> {
        Ok(Pair {
            address: parse_address(&self.id)?,
            token0: parse_address(&self.token0.id)?,
            token1: parse_address(&self.token1.id)?,
            decimals0: parse_decimals(&self.token0.decimals)?,
            decimals1: parse_decimals(&self.token1.decimals)?,
            source: source.name.clone(),
            interface: source.interface,
            router: source.router,
        })
    }
}

/// Converts a raw subgraph payload into hops leaving `token`.
pub fn hops_from_payload(payload: Value, token: Address, source: &AmmSource, kind: HopKind) -> Result<Vec<Hop>> {
    let response: SubgraphResponse = serde_json::from_value(payload)
        .map_err(|e| ResolverError::invalid_response(format!("{} subgraph payload: {}", source.name, e)))?;
    let sides = response
        .data
        .ok_or_else(|| ResolverError::invalid_response(format!("{} subgraph payload has no data", source.name)))?;

    let mut hops = Vec::with_capacity(sides.p0.len() + sides.p1.len());
    for row in sides.p0.into_iter().chain(sides.p1) {
        let pair = row.into_pair(source)?;
        let address = pair.address;
        match Hop::through_pair(kind, pair, token) {
            Some(hop) => hops.push(hop),
            None => warn!("⚠️ Pair {:?} from {} does not contain {:?}, skipping", address, source.name, token),
        }
    }
    Ok(hops)
}

/// Subgraph-backed [`HopSource`].
pub struct PairDiscovery {
    transport: Arc<dyn Transport>,
    fetcher: Arc<ResilientFetcher>,
    rpc: Arc<RpcClient>,
    registry: Arc<NetworkRegistry>,
    pairs_per_side: u32,
    latest_block_offset: u64,
}

impl PairDiscovery {
    pub fn new(
        transport: Arc<dyn Transport>,
        fetcher: Arc<ResilientFetcher>,
        rpc: Arc<RpcClient>,
        registry: Arc<NetworkRegistry>,
        settings: &DiscoverySettings,
    ) -> Self {
        Self {
            transport,
            fetcher,
            rpc,
            registry,
            pairs_per_side: settings.pairs_per_side,
            latest_block_offset: settings.latest_block_offset,
        }
    }

    async fn query_source(
        &self,
        source: &AmmSource,
        network: Network,
        token: Address,
        counterpart: Option<Address>,
        block: u64,
    ) -> Result<Value> {
        let method = if counterpart.is_some() { "pegged_pairs" } else { "pairs" };
        let signature = CallSignature::new(CallKind::Subgraph, network, method, format!("{:?}", token))
            .at_block(BlockTag::Number(block))
            .with_arg(source.name.clone())
            .with_arg(self.pairs_per_side.to_string());
        let body = json!({
            "query": build_pairs_query(source.interface, block, self.pairs_per_side, token, counterpart),
        });
        let url = source.subgraph_url.clone();

        self.fetcher
            .fetch(signature, || {
                let transport = self.transport.clone();
                let url = url.clone();
                let body = body.clone();
                async move {
                    let response = transport.post_json(&url, &body).await?;
                    match response.get("errors") {
                        Some(errors) if !errors.is_null() => Err(TransportError::GraphQl(errors.to_string())),
                        _ => Ok(response),
                    }
                }
            })
            .await
    }

    async fn discover(&self, token: Address, network: Network, block: u64, pegged: bool) -> Result<Vec<Hop>> {
        let config = self.registry.resolve(network)?;
        let (counterpart, kind) = if pegged {
            (Some(config.base_asset), HopKind::Pegged)
        } else {
            (None, HopKind::Lp)
        };

        let mut hops = Vec::new();
        for source in &config.sources {
            let payload = self.query_source(source, network, token, counterpart, block).await?;
            hops.extend(hops_from_payload(payload, token, source, kind)?);
        }
        debug!(
            "🔍 {} {:?} hops from {:?} on {} at block {}",
            hops.len(),
            kind,
            token,
            network,
            block
        );
        Ok(hops)
    }
}

#[async_trait]
impl HopSource for PairDiscovery {
    async fn resolve_block(&self, network: Network, block: BlockTag) -> Result<u64> {
        match block {
            BlockTag::Number(n) => Ok(n),
            BlockTag::Latest => {
                let head = self.rpc.block_number(network).await?;
                Ok(head.saturating_sub(self.latest_block_offset))
            }
        }
    }

    async fn hops_from(&self, token: Address, network: Network, block: u64) -> Result<Vec<Hop>> {
        self.discover(token, network, block, false).await
    }

    async fn pegged_hops(&self, token: Address, network: Network, block: u64) -> Result<Vec<Hop>> {
        if self.registry.resolve(network)?.is_base_asset(token) {
            return Ok(Vec::new());
        }
        self.discover(token, network, block, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(interface: PoolInterface) -> AmmSource {
        AmmSource {
            name: "uniswapv2".to_string(),
            interface,
            subgraph_url: "https://subgraph.example".to_string(),
            router: None,
        }
    }

    fn token() -> Address {
        Address::from_str("0x1111111111111111111111111111111111111111").unwrap()
    }

    #[test]
    fn test_query_shape() {
        let query = build_pairs_query(PoolInterface::UniswapV2, 16_000_000, 10, token(), None);
        assert!(query.contains("p0: pairs(block: {number: 16000000}, first: 10, where: {token0: \"0x1111111111111111111111111111111111111111\"})"));
        assert!(query.contains("p1: pairs("));
        assert!(query.contains("token1 { decimals id }"));

        let weth = Address::from_str("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap();
        let query = build_pairs_query(PoolInterface::UniswapV3, 1, 10, token(), Some(weth));
        assert!(query.contains("p0: pools("));
        assert!(query.contains("token1: \"0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2\""));
    }

    #[test]
    fn test_payload_to_hops() {
        let payload = json!({
            "data": {
                "p0": [{
                    "id": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                    "token0": {"id": "0x1111111111111111111111111111111111111111", "decimals": "9"},
                    "token1": {"id": "0x2222222222222222222222222222222222222222", "decimals": "18"}
                }],
                "p1": [{
                    "id": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
                    "token0": {"id": "0x3333333333333333333333333333333333333333", "decimals": 6},
                    "token1": {"id": "0x1111111111111111111111111111111111111111", "decimals": "9"}
                }, {
                    "id": "0xcccccccccccccccccccccccccccccccccccccccc",
                    "token0": {"id": "0x4444444444444444444444444444444444444444", "decimals": "18"},
                    "token1": {"id": "0x5555555555555555555555555555555555555555", "decimals": "18"}
                }]
            }
        });

        let hops = hops_from_payload(payload, token(), &source(PoolInterface::UniswapV2), HopKind::Lp).unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].side, 0);
        assert_eq!(hops[0].next, Address::from_str("0x2222222222222222222222222222222222222222").unwrap());
        assert_eq!(hops[1].side, 1);
        assert_eq!(hops[1].pair.as_ref().unwrap().decimals0, 6);
        assert!(hops.iter().all(|h| h.reserves.is_none()));
        assert!(hops.iter().all(|h| h.pair.as_ref().unwrap().router.is_none()));
    }

    #[test]
    fn test_pairs_carry_source_router() {
        let router = Address::from_str("0x7a250d5630b4cf539739df2c5dacb4c659f2488d").unwrap();
        let payload = json!({
            "data": {
                "p0": [{
                    "id": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                    "token0": {"id": "0x1111111111111111111111111111111111111111", "decimals": "18"},
                    "token1": {"id": "0x2222222222222222222222222222222222222222", "decimals": "18"}
                }],
                "p1": []
            }
        });
        let amm = AmmSource {
            router: Some(router),
            ..source(PoolInterface::UniswapV2)
        };

        let hops = hops_from_payload(payload, token(), &amm, HopKind::Lp).unwrap();
        assert_eq!(hops[0].pair.as_ref().unwrap().router, Some(router));
    }

    #[test]
    fn test_empty_sides_are_empty_list() {
        let payload = json!({"data": {"p0": [], "p1": []}});
        let hops = hops_from_payload(payload, token(), &source(PoolInterface::UniswapV2), HopKind::Lp).unwrap();
        assert!(hops.is_empty());
    }

    #[test]
    fn test_missing_data_is_invalid_response() {
        let payload = json!({"message": "indexing"});
        assert!(matches!(
            hops_from_payload(payload, token(), &source(PoolInterface::UniswapV2), HopKind::Lp),
            Err(ResolverError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_bad_decimals_are_invalid_response() {
        assert_eq!(parse_decimals(&json!("18")).unwrap(), 18);
        assert_eq!(parse_decimals(&json!(6)).unwrap(), 6);
        assert!(parse_decimals(&json!("eighteen")).is_err());
        assert!(parse_decimals(&json!(300)).is_err());
    }
}
