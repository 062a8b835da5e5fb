//! # Core Types
//!
//! Pairs, hops, routes and quotes produced by a single resolution request. None of these
//! are mutated after construction; attaching reserves produces new values.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ResolverError;
use crate::rates::pow10;

/// Block argument of a request: the literal `latest` or a concrete block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl BlockTag {
    pub fn number(&self) -> Option<u64> {
        match self {
            BlockTag::Latest => None,
            BlockTag::Number(n) => Some(*n),
        }
    }
}

impl FromStr for BlockTag {
    type Err = ResolverError;

    /// Accepts `latest` or a hexadecimal block number, with or without `0x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(BlockTag::Latest);
        }
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u64::from_str_radix(digits, 16)
            .map(BlockTag::Number)
            .map_err(|_| ResolverError::InvalidInput(format!("invalid block tag '{}'", s)))
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "{:#x}", n),
        }
    }
}

impl From<u64> for BlockTag {
    fn from(n: u64) -> Self {
        BlockTag::Number(n)
    }
}

/// Pool contract interface; decides how reserves are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolInterface {
    /// Constant-product pair exposing `getReserves()`.
    #[default]
    UniswapV2,
    /// Concentrated-liquidity pool; reserves are the pool's token balances.
    UniswapV3,
}

impl fmt::Display for PoolInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolInterface::UniswapV2 => write!(f, "uniswapv2"),
            PoolInterface::UniswapV3 => write!(f, "uniswapv3"),
        }
    }
}

/// One AMM liquidity pool between exactly two tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub decimals0: u8,
    pub decimals1: u8,
    /// Name of the AMM source the pair was discovered on (e.g. `uniswapv2`).
    pub source: String,
    pub interface: PoolInterface,
    /// Router of the AMM source, for callers that go on to build a swap.
    #[serde(default)]
    pub router: Option<Address>,
}

impl Pair {
    /// Side (0 or 1) `token` occupies in this pair.
    pub fn side_of(&self, token: Address) -> Option<u8> {
        if self.token0 == token {
            Some(0)
        } else if self.token1 == token {
            Some(1)
        } else {
            None
        }
    }

    pub fn token_on_side(&self, side: u8) -> Address {
        if side == 0 {
            self.token0
        } else {
            self.token1
        }
    }

    pub fn decimals_on_side(&self, side: u8) -> u8 {
        if side == 0 {
            self.decimals0
        } else {
            self.decimals1
        }
    }
}

/// The two raw reserve values of a pair at one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Reserves {
    pub reserve0: U256,
    pub reserve1: U256,
}

impl Reserves {
    pub fn new(reserve0: U256, reserve1: U256) -> Self {
        Self { reserve0, reserve1 }
    }

    /// Reserve of the token sitting on `side`.
    pub fn near(&self, side: u8) -> U256 {
        if side == 0 {
            self.reserve0
        } else {
            self.reserve1
        }
    }

    /// Reserve of the token opposite to `side`.
    pub fn far(&self, side: u8) -> U256 {
        if side == 0 {
            self.reserve1
        } else {
            self.reserve0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopKind {
    /// Traversal through a discovered liquidity pair.
    Lp,
    /// Conversion of a pegged asset into the base asset through their pair.
    Pegged,
    /// Synthetic identity hop: the token already is the base asset.
    PeggedBase,
}

/// A directed traversal edge `from → next` through a specific pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub kind: HopKind,
    pub from: Address,
    pub next: Address,
    /// Side (0 or 1) the `from` token occupies in the pair.
    pub side: u8,
    pub pair: Option<Pair>,
    pub reserves: Option<Reserves>,
}

impl Hop {
    /// Builds a hop leaving `from` through `pair`; `None` when `from` is not in the pair.
    pub fn through_pair(kind: HopKind, pair: Pair, from: Address) -> Option<Self> {
        let side = pair.side_of(from)?;
        let next = pair.token_on_side(1 - side);
        Some(Self {
            kind,
            from,
            next,
            side,
            pair: Some(pair),
            reserves: None,
        })
    }

    /// Identity hop for the network's base asset.
    pub fn pegged_base(token: Address) -> Self {
        Self {
            kind: HopKind::PeggedBase,
            from: token,
            next: token,
            side: 0,
            pair: None,
            reserves: None,
        }
    }

    pub fn pair_address(&self) -> Option<Address> {
        self.pair.as_ref().map(|p| p.address)
    }

    /// True when the hop goes through a pair whose reserves are not attached yet.
    pub fn needs_reserves(&self) -> bool {
        self.pair.is_some() && self.reserves.is_none()
    }

    pub fn with_reserves(&self, reserves: Reserves) -> Self {
        Self {
            reserves: Some(reserves),
            ..self.clone()
        }
    }

    /// Near-side reserve expressed in units of `10^(decimals-1)`.
    ///
    /// Pairs reporting zero decimals, or more decimals than a `U256` power of ten can
    /// hold, score zero; identity hops and hops without reserves have no score.
    pub fn liquidity_score(&self) -> Option<U256> {
        let pair = self.pair.as_ref()?;
        let reserves = self.reserves?;
        let decimals = pair.decimals_on_side(self.side);
        if decimals == 0 {
            return Some(U256::zero());
        }
        let score = pow10(decimals - 1)
            .map(|unit| reserves.near(self.side) / unit)
            .unwrap_or_default();
        Some(score)
    }
}

/// An ordered, cycle-free chain of hops from the query token to the base asset.
///
/// All hops but the last are traversal hops ending at a pegged asset; the last hop
/// converts that pegged asset into the base asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Block the route was discovered at; reserves are always read at this block.
    pub block: u64,
    pub hops: Vec<Hop>,
}

impl Route {
    pub fn new(block: u64, hops: Vec<Hop>) -> Self {
        Self { block, hops }
    }

    pub fn traversal_hops(&self) -> &[Hop] {
        match self.hops.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn terminal(&self) -> Option<&Hop> {
        self.hops.last()
    }

    /// Pool addresses in route order, with identity hops left out.
    pub fn pool_path(&self) -> Vec<Address> {
        self.hops.iter().filter_map(Hop::pair_address).collect()
    }

    /// Weakest hop liquidity along the route (zero if any pair lacks reserves).
    pub fn liquidity_score(&self) -> U256 {
        let mut min: Option<U256> = None;
        for hop in &self.hops {
            if hop.pair.is_none() {
                continue;
            }
            let score = hop.liquidity_score().unwrap_or_default();
            min = Some(match min {
                Some(current) if current <= score => current,
                _ => score,
            });
        }
        min.unwrap_or_else(U256::max_value)
    }
}

/// Spot rate of one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub token: Address,
    /// 1 raw unit of `token` = `rate / 1e6` raw units of the base asset.
    pub rate: U256,
    pub decimals: u8,
    /// Whole-token price in the base asset, scaled by 1e6 and normalized to 18 decimals;
    /// directly comparable with [`TokenPrice::price_scaled`].
    pub price_scaled: U256,
}

/// Explorer-derived price of a token in the network's native currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenPrice {
    /// Price scaled by 1e6.
    pub raw_price: U256,
    pub decimals: u8,
    /// `raw_price` normalized to 18 decimals.
    pub price_scaled: U256,
}

impl TokenPrice {
    /// The `(0,0,0)` "no price discoverable" sentinel.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.raw_price.is_zero() && self.decimals == 0 && self.price_scaled.is_zero()
    }
}

impl fmt::Display for TokenPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.raw_price, self.decimals, self.price_scaled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub base_asset_address: Address,
    pub is_base_asset: bool,
}

/// Result of a swap path request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPathInfo {
    pub routes: Vec<Route>,
    pub basic_info: BasicInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_low_u64_be(n as u64)
    }

    fn pair(token0: Address, token1: Address) -> Pair {
        Pair {
            address: addr(0xaa),
            token0,
            token1,
            decimals0: 18,
            decimals1: 6,
            source: "uniswapv2".to_string(),
            interface: PoolInterface::UniswapV2,
            router: None,
        }
    }

    #[test]
    fn test_block_tag_parsing() {
        assert_eq!("latest".parse::<BlockTag>().unwrap(), BlockTag::Latest);
        assert_eq!("0xf9f4f8".parse::<BlockTag>().unwrap(), BlockTag::Number(16_381_176));
        assert_eq!("f9f4f8".parse::<BlockTag>().unwrap(), BlockTag::Number(16_381_176));
        assert!("16381176z".parse::<BlockTag>().is_err());
        assert_eq!(BlockTag::Number(255).to_string(), "0xff");
        assert_eq!(BlockTag::Latest.to_string(), "latest");
    }

    #[test]
    fn test_hop_direction_from_either_side() {
        let a = addr(1);
        let b = addr(2);

        let hop = Hop::through_pair(HopKind::Lp, pair(a, b), a).unwrap();
        assert_eq!(hop.side, 0);
        assert_eq!(hop.next, b);

        let hop = Hop::through_pair(HopKind::Lp, pair(a, b), b).unwrap();
        assert_eq!(hop.side, 1);
        assert_eq!(hop.next, a);

        assert!(Hop::through_pair(HopKind::Lp, pair(a, b), addr(3)).is_none());
    }

    #[test]
    fn test_reserves_near_far() {
        let r = Reserves::new(U256::from(1000u64), U256::from(4000u64));
        assert_eq!(r.near(0), U256::from(1000u64));
        assert_eq!(r.far(0), U256::from(4000u64));
        assert_eq!(r.near(1), U256::from(4000u64));
        assert_eq!(r.far(1), U256::from(1000u64));
    }

    #[test]
    fn test_liquidity_score_uses_near_side_decimals() {
        let a = addr(1);
        let b = addr(2);
        let hop = Hop::through_pair(HopKind::Lp, pair(a, b), b)
            .unwrap()
            .with_reserves(Reserves::new(U256::exp10(18), U256::from(5_000_000u64)));
        // token1 has 6 decimals: 5_000_000 / 10^5
        assert_eq!(hop.liquidity_score(), Some(U256::from(50u64)));
        assert_eq!(Hop::pegged_base(a).liquidity_score(), None);
    }

    #[test]
    fn test_liquidity_score_with_oversized_decimals() {
        let a = addr(1);
        let b = addr(2);
        let mut hostile = pair(a, b);
        hostile.decimals0 = 200;
        let hop = Hop::through_pair(HopKind::Lp, hostile, a)
            .unwrap()
            .with_reserves(Reserves::new(U256::max_value(), U256::one()));
        assert_eq!(hop.liquidity_score(), Some(U256::zero()));
    }

    #[test]
    fn test_route_split_and_pool_path() {
        let a = addr(1);
        let b = addr(2);
        let lp = Hop::through_pair(HopKind::Lp, pair(a, b), a).unwrap();
        let route = Route::new(100, vec![lp.clone(), Hop::pegged_base(b)]);

        assert_eq!(route.traversal_hops(), &[lp]);
        assert_eq!(route.terminal().unwrap().kind, HopKind::PeggedBase);
        assert_eq!(route.pool_path(), vec![addr(0xaa)]);
    }

    #[test]
    fn test_token_price_sentinel() {
        let none = TokenPrice::none();
        assert!(none.is_none());
        assert_eq!(none.to_string(), "0,0,0");
    }
}
