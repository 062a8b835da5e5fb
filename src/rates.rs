// src/rates.rs
//
// Fixed-point spot rates. Every per-hop and per-route rate is an integer scaled by
// RATE_SCALE (1e6): "1 raw unit in = rate / 1e6 raw units out".

use ethers::types::{Address, U256, U512};
use log::debug;
use std::sync::Arc;

use crate::errors::{ResolverError, Result};
use crate::networks::{Network, NetworkRegistry};
use crate::reserves::ReserveFetcher;
use crate::types::{BlockTag, Hop, HopKind, RateQuote, Reserves, Route};

pub const RATE_SCALE: u64 = 1_000_000;

/// Safe multiply then divide: (a * b) / denom with U256, returning floor. Zero on a zero
/// denominator.
#[inline]
pub fn mul_div_floor(a: U256, b: U256, denom: U256) -> U256 {
    if a.is_zero() || b.is_zero() || denom.is_zero() {
        return U256::zero();
    }
    a.saturating_mul(b) / denom
}

/// `10^exp`, or `None` when it does not fit a `U256` (exp > 77).
pub fn pow10(exp: u8) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Rate of moving out of `side` through a pool with these reserves.
pub fn directional_rate(reserves: &Reserves, side: u8) -> U256 {
    mul_div_floor(reserves.far(side), U256::from(RATE_SCALE), reserves.near(side))
}

/// Per-hop rate; the identity hop is exactly 1.
pub fn hop_rate(hop: &Hop) -> Option<U256> {
    match hop.kind {
        HopKind::PeggedBase => Some(U256::from(RATE_SCALE)),
        HopKind::Lp | HopKind::Pegged => hop.reserves.map(|r| directional_rate(&r, hop.side)),
    }
}

/// Shifts both terms right until they fit in 256 bits, keeping their ratio.
fn shrink(numerator: &mut U512, denominator: &mut U512) {
    let bits = numerator.bits().max(denominator.bits());
    if bits > 256 {
        let shift = bits - 256;
        *numerator = *numerator >> shift;
        *denominator = *denominator >> shift;
    }
}

/// Rate of a whole route.
///
/// Far reserves are multiplied into one numerator and near reserves into one denominator,
/// and the division happens once at the end, so a hop whose own rate is below `1 / 1e6`
/// (an 18-decimal token into a 6-decimal stablecoin) does not zero the route. Identity
/// hops contribute nothing. `None` when a pair hop has no reserves; zero when any near
/// reserve is empty; saturates at `U256::MAX`.
pub fn route_rate(hops: &[Hop]) -> Option<U256> {
    let mut numerator = U512::from(RATE_SCALE);
    let mut denominator = U512::one();
    let mut drained = false;

    for hop in hops.iter().filter(|h| h.kind != HopKind::PeggedBase) {
        let reserves = hop.reserves?;
        let near = reserves.near(hop.side);
        if near.is_zero() {
            drained = true;
            continue;
        }
        numerator = numerator * U512::from(reserves.far(hop.side));
        denominator = denominator * U512::from(near);
        shrink(&mut numerator, &mut denominator);
    }

    if drained || numerator.is_zero() {
        return Some(U256::zero());
    }
    if denominator.is_zero() {
        return Some(U256::max_value());
    }
    Some(U256::try_from(numerator / denominator).unwrap_or_else(|_| U256::max_value()))
}

/// Normalizes a value expressed for `decimals` to 18 decimals.
///
/// Decimals too large for a `U256` power of ten divide the value down to zero.
pub fn scale_to_18_decimals(value: U256, decimals: u8) -> U256 {
    match decimals {
        d if d < 18 => pow10(18 - d).map_or_else(U256::max_value, |unit| value.saturating_mul(unit)),
        d if d > 18 => pow10(d - 18).map_or_else(U256::zero, |unit| value / unit),
        _ => value,
    }
}

/// Turns routes into rate quotes, reading any missing reserves at the route's block.
pub struct RateComposer {
    reserves: Arc<ReserveFetcher>,
    registry: Arc<NetworkRegistry>,
}

impl RateComposer {
    pub fn new(reserves: Arc<ReserveFetcher>, registry: Arc<NetworkRegistry>) -> Self {
        Self { reserves, registry }
    }

    /// Copy of `route` with reserves attached to every pair hop, all read at `route.block`.
    pub async fn attach_reserves(&self, route: &Route, network: Network) -> Result<Route> {
        let block = BlockTag::Number(route.block);
        let mut hops = Vec::with_capacity(route.hops.len());
        for hop in &route.hops {
            match &hop.pair {
                Some(pair) if hop.reserves.is_none() => {
                    let reserves = self.reserves.pair_reserves(pair, network, block).await?;
                    hops.push(hop.with_reserves(reserves));
                }
                _ => hops.push(hop.clone()),
            }
        }
        Ok(Route::new(route.block, hops))
    }

    /// Decimals of the token the route starts from.
    fn query_decimals(&self, route: &Route, network: Network) -> Result<(Address, u8)> {
        let first = route
            .hops
            .first()
            .ok_or_else(|| ResolverError::InvalidInput("route has no hops".to_string()))?;
        if let Some(pair) = &first.pair {
            return Ok((first.from, pair.decimals_on_side(first.side)));
        }
        let config = self.registry.resolve(network)?;
        let pegged = config.pegged_token(first.from).ok_or_else(|| {
            ResolverError::InvalidInput(format!("identity hop on non-pegged token {:?}", first.from))
        })?;
        Ok((first.from, pegged.decimals))
    }

    /// Decimals of the asset every route ends in.
    fn base_decimals(&self, network: Network) -> Result<u8> {
        let config = self.registry.resolve(network)?;
        config
            .base_token()
            .map(|base| base.decimals)
            .ok_or_else(|| ResolverError::Config(format!("{}: base asset is not a pegged token", network)))
    }

    /// Spot rate of `route`.
    ///
    /// `price_scaled` follows the explorer convention (whole-token price × 1e6, then
    /// normalized by the token's decimals), which reduces to normalizing `rate` by the
    /// base asset's decimals.
    pub async fn quote(&self, route: &Route, network: Network) -> Result<RateQuote> {
        let route = if route.hops.iter().any(Hop::needs_reserves) {
            self.attach_reserves(route, network).await?
        } else {
            route.clone()
        };

        let rate = route_rate(&route.hops).ok_or_else(|| {
            let missing = route.hops.iter().find(|h| h.needs_reserves()).and_then(Hop::pair_address);
            ResolverError::InvalidInput(format!("hop through {:?} has no reserves", missing))
        })?;
        let (token, decimals) = self.query_decimals(&route, network)?;
        let base_decimals = self.base_decimals(network)?;

        debug!(
            "Quote for {:?} on {} at block {}: rate={} decimals={} hops={:?}",
            token,
            network,
            route.block,
            rate,
            decimals,
            route.hops.iter().map(hop_rate).collect::<Vec<_>>()
        );
        Ok(RateQuote {
            token,
            rate,
            decimals,
            price_scaled: scale_to_18_decimals(rate, base_decimals),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_directional_rate() {
        let reserves = Reserves::new(u(1000), u(4000));
        assert_eq!(directional_rate(&reserves, 0), u(4_000_000));
        assert_eq!(directional_rate(&reserves, 1), u(250_000));
    }

    #[test]
    fn test_empty_near_reserve_is_zero_rate() {
        let reserves = Reserves::new(U256::zero(), u(4000));
        assert_eq!(directional_rate(&reserves, 0), U256::zero());
        assert_eq!(directional_rate(&reserves, 1), U256::zero());
    }

    #[test]
    fn test_base_asset_identity() {
        let hop = Hop::pegged_base(Address::from_low_u64_be(1));
        assert_eq!(hop_rate(&hop), Some(u(RATE_SCALE)));
        assert_eq!(route_rate(&[hop]), Some(u(1_000_000)));
    }

    fn lp(from: Address, to: Address, decimals_from: u8, decimals_to: u8, near: U256, far: U256) -> Hop {
        use crate::types::{Pair, PoolInterface};
        let pair = Pair {
            address: Address::from_low_u64_be(0xaa),
            token0: from,
            token1: to,
            decimals0: decimals_from,
            decimals1: decimals_to,
            source: "uniswapv2".to_string(),
            interface: PoolInterface::UniswapV2,
            router: None,
        };
        Hop::through_pair(HopKind::Lp, pair, from).unwrap().with_reserves(Reserves::new(near, far))
    }

    #[test]
    fn test_route_rate_single_hop_matches_directional_rate() {
        let (a, b) = (Address::from_low_u64_be(1), Address::from_low_u64_be(2));
        let hops = vec![lp(a, b, 18, 18, u(1000), u(4000)), Hop::pegged_base(b)];
        assert_eq!(route_rate(&hops), Some(u(4_000_000)));
        assert_eq!(route_rate(&[Hop::pegged_base(a)]), Some(u(RATE_SCALE)));
    }

    #[test]
    fn test_route_rate_through_low_decimal_stablecoin() {
        let (token, usdc, weth) = (Address::from_low_u64_be(1), Address::from_low_u64_be(2), Address::from_low_u64_be(3));
        // 2 TOKEN : 5 USDC, then 2,000,000 USDC : 1000 WETH
        let into_usdc = lp(token, usdc, 18, 6, U256::exp10(18) * 2, u(5_000_000));
        let into_weth = lp(usdc, weth, 6, 18, U256::exp10(12) * 2, U256::exp10(21));

        // the first hop alone is below 1 / 1e6 per raw unit
        assert_eq!(hop_rate(&into_usdc), Some(U256::zero()));
        // 1 TOKEN = 0.00125 WETH, and both have 18 decimals
        assert_eq!(route_rate(&[into_usdc, into_weth]), Some(u(1_250)));
    }

    #[test]
    fn test_route_rate_drained_or_missing_reserves() {
        let (a, b, c) = (Address::from_low_u64_be(1), Address::from_low_u64_be(2), Address::from_low_u64_be(3));
        let drained = lp(a, b, 18, 18, U256::zero(), u(4000));
        let healthy = lp(b, c, 18, 18, u(1000), u(4000));
        assert_eq!(route_rate(&[drained.clone(), healthy.clone()]), Some(U256::zero()));

        let unread = Hop { reserves: None, ..healthy };
        assert_eq!(route_rate(&[drained, unread]), None);
    }

    #[test]
    fn test_route_rate_with_huge_reserves() {
        let (a, b, c, d) = (
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
            Address::from_low_u64_be(3),
            Address::from_low_u64_be(4),
        );
        let big = U256::max_value() / 2;
        let hops = vec![
            lp(a, b, 18, 18, big, big),
            lp(b, c, 18, 18, big, big * 2),
            lp(c, d, 18, 18, big * 2, big),
        ];
        let rate = route_rate(&hops).unwrap();
        // 1.0 up to the precision lost by shrinking
        assert!(rate >= u(999_999) && rate <= u(1_000_001), "rate = {}", rate);

        let runaway = vec![lp(a, b, 18, 18, U256::one(), U256::max_value()), lp(b, c, 18, 18, U256::one(), U256::max_value())];
        assert_eq!(route_rate(&runaway), Some(U256::max_value()));
    }

    #[test]
    fn test_scale_to_18_decimals() {
        assert_eq!(scale_to_18_decimals(u(2_500_000), 6), u(2_500_000) * U256::exp10(12));
        assert_eq!(scale_to_18_decimals(u(2_500_000), 18), u(2_500_000));
        assert_eq!(scale_to_18_decimals(u(2_500_000), 24), u(2));
        assert_eq!(scale_to_18_decimals(u(2_500_000), 0), u(2_500_000) * U256::exp10(18));
    }

    #[test]
    fn test_scale_to_18_decimals_with_oversized_decimals() {
        assert_eq!(pow10(77), Some(U256::exp10(77)));
        assert_eq!(pow10(78), None);
        assert_eq!(scale_to_18_decimals(u(1), 120), U256::zero());
        assert_eq!(scale_to_18_decimals(U256::max_value(), 255), U256::zero());
        assert_eq!(scale_to_18_decimals(U256::max_value(), 95), U256::max_value() / U256::exp10(77));
    }

    #[test]
    fn test_lp_hop_without_reserves_has_no_rate() {
        use crate::types::{Pair, PoolInterface};
        let pair = Pair {
            address: Address::from_low_u64_be(9),
            token0: Address::from_low_u64_be(1),
            token1: Address::from_low_u64_be(2),
            decimals0: 18,
            decimals1: 18,
            source: "uniswapv2".to_string(),
            interface: PoolInterface::UniswapV2,
            router: None,
        };
        let hop = Hop::through_pair(HopKind::Lp, pair, Address::from_low_u64_be(1)).unwrap();
        assert_eq!(hop_rate(&hop), None);
        assert_eq!(hop_rate(&hop.with_reserves(Reserves::new(u(1000), u(4000)))), Some(u(4_000_000)));
    }
}
