// src/reserves.rs

use ethers::abi::{encode, Token};
use ethers::types::{Address, U256};
use log::debug;
use std::sync::Arc;

use crate::errors::{ResolverError, Result};
use crate::networks::Network;
use crate::rpc::RpcClient;
use crate::types::{BlockTag, Pair, PoolInterface, Reserves};

/// `getReserves()` selector.
pub const GET_RESERVES_SELECTOR: [u8; 4] = [0x09, 0x02, 0xf1, 0xac];
/// `balanceOf(address)` selector.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

/// Reads pool reserves through `eth_call`, pinned to a block.
#[derive(Clone)]
pub struct ReserveFetcher {
    rpc: Arc<RpcClient>,
}

/// Splits the leading two 32-byte big-endian words of an `eth_call` payload.
pub fn decode_reserves(payload: &[u8]) -> Result<Reserves> {
    if payload.len() < 64 {
        return Err(ResolverError::invalid_response(format!(
            "getReserves returned {} bytes, expected at least 64",
            payload.len()
        )));
    }
    Ok(Reserves::new(
        U256::from_big_endian(&payload[0..32]),
        U256::from_big_endian(&payload[32..64]),
    ))
}

fn decode_word(payload: &[u8]) -> Result<U256> {
    if payload.len() < 32 {
        return Err(ResolverError::invalid_response(format!(
            "balanceOf returned {} bytes, expected 32",
            payload.len()
        )));
    }
    Ok(U256::from_big_endian(&payload[0..32]))
}

impl ReserveFetcher {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// `getReserves()` of a constant-product pair.
    pub async fn reserves(&self, pair: Address, network: Network, block: BlockTag) -> Result<Reserves> {
        let payload = self
            .rpc
            .eth_call(network, pair, &GET_RESERVES_SELECTOR, block)
            .await?;
        let reserves = decode_reserves(&payload)?;
        debug!(
            "Reserves of {:?} at {}: ({}, {})",
            pair, block, reserves.reserve0, reserves.reserve1
        );
        Ok(reserves)
    }

    /// ERC-20 `balanceOf(holder)` of `token`.
    pub async fn balance_of(&self, token: Address, holder: Address, network: Network, block: BlockTag) -> Result<U256> {
        let mut calldata = BALANCE_OF_SELECTOR.to_vec();
        calldata.extend(encode(&[Token::Address(holder)]));
        let payload = self.rpc.eth_call(network, token, &calldata, block).await?;
        decode_word(&payload)
    }

    /// Reserves of any pool: `getReserves()` for V2 pairs, token balances for V3 pools.
    pub async fn pair_reserves(&self, pair: &Pair, network: Network, block: BlockTag) -> Result<Reserves> {
        match pair.interface {
            PoolInterface::UniswapV2 => self.reserves(pair.address, network, block).await,
            PoolInterface::UniswapV3 => {
                let reserve0 = self.balance_of(pair.token0, pair.address, network, block).await?;
                let reserve1 = self.balance_of(pair.token1, pair.address, network, block).await?;
                Ok(Reserves::new(reserve0, reserve1))
            }
        }
    }
}
