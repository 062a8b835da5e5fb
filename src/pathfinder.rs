// src/pathfinder.rs
//
// Bounded depth-first search from a query token to the network's pegged assets.

use ethers::types::Address;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::discovery::HopSource;
use crate::errors::Result;
use crate::metrics;
use crate::networks::{Network, NetworkRegistry};
use crate::types::{BlockTag, Hop, Route};

struct Frame {
    token: Address,
    path: Vec<Hop>,
    /// Tokens on this branch; copied per branch so siblings never see each other.
    visited: HashSet<Address>,
    depth: usize,
}

pub struct PathFinder<S: HopSource> {
    source: Arc<S>,
    registry: Arc<NetworkRegistry>,
    max_hops: usize,
}

impl<S: HopSource> PathFinder<S> {
    pub fn new(source: Arc<S>, registry: Arc<NetworkRegistry>, max_hops: usize) -> Self {
        Self {
            source,
            registry,
            max_hops,
        }
    }

    /// Hop converting a pegged asset into the base asset, if one exists.
    async fn terminal_hop(&self, pegged: Address, network: Network, block: u64) -> Result<Option<Hop>> {
        let config = self.registry.resolve(network)?;
        if config.is_base_asset(pegged) {
            return Ok(Some(Hop::pegged_base(pegged)));
        }
        Ok(self.source.pegged_hops(pegged, network, block).await?.into_iter().next())
    }

    /// Every distinct acyclic route from `token` to a pegged asset, all at one block.
    pub async fn find_routes(&self, token: Address, network: Network, block: BlockTag) -> Result<Vec<Route>> {
        let config = self.registry.resolve(network)?;
        let block = self.source.resolve_block(network, block).await?;

        if config.is_pegged(token) {
            let routes = match self.terminal_hop(token, network, block).await? {
                Some(terminal) => vec![Route::new(block, vec![terminal])],
                None => {
                    warn!("⚠️ Pegged token {:?} has no pair with the base asset on {}", token, network);
                    Vec::new()
                }
            };
            return Ok(routes);
        }

        let mut routes = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![Frame {
            token,
            path: Vec::new(),
            visited: HashSet::from([token]),
            depth: 0,
        }];

        while let Some(frame) = stack.pop() {
            let hops = self.source.hops_from(frame.token, network, block).await?;
            let mut children = Vec::new();

            for hop in hops {
                if config.is_pegged(hop.next) {
                    let Some(terminal) = self.terminal_hop(hop.next, network, block).await? else {
                        warn!("⚠️ No pegged pair for {:?} on {}, dropping route", hop.next, network);
                        continue;
                    };
                    let mut hops = frame.path.clone();
                    hops.push(hop);
                    hops.push(terminal);
                    let route = Route::new(block, hops);
                    if seen.insert(route.pool_path()) {
                        routes.push(route);
                    }
                    continue;
                }

                if frame.depth >= self.max_hops || frame.visited.contains(&hop.next) {
                    continue;
                }
                let mut visited = frame.visited.clone();
                visited.insert(hop.next);
                let mut path = frame.path.clone();
                let next = hop.next;
                path.push(hop);
                children.push(Frame {
                    token: next,
                    path,
                    visited,
                    depth: frame.depth + 1,
                });
            }

            // first discovered branch is explored first
            stack.extend(children.into_iter().rev());
        }

        debug!("🔍 {} routes for {:?} on {} at block {}", routes.len(), token, network, block);
        metrics::record_routes_found(network.as_str(), routes.len());
        Ok(routes)
    }
}

/// Orders routes by their weakest hop's near-side liquidity, deepest first.
pub fn rank_by_liquidity(mut routes: Vec<Route>) -> Vec<Route> {
    routes.sort_by(|a, b| b.liquidity_score().cmp(&a.liquidity_score()));
    routes
}
