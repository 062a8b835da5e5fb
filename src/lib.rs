//! # On-chain Price Resolver
//!
//! Prices an arbitrary token contract against a network's pegged assets using on-chain AMM
//! liquidity rather than an off-chain feed.
//!
//! ## Overview
//!
//! A request runs through four stages:
//!
//! - **Discovery**: subgraph queries list the pairs a token trades in, pinned to one block
//! - **Path finding**: a bounded depth-first search links the token to a pegged asset
//! - **Reserves**: `getReserves()` (or pool balances) read at the same block
//! - **Rates**: per-hop reserve ratios composed into a fixed-point spot rate
//!
//! A separate path scrapes the explorer's token page for a native-currency price.
//!
//! ## External calls
//!
//! Every explorer, subgraph and JSON-RPC call goes through [`fetcher::ResilientFetcher`]:
//! results are memoized per call signature, transient failures retried with exponential
//! backoff, and explorer requests throttled by a process-wide rate limiter.
//!
//! ## Example
//!
//! ```no_run
//! use onchain_price_resolver::{PriceResolver, Settings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::new()?;
//! let resolver = PriceResolver::from_settings(&settings)?;
//! let quotes = resolver
//!     .quote("eth", "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984", "latest")
//!     .await?;
//! for q in quotes {
//!     println!("{:?} rate={} decimals={}", q.token, q.rate, q.decimals);
//! }
//! # Ok(())
//! # }
//! ```

// Core Types
/// Blocks, pairs, hops, routes and quotes
pub mod types;
/// Error taxonomy
pub mod errors;
/// Supported networks and their static configuration
pub mod networks;

// Infrastructure
/// Raw HTTP transport seam
pub mod transport;
/// Memoization store for external calls
pub mod cache;
/// Retry, memoization and rate limiting for external calls
pub mod fetcher;
/// JSON-RPC client
pub mod rpc;
/// Metrics and observability
pub mod metrics;

// Pricing
/// Pool reserve reads
pub mod reserves;
/// Subgraph pair discovery
pub mod discovery;
/// Route search
pub mod pathfinder;
/// Fixed-point rate composition
pub mod rates;
/// Explorer token page scraping
pub mod explorer;
/// Request facade
pub mod resolver;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use errors::{ResolverError, Result};
pub use networks::{Network, NetworkRegistry};
pub use resolver::PriceResolver;
pub use settings::Settings;
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{BlockTag, Hop, HopKind, Pair, RateQuote, Route, SwapPathInfo, TokenPrice};
