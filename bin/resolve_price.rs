//! # Resolve Price
//!
//! Command line front end for the price resolver.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin resolve_price -- swap-path --network eth --token 0x1f98...f984
//! cargo run --bin resolve_price -- quote --network bsc --token 0x0e09...ce82 --block 0x1a2b3c
//! cargo run --bin resolve_price -- price --network polygon --token 0x0d50...1270
//! ```
//!
//! Output is JSON on stdout; logs go to stderr (`RUST_LOG=info`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use onchain_price_resolver::pathfinder::rank_by_liquidity;
use onchain_price_resolver::{metrics, PriceResolver, Settings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file; defaults to ./Config.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// eth, bsc, polygon or mumbai
    #[arg(long)]
    network: String,
    #[arg(long)]
    token: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Routes from the token to the base asset, with reserves
    SwapPath {
        #[command(flatten)]
        target: Target,
        /// Hex block number or `latest`
        #[arg(long, default_value = "latest")]
        block: String,
        /// Order routes by their weakest pool's liquidity, deepest first
        #[arg(long)]
        rank: bool,
    },
    /// Spot rate of every route
    Quote {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "latest")]
        block: String,
    },
    /// Explorer price in the native currency
    Price {
        #[command(flatten)]
        target: Target,
    },
}

#[cfg(feature = "observability")]
fn install_metrics_exporter() -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .context("Failed to install Prometheus exporter")?;
    metrics::describe_metrics();
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn install_metrics_exporter() -> Result<()> {
    metrics::describe_metrics();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path).with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::new().context("Failed to load settings")?,
    };
    install_metrics_exporter()?;

    let resolver = PriceResolver::from_settings(&settings)?;

    let output = match &cli.command {
        Command::SwapPath { target, block, rank } => {
            let mut info = resolver.swap_path(&target.network, &target.token, block).await?;
            if *rank {
                info.routes = rank_by_liquidity(info.routes);
            }
            serde_json::to_string_pretty(&info)?
        }
        Command::Quote { target, block } => {
            serde_json::to_string_pretty(&resolver.quote(&target.network, &target.token, block).await?)?
        }
        Command::Price { target } => {
            let price = resolver.price(&target.network, &target.token).await?;
            serde_json::to_string_pretty(&serde_json::json!({
                "price": price,
                "raw": price.to_string(),
            }))?
        }
    };
    println!("{}", output);

    Ok(())
}
