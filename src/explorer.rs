// src/explorer.rs
//
// Token price from the block explorer's token page, quoted in the native currency.

use ethers::types::{Address, U256};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{ResolverError, Result};
use crate::fetcher::{CallKind, CallSignature, ResilientFetcher};
use crate::networks::{Network, NetworkRegistry};
use crate::rates::{scale_to_18_decimals, RATE_SCALE};
use crate::transport::Transport;
use crate::types::TokenPrice;

static DECIMALS_FINDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Decimals:</div><div class="col-md-8">(.+?)</div>"#).expect("valid decimals pattern")
});
static DECIMALS_FINDER_NEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WITH <b>(.+?)</b> Decimals").expect("valid decimals pattern"));

/// Extracts `(price, decimals)` from an explorer token page; `none()` when either is missing.
pub fn parse_token_page(html: &str, native_symbol: &str) -> Result<TokenPrice> {
    let page: String = html.chars().filter(|c| !matches!(c, '\r' | '\t' | '\n')).collect();

    let price_finder = Regex::new(&format!("@ (.+?) {}</span>", regex::escape(native_symbol)))
        .map_err(|e| ResolverError::Config(format!("bad native symbol '{}': {}", native_symbol, e)))?;

    let price = price_finder
        .captures(&page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(',', ""));
    let decimals = DECIMALS_FINDER
        .captures(&page)
        .or_else(|| DECIMALS_FINDER_NEW.captures(&page))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let (Some(price), Some(decimals)) = (price, decimals) else {
        return Ok(TokenPrice::none());
    };

    let Ok(decimals) = decimals.parse::<u8>() else {
        warn!("⚠️ Unparseable decimals '{}' on token page", decimals);
        return Ok(TokenPrice::none());
    };
    let raw = Decimal::from_str(price.trim())
        .ok()
        .and_then(|p| p.checked_mul(Decimal::from(RATE_SCALE)))
        .and_then(|p| p.trunc().to_u128());
    let Some(raw) = raw else {
        warn!("⚠️ Unparseable price '{}' on token page", price);
        return Ok(TokenPrice::none());
    };

    let raw_price = U256::from(raw);
    Ok(TokenPrice {
        raw_price,
        decimals,
        price_scaled: scale_to_18_decimals(raw_price, decimals),
    })
}

pub struct ExplorerScraper {
    transport: Arc<dyn Transport>,
    fetcher: Arc<ResilientFetcher>,
    registry: Arc<NetworkRegistry>,
}

impl ExplorerScraper {
    pub fn new(transport: Arc<dyn Transport>, fetcher: Arc<ResilientFetcher>, registry: Arc<NetworkRegistry>) -> Self {
        Self {
            transport,
            fetcher,
            registry,
        }
    }

    pub async fn token_price(&self, network: Network, token: Address) -> Result<TokenPrice> {
        let config = self.registry.resolve(network)?;
        let target = format!("{:?}", token);
        let url = format!("{}/token/{}", config.explorer_url.trim_end_matches('/'), target);
        let signature = CallSignature::new(CallKind::Explorer, network, "token_page", target);

        let page = self
            .fetcher
            .fetch(signature, || {
                let transport = self.transport.clone();
                let url = url.clone();
                async move { transport.get_text(&url).await.map(Value::String) }
            })
            .await?;

        let html = page
            .as_str()
            .ok_or_else(|| ResolverError::invalid_response(format!("explorer page for {:?} is not text", token)))?;
        let price = parse_token_page(html, &config.native_symbol)?;
        if price.is_none() {
            warn!("⚠️ No explorer price for {:?} on {}", token, network);
        } else {
            info!("✅ Explorer price for {:?} on {}: {}", token, network, price);
        }
        Ok(price)
    }
}
