use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Retry budget of one call kind.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetrySettings {
    /// Total tries, including the first one.
    pub attempts: u32,
    pub delay_ms: u64,
    /// Multiplier applied to the delay after every failed try.
    pub backoff: f64,
}

impl RetrySettings {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.attempts == 0 {
            return Err(ConfigError::Message(format!("fetcher.{}.attempts must be at least 1", name)));
        }
        if !self.backoff.is_finite() || self.backoff < 0.0 {
            return Err(ConfigError::Message(format!(
                "fetcher.{}.backoff must be a non-negative number",
                name
            )));
        }
        Ok(())
    }
}

fn default_rpc_retry() -> RetrySettings {
    RetrySettings {
        attempts: 10,
        delay_ms: 500,
        backoff: 0.3,
    }
}

fn default_explorer_retry() -> RetrySettings {
    RetrySettings {
        attempts: 3,
        delay_ms: 500,
        backoff: 2.0,
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub calls: u32,
    pub period_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            calls: 4,
            period_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FetcherSettings {
    #[serde(default = "default_rpc_retry")]
    pub rpc_retry: RetrySettings,
    #[serde(default = "default_rpc_retry")]
    pub subgraph_retry: RetrySettings,
    #[serde(default = "default_explorer_retry")]
    pub explorer_retry: RetrySettings,
    #[serde(default)]
    pub explorer_rate_limit: RateLimitSettings,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            rpc_retry: default_rpc_retry(),
            subgraph_retry: default_rpc_retry(),
            explorer_retry: default_explorer_retry(),
            explorer_rate_limit: RateLimitSettings::default(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DiscoverySettings {
    /// Extra traversal depth beyond the first hop. 0 means direct pairs to a pegged asset only.
    #[serde(default)]
    pub max_hops: usize,
    #[serde(default = "default_pairs_per_side")]
    pub pairs_per_side: u32,
    /// `latest` is resolved to head minus this many blocks, so subgraphs have indexed it.
    #[serde(default = "default_latest_block_offset")]
    pub latest_block_offset: u64,
}

fn default_pairs_per_side() -> u32 {
    10
}

fn default_latest_block_offset() -> u64 {
    50
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_hops: 0,
            pairs_per_side: default_pairs_per_side(),
            latest_block_offset: default_latest_block_offset(),
        }
    }
}

/// Per-network URL overrides, keyed by network id in `[networks.<id>]`.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct NetworkOverride {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub networks: HashMap<String, NetworkOverride>,
}

/// Env var overriding the RPC endpoint of each network.
const RPC_ENV_OVERRIDES: [(&str, &str); 4] = [
    ("eth", "ETH_RPC"),
    ("bsc", "BSC_RPC"),
    ("polygon", "POLYGON_RPC"),
    ("mumbai", "MUMBAI_RPC"),
];

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then applies env overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;
        Self::finish(s)
    }

    /// Loads settings from an explicit file, which must exist.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .build()?;
        Self::finish(s)
    }

    fn finish(s: Config) -> Result<Self, ConfigError> {
        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (network, var) in RPC_ENV_OVERRIDES {
            if let Ok(url) = env::var(var) {
                let trimmed = url.trim();
                if !trimmed.is_empty() {
                    self.networks.entry(network.to_string()).or_default().rpc_url = Some(trimmed.to_string());
                }
            }
        }

        if let Ok(raw) = env::var("RESOLVER_MAX_HOPS") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                self.discovery.max_hops = trimmed
                    .parse()
                    .map_err(|e| ConfigError::Message(format!("RESOLVER_MAX_HOPS must be an integer: {}", e)))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fetcher.rpc_retry.validate("rpc_retry")?;
        self.fetcher.subgraph_retry.validate("subgraph_retry")?;
        self.fetcher.explorer_retry.validate("explorer_retry")?;
        if self.fetcher.explorer_rate_limit.calls == 0 || self.fetcher.explorer_rate_limit.period_ms == 0 {
            return Err(ConfigError::Message(
                "fetcher.explorer_rate_limit needs non-zero calls and period_ms".to_string(),
            ));
        }
        if self.discovery.pairs_per_side == 0 {
            return Err(ConfigError::Message("discovery.pairs_per_side must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_deployment() {
        let s = Settings::default();
        assert_eq!(s.fetcher.rpc_retry.attempts, 10);
        assert_eq!(s.fetcher.rpc_retry.delay_ms, 500);
        assert_eq!(s.fetcher.subgraph_retry, s.fetcher.rpc_retry);
        assert_eq!(s.fetcher.explorer_retry.attempts, 3);
        assert_eq!(s.fetcher.explorer_retry.backoff, 2.0);
        assert_eq!(s.fetcher.explorer_rate_limit.calls, 4);
        assert_eq!(s.fetcher.explorer_rate_limit.period_ms, 2_000);
        assert_eq!(s.discovery.max_hops, 0);
        assert_eq!(s.discovery.pairs_per_side, 10);
        assert_eq!(s.discovery.latest_block_offset, 50);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[fetcher]
http_timeout_ms = 5000

[fetcher.explorer_retry]
attempts = 5
delay_ms = 100
backoff = 1.5

[discovery]
pairs_per_side = 25

[networks.bsc]
explorer_url = "https://testnet.bscscan.com"
"#
        )
        .unwrap();

        let s = Settings::from_file(file.path()).unwrap();
        assert_eq!(s.fetcher.http_timeout_ms, 5000);
        assert_eq!(s.fetcher.explorer_retry.attempts, 5);
        assert_eq!(s.fetcher.rpc_retry.attempts, 10);
        assert_eq!(s.discovery.pairs_per_side, 25);
        assert_eq!(s.discovery.latest_block_offset, 50);
        assert_eq!(
            s.networks["bsc"].explorer_url.as_deref(),
            Some("https://testnet.bscscan.com")
        );
    }

    #[test]
    fn test_invalid_retry_budget_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[fetcher.rpc_retry]
attempts = 0
delay_ms = 100
backoff = 1.0
"#
        )
        .unwrap();

        assert!(Settings::from_file(file.path()).is_err());
    }
}
