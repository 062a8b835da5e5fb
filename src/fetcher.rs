// src/fetcher.rs
//
// Every external call (explorer page, subgraph query, JSON-RPC) goes through the
// ResilientFetcher: memo lookup, then retry with exponential backoff, with the
// explorer attempts throttled by a process-wide limiter.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::Retry;
use tracing::{debug, error, warn};

use crate::cache::FetchCache;
use crate::errors::{ResolverError, Result};
use crate::metrics;
use crate::networks::Network;
use crate::settings::{FetcherSettings, RateLimitSettings, RetrySettings};
use crate::transport::TransportError;
use crate::types::BlockTag;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Explorer,
    Subgraph,
    Rpc,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Explorer => "explorer",
            CallKind::Subgraph => "subgraph",
            CallKind::Rpc => "rpc",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an external call, used as the memoization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    pub kind: CallKind,
    pub network: Network,
    /// Operation name, e.g. `eth_call`, `pairs`, `token_page`.
    pub method: &'static str,
    /// Address or token the call is about.
    pub target: String,
    pub block: Option<BlockTag>,
    /// Remaining arguments (calldata, AMM source name, ...).
    pub extra: Vec<String>,
}

impl CallSignature {
    pub fn new(kind: CallKind, network: Network, method: &'static str, target: impl Into<String>) -> Self {
        Self {
            kind,
            network,
            method,
            target: target.into(),
            block: None,
            extra: Vec::new(),
        }
    }

    pub fn at_block(mut self, block: BlockTag) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra.push(arg.into());
        self
    }
}

/// `attempts` tries in total; the wait before retry `i` is `delay * backoff^i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let delay = self.delay;
        let backoff = self.backoff;
        (0..self.attempts.saturating_sub(1)).map(move |i| delay.mul_f64(backoff.powi(i as i32)))
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            attempts: s.attempts.max(1),
            delay: Duration::from_millis(s.delay_ms),
            backoff: s.backoff,
        }
    }
}

/// Retrying, memoizing, rate-limited executor for external calls.
pub struct ResilientFetcher {
    cache: Arc<FetchCache>,
    rpc_policy: RetryPolicy,
    subgraph_policy: RetryPolicy,
    explorer_policy: RetryPolicy,
    explorer_limiter: Arc<DefaultDirectRateLimiter>,
}

impl ResilientFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self> {
        Self::with_cache(settings, Arc::new(FetchCache::new()))
    }

    pub fn with_cache(settings: &FetcherSettings, cache: Arc<FetchCache>) -> Result<Self> {
        Ok(Self {
            cache,
            rpc_policy: RetryPolicy::from(&settings.rpc_retry),
            subgraph_policy: RetryPolicy::from(&settings.subgraph_retry),
            explorer_policy: RetryPolicy::from(&settings.explorer_retry),
            explorer_limiter: Arc::new(RateLimiter::direct(explorer_quota(&settings.explorer_rate_limit)?)),
        })
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    pub fn policy(&self, kind: CallKind) -> RetryPolicy {
        match kind {
            CallKind::Rpc => self.rpc_policy,
            CallKind::Subgraph => self.subgraph_policy,
            CallKind::Explorer => self.explorer_policy,
        }
    }

    /// Memoized fetch: returns the cached value for `signature`, otherwise runs `call`
    /// under the retry policy of its kind and caches the first success.
    pub async fn fetch<F, Fut>(&self, signature: CallSignature, call: F) -> Result<Value>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Value, TransportError>> + Send,
    {
        if let Some(hit) = self.cache.get(&signature) {
            debug!(kind = %signature.kind, method = signature.method, target = %signature.target, "cache hit");
            return Ok(hit);
        }
        let value = self.execute(&signature, call).await?;
        self.cache.insert(signature, value.clone());
        Ok(value)
    }

    /// Same retry and throttling as [`fetch`](Self::fetch), never memoized.
    pub async fn fetch_fresh<F, Fut>(&self, signature: CallSignature, call: F) -> Result<Value>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Value, TransportError>> + Send,
    {
        self.execute(&signature, call).await
    }

    async fn execute<F, Fut>(&self, signature: &CallSignature, mut call: F) -> Result<Value>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Value, TransportError>> + Send,
    {
        let kind = signature.kind;
        let policy = self.policy(kind);
        let limiter = (kind == CallKind::Explorer).then(|| self.explorer_limiter.clone());
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let attempts_ref = &attempts;
        let result = Retry::spawn(policy.delays(), || {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
            let limiter = limiter.clone();
            let pending = call();
            async move {
                if let Some(limiter) = limiter {
                    if limiter.check().is_err() {
                        metrics::increment_rate_limit_wait();
                        limiter.until_ready().await;
                    }
                }
                metrics::increment_fetch_attempt(kind.as_str());
                let outcome = pending.await;
                if let Err(e) = &outcome {
                    warn!(
                        "⚠️ {} {} {} attempt {}/{} failed: {}",
                        kind, signature.method, signature.target, attempt, policy.attempts, e
                    );
                }
                outcome
            }
        })
        .await;

        metrics::record_fetch_latency(kind.as_str(), started.elapsed());

        result.map_err(|source| {
            let attempts = attempts.load(Ordering::SeqCst);
            metrics::increment_fetch_failure(kind.as_str());
            error!(
                "❌ {} {} {} gave up after {} attempts: {}",
                kind, signature.method, signature.target, attempts, source
            );
            ResolverError::FetchFailed {
                kind,
                target: signature.target.clone(),
                attempts,
                source,
            }
        })
    }
}

/// Spreads `calls` evenly over `period`, so no window of `period` sees more than `calls`
/// explorer requests.
fn explorer_quota(limit: &RateLimitSettings) -> Result<Quota> {
    let calls = NonZeroU32::new(limit.calls)
        .ok_or_else(|| ResolverError::Config("explorer rate limit calls must be non-zero".to_string()))?;
    let interval = Duration::from_millis(limit.period_ms) / calls.get();
    Quota::with_period(interval)
        .ok_or_else(|| ResolverError::Config("explorer rate limit period must be non-zero".to_string()))
}
