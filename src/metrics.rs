// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    // Fetcher
    describe_counter!(
        "resolver_fetch_attempts_total",
        Unit::Count,
        "Total outbound call attempts, labeled by kind (explorer, subgraph, rpc)."
    );
    describe_counter!(
        "resolver_fetch_failures_total",
        Unit::Count,
        "Calls that exhausted their retry budget, labeled by kind."
    );
    describe_histogram!(
        "resolver_fetch_latency_seconds",
        Unit::Seconds,
        "Wall time of a fetch including retries, labeled by kind."
    );
    describe_counter!(
        "resolver_rate_limit_waits_total",
        Unit::Count,
        "Explorer attempts that had to wait for the rate limiter."
    );

    // Memoization
    describe_counter!("cache_hits_total", Unit::Count, "Memoized call hits, labeled by cache.");
    describe_counter!("cache_miss_total", Unit::Count, "Memoized call misses, labeled by cache.");
    describe_gauge!("cache_size_gauge", "Current number of memoized entries, labeled by cache.");

    // Pathfinding
    describe_histogram!(
        "resolver_routes_found",
        "Number of routes returned per swap path request, labeled by network."
    );
}

// --- Helper functions to update metrics ---

pub fn increment_fetch_attempt(kind: &str) {
    counter!("resolver_fetch_attempts_total", 1, "kind" => kind.to_string());
}

pub fn increment_fetch_failure(kind: &str) {
    counter!("resolver_fetch_failures_total", 1, "kind" => kind.to_string());
}

pub fn record_fetch_latency(kind: &str, duration: std::time::Duration) {
    histogram!("resolver_fetch_latency_seconds", duration.as_secs_f64(), "kind" => kind.to_string());
}

pub fn increment_rate_limit_wait() {
    counter!("resolver_rate_limit_waits_total", 1);
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("cache_size_gauge", size, "cache" => cache_name.to_string());
}

pub fn record_routes_found(network: &str, count: usize) {
    histogram!("resolver_routes_found", count as f64, "network" => network.to_string());
}
