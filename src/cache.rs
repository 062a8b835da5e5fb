use crate::fetcher::CallSignature;
use crate::metrics;
use dashmap::DashMap;
use serde_json::Value;

/// Process-wide memo of successful external call results.
///
/// Keyed by the full call signature, so two calls that differ in any argument (including
/// the block) never share an entry. Entries are never evicted or expired: a result pinned
/// to a block number cannot change, and `latest` reads are resolved to a concrete block
/// before they reach the fetcher. Failures are never stored.
#[derive(Debug, Default)]
pub struct FetchCache {
    entries: DashMap<CallSignature, Value>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signature: &CallSignature) -> Option<Value> {
        let cache_name = signature.kind.as_str();
        match self.entries.get(signature) {
            Some(entry) => {
                metrics::increment_cache_hit(cache_name);
                Some(entry.value().clone())
            }
            None => {
                metrics::increment_cache_miss(cache_name);
                None
            }
        }
    }

    pub fn insert(&self, signature: CallSignature, value: Value) {
        self.entries.insert(signature, value);
        metrics::set_cache_size("fetch", self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
