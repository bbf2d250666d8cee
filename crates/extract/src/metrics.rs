use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::CacheStats;
use crate::llm::Usage;

/// Counters shared by every extraction task of one run.
#[derive(Debug, Default)]
pub struct ExtractionMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    model_calls: AtomicU64,
    retries: AtomicU64,
    degraded_chunks: AtomicU64,
    batch_fallbacks: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl ExtractionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_call(&self, usage: Usage) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    /// Yes/no calls carry no usage.
    pub fn record_classify_call(&self) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_fallback(&self) {
        self.batch_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.cache_hits.load(Ordering::Relaxed),
            misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache = self.cache_stats();
        MetricsSnapshot {
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_hit_ratio: cache.hit_ratio(),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            model_calls: self.model_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            degraded_chunks: self.degraded_chunks.load(Ordering::Relaxed),
            batch_fallbacks: self.batch_fallbacks.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub cache_errors: u64,
    pub model_calls: u64,
    pub retries: u64,
    pub degraded_chunks: u64,
    pub batch_fallbacks: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}
