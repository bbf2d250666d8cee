use anyhow::Result;
use futures::stream::{self, StreamExt};
use ingest::content_hash;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::config::{ExtractionConfig, ExtractionMode};
use crate::llm::{ChatMessage, ChatModel, YesNo};
use crate::metrics::ExtractionMetrics;
use crate::prompt::{CONTINUE_PROMPT, LOOP_PROMPT, batch_separator, build_extraction_prompt};
use crate::retry::RetryPolicy;
use crate::schema::{ChunkExtraction, TextUnit};

/// Runs model calls for chunks: cache lookup, gleaning, retries, and
/// degradation to an empty result.
pub struct ExtractionEngine {
    model: Arc<dyn ChatModel>,
    cache: Arc<dyn CacheStore>,
    config: ExtractionConfig,
    retry: RetryPolicy,
    metrics: Arc<ExtractionMetrics>,
}

impl ExtractionEngine {
    pub fn new(
        model: Arc<dyn ChatModel>,
        cache: Arc<dyn CacheStore>,
        config: ExtractionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config.retry);

        Ok(Self {
            model,
            cache,
            config,
            retry,
            metrics: Arc::new(ExtractionMetrics::new()),
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ExtractionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Extract every unit using the configured mode. Output order follows
    /// input order.
    pub async fn extract(&self, units: &[TextUnit]) -> Vec<ChunkExtraction> {
        info!(
            chunks = units.len(),
            mode = ?self.config.mode,
            max_gleanings = self.config.max_gleanings,
            "Starting extraction"
        );

        let extractions = match self.config.mode {
            ExtractionMode::Single => self.extract_all(units).await,
            ExtractionMode::Batch => self.extract_batched(units).await,
        };

        let degraded = extractions.iter().filter(|e| e.degraded).count();
        info!(chunks = extractions.len(), degraded, "Extraction finished");
        extractions
    }

    /// Single-chunk protocol over all units, `concurrency` at a time.
    pub async fn extract_all(&self, units: &[TextUnit]) -> Vec<ChunkExtraction> {
        stream::iter(units)
            .map(|unit| self.extract_chunk(unit))
            .buffered(self.config.concurrency)
            .collect()
            .await
    }

    /// Never fails: after the last retry the chunk degrades to an empty
    /// result.
    pub async fn extract_chunk(&self, unit: &TextUnit) -> ChunkExtraction {
        self.extract_unit(unit, true).await
    }

    async fn extract_unit(&self, unit: &TextUnit, check_cache: bool) -> ChunkExtraction {
        let result = self
            .retry
            .retry(
                "extract_chunk",
                || self.cached_extract(&unit.text, check_cache),
                || self.metrics.record_retry(),
            )
            .await;

        match result {
            Ok(raw) => ChunkExtraction {
                chunk_id: unit.id.clone(),
                raw,
                degraded: false,
            },
            Err(e) => {
                error!(chunk_id = %unit.id, error = %e, "Chunk extraction degraded to empty result");
                self.metrics.record_degraded();
                ChunkExtraction {
                    chunk_id: unit.id.clone(),
                    raw: String::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Cached gleaning loop for one text.
    pub async fn extract_text(&self, text: &str) -> Result<String> {
        self.cached_extract(text, true).await
    }

    async fn cached_extract(&self, text: &str, check_cache: bool) -> Result<String> {
        let key = content_hash(text);
        if check_cache {
            if let Some(cached) = self.cache_get(&key).await {
                return Ok(cached);
            }
        }

        let raw = self.glean(text).await?;
        self.cache_put(&key, &raw).await;
        Ok(raw)
    }

    async fn glean(&self, text: &str) -> Result<String> {
        let prompt = build_extraction_prompt(
            self.config.template(),
            &self.config.entity_types,
            &self.config.delimiters,
            text,
        );

        let response = self.model.chat(&prompt, &[]).await?;
        self.metrics.record_model_call(response.usage);
        let mut results = response.text;
        let mut history = response.history;

        let max_gleanings = self.config.max_gleanings;
        for round in 0..max_gleanings {
            let response = self.model.chat(CONTINUE_PROMPT, &history).await?;
            self.metrics.record_model_call(response.usage);
            results.push_str(&response.text);
            history = response.history;

            if round + 1 >= max_gleanings {
                break;
            }

            let answer = self.model.classify_yes_no(LOOP_PROMPT, &history).await?;
            self.metrics.record_classify_call();
            debug!(round, ?answer, "Gleaning continuation check");
            if answer != YesNo::Yes {
                break;
            }

            history.push(ChatMessage::user(LOOP_PROMPT));
            history.push(ChatMessage::assistant("Y"));
        }

        Ok(results)
    }

    /// Chunks per batched prompt, shrinking as chunks get longer.
    pub fn dynamic_batch_size(&self, units: &[TextUnit]) -> usize {
        if units.is_empty() {
            return 1;
        }
        let total: usize = units.iter().map(|u| u.text.chars().count()).sum();
        let avg = total as f64 / units.len() as f64;
        let fits = (self.config.batch_char_budget as f64 / (avg + 1.0)) as usize;
        fits.min(self.config.max_batch_size).max(1)
    }

    pub async fn extract_batched(&self, units: &[TextUnit]) -> Vec<ChunkExtraction> {
        let batch_size = self.dynamic_batch_size(units);
        debug!(batch_size, "Using dynamic batch size");

        let batches: Vec<Vec<ChunkExtraction>> = stream::iter(units.chunks(batch_size))
            .map(|batch| self.process_batch(batch))
            .buffered(self.config.concurrency)
            .collect()
            .await;

        batches.into_iter().flatten().collect()
    }

    async fn process_batch(&self, batch: &[TextUnit]) -> Vec<ChunkExtraction> {
        let keys: Vec<String> = batch.iter().map(|u| content_hash(&u.text)).collect();
        let mut cached = Vec::with_capacity(batch.len());
        for key in &keys {
            cached.push(self.cache_get(key).await);
        }

        let pending: Vec<usize> = (0..batch.len()).filter(|&i| cached[i].is_none()).collect();
        if pending.is_empty() {
            return finish(batch, cached);
        }

        let separator = batch_separator();
        let joined = pending
            .iter()
            .map(|&i| batch[i].text.as_str())
            .collect::<Vec<_>>()
            .join(&separator);
        let prompt = build_extraction_prompt(
            self.config.template(),
            &self.config.entity_types,
            &self.config.delimiters,
            &joined,
        );

        let segments = match self.model.chat(&prompt, &[]).await {
            Ok(response) => {
                self.metrics.record_model_call(response.usage);
                response
                    .text
                    .split(separator.as_str())
                    .map(|part| part.trim().to_string())
                    .collect::<Vec<_>>()
            }
            Err(e) => {
                warn!(batch = batch.len(), error = %e, "Batch call failed, processing chunks individually");
                self.metrics.record_batch_fallback();
                return self.fallback(batch, cached, &pending).await;
            }
        };

        if segments.len() != pending.len() {
            warn!(
                expected = pending.len(),
                actual = segments.len(),
                "Batch segment count mismatch, processing chunks individually"
            );
            self.metrics.record_batch_fallback();
            return self.fallback(batch, cached, &pending).await;
        }

        for (&i, segment) in pending.iter().zip(segments) {
            self.cache_put(&keys[i], &segment).await;
            cached[i] = Some(segment);
        }

        finish(batch, cached)
    }

    async fn fallback(
        &self,
        batch: &[TextUnit],
        mut cached: Vec<Option<String>>,
        pending: &[usize],
    ) -> Vec<ChunkExtraction> {
        let mut degraded = vec![false; batch.len()];
        // `pending` members were already looked up and counted as misses.
        for &i in pending {
            let extraction = self.extract_unit(&batch[i], false).await;
            degraded[i] = extraction.degraded;
            cached[i] = Some(extraction.raw);
        }

        let mut results = finish(batch, cached);
        for (result, degraded) in results.iter_mut().zip(degraded) {
            result.degraded = degraded;
        }
        results
    }

    async fn cache_get(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(Some(value)) => {
                self.metrics.record_cache_hit();
                Some(value)
            }
            Ok(None) => {
                self.metrics.record_cache_miss();
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                self.metrics.record_cache_error();
                self.metrics.record_cache_miss();
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, value: &str) {
        if let Err(e) = self.cache.put(key, value).await {
            warn!(key, error = %e, "Cache write failed, skipping");
            self.metrics.record_cache_error();
        }
    }
}

fn finish(batch: &[TextUnit], results: Vec<Option<String>>) -> Vec<ChunkExtraction> {
    batch
        .iter()
        .zip(results)
        .map(|(unit, raw)| ChunkExtraction {
            chunk_id: unit.id.clone(),
            raw: raw.unwrap_or_default(),
            degraded: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoopCache};
    use crate::retry::RetryConfig;
    use crate::testing::{BrokenCache, ScriptedModel};
    use pretty_assertions::assert_eq;

    fn config(mode: ExtractionMode, max_gleanings: usize) -> ExtractionConfig {
        ExtractionConfig {
            mode,
            max_gleanings,
            retry: RetryConfig {
                max_retries: 3,
                delay_ms: 0,
            },
            ..ExtractionConfig::default()
        }
    }

    fn engine(model: Arc<ScriptedModel>, cache: Arc<dyn CacheStore>, config: ExtractionConfig) -> ExtractionEngine {
        ExtractionEngine::new(model, cache, config).unwrap()
    }

    fn units(texts: &[&str]) -> Vec<TextUnit> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextUnit::new(format!("c{i}"), *t))
            .collect()
    }

    #[tokio::test]
    async fn test_second_request_hits_cache() {
        let model = Arc::new(ScriptedModel::constant("(\"entity\"<|>A<|>T<|>d)"));
        let engine = engine(model.clone(), Arc::new(MemoryCache::new(100)), config(ExtractionMode::Single, 0));

        let first = engine.extract_text("same text").await.unwrap();
        let second = engine.extract_text("same text").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(model.chat_calls(), 1);
        assert_eq!(engine.metrics().cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_gleaning_stops_on_no() {
        let model = Arc::new(
            ScriptedModel::new(|prompt, _| {
                Ok(if prompt == CONTINUE_PROMPT { "[more]".into() } else { "[first]".into() })
            })
            .with_answers([YesNo::Yes, YesNo::No]),
        );
        let engine = engine(model.clone(), Arc::new(NoopCache), config(ExtractionMode::Single, 5));

        let raw = engine.extract_text("text").await.unwrap();

        // initial, continue, (Y), continue, (N)
        assert_eq!(raw, "[first][more][more]");
        assert_eq!(model.chat_calls(), 3);
        assert_eq!(model.classify_calls(), 2);
        assert_eq!(model.history_lengths(), vec![0, 2, 6]);
    }

    #[tokio::test]
    async fn test_last_round_skips_continuation_check() {
        let model = Arc::new(ScriptedModel::constant("x").with_answers([YesNo::Yes; 4]));
        let engine = engine(model.clone(), Arc::new(NoopCache), config(ExtractionMode::Single, 2));

        let raw = engine.extract_text("text").await.unwrap();

        assert_eq!(raw, "xxx");
        assert_eq!(model.chat_calls(), 3);
        assert_eq!(model.classify_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_degrades_without_affecting_others() {
        let model = Arc::new(ScriptedModel::new(|prompt, _| {
            if prompt.contains("poison") {
                anyhow::bail!("model timed out")
            }
            Ok("ok".into())
        }));
        let engine = engine(model.clone(), Arc::new(MemoryCache::new(100)), config(ExtractionMode::Single, 0));

        let results = engine.extract(&units(&["fine", "poison", "also fine"])).await;

        assert_eq!(results[0].raw, "ok");
        assert_eq!(results[1], ChunkExtraction { chunk_id: "c1".into(), raw: String::new(), degraded: true });
        assert_eq!(results[2].raw, "ok");
        // 1 + 3 retries for the poisoned chunk
        assert_eq!(model.chat_calls(), 6);
        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.retries, 3);
        assert_eq!(snapshot.degraded_chunks, 1);
    }

    #[tokio::test]
    async fn test_broken_cache_is_not_fatal() {
        let model = Arc::new(ScriptedModel::constant("ok"));
        let engine = engine(model.clone(), Arc::new(BrokenCache), config(ExtractionMode::Single, 0));

        let results = engine.extract(&units(&["a", "b"])).await;

        assert!(results.iter().all(|r| r.raw == "ok" && !r.degraded));
        assert_eq!(engine.metrics().snapshot().cache_errors, 4);
    }

    #[test]
    fn test_dynamic_batch_size() {
        let model = Arc::new(ScriptedModel::constant(""));
        let engine = engine(model, Arc::new(NoopCache), config(ExtractionMode::Batch, 0));

        assert_eq!(engine.dynamic_batch_size(&units(&["short", "texts"])), 5);
        let long = "x".repeat(4_000);
        assert_eq!(engine.dynamic_batch_size(&units(&[&long, &long])), 2);
        let huge = "x".repeat(20_000);
        assert_eq!(engine.dynamic_batch_size(&units(&[&huge])), 1);
    }

    #[tokio::test]
    async fn test_batch_splits_response_and_caches_segments() {
        let separator = batch_separator();
        let sep = separator.clone();
        let model = Arc::new(ScriptedModel::new(move |_, _| Ok(format!(" one {sep}two {sep} three"))));
        let cache = Arc::new(MemoryCache::new(100));
        let engine = engine(model.clone(), cache.clone(), config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b", "c"])).await;

        let raws: Vec<&str> = results.iter().map(|r| r.raw.as_str()).collect();
        assert_eq!(raws, vec!["one", "two", "three"]);
        assert_eq!(model.chat_calls(), 1);
        assert!(model.prompts()[0].contains(&format!("a{separator}b{separator}c")));
        assert_eq!(cache.get(&content_hash("b")).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_fully_cached_batch_skips_model() {
        let model = Arc::new(ScriptedModel::constant("fresh"));
        let cache = Arc::new(MemoryCache::new(100));
        cache.put(&content_hash("a"), "cached a").await.unwrap();
        cache.put(&content_hash("b"), "cached b").await.unwrap();
        let engine = engine(model.clone(), cache, config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b"])).await;

        assert_eq!(results[0].raw, "cached a");
        assert_eq!(results[1].raw, "cached b");
        assert_eq!(model.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_sends_only_uncached_members() {
        let model = Arc::new(ScriptedModel::constant("fresh"));
        let cache = Arc::new(MemoryCache::new(100));
        cache.put(&content_hash("a"), "cached a").await.unwrap();
        let engine = engine(model.clone(), cache, config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b"])).await;

        assert_eq!(results[0].raw, "cached a");
        assert_eq!(results[1].raw, "fresh");
        assert_eq!(model.chat_calls(), 1);
        assert!(!model.prompts()[0].contains(&batch_separator()));
    }

    #[tokio::test]
    async fn test_batch_mismatch_falls_back_to_single() {
        let model = Arc::new(ScriptedModel::new(|prompt, _| {
            Ok(if prompt.contains(&batch_separator()) { "only one segment".into() } else { "single".into() })
        }));
        let engine = engine(model.clone(), Arc::new(MemoryCache::new(100)), config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b", "c"])).await;

        assert!(results.iter().all(|r| r.raw == "single"));
        assert_eq!(model.chat_calls(), 4);
        assert_eq!(engine.metrics().snapshot().batch_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_batch_fallback_counts_each_miss_once() {
        let model = Arc::new(ScriptedModel::new(|prompt, _| {
            Ok(if prompt.contains(&batch_separator()) { "no separators".into() } else { "single".into() })
        }));
        let cache = Arc::new(MemoryCache::new(100));
        cache.put(&content_hash("a"), "cached a").await.unwrap();
        let engine = engine(model.clone(), cache.clone(), config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b", "c"])).await;

        let raws: Vec<&str> = results.iter().map(|r| r.raw.as_str()).collect();
        assert_eq!(raws, vec!["cached a", "single", "single"]);
        let snapshot = engine.metrics().snapshot();
        assert_eq!((snapshot.cache_hits, snapshot.cache_misses), (1, 2));
        assert_eq!(snapshot.batch_fallbacks, 1);
        assert_eq!(cache.get(&content_hash("c")).await.unwrap().as_deref(), Some("single"));
    }

    #[tokio::test]
    async fn test_batch_error_degrades_per_chunk() {
        let model = Arc::new(ScriptedModel::failing());
        let engine = engine(model.clone(), Arc::new(NoopCache), config(ExtractionMode::Batch, 0));

        let results = engine.extract(&units(&["a", "b"])).await;

        assert!(results.iter().all(|r| r.raw.is_empty() && r.degraded));
        // 1 batch call + 4 attempts per chunk
        assert_eq!(model.chat_calls(), 9);
    }
}
