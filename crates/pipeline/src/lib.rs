pub mod config;
pub mod logging;
pub mod output;

pub use config::{AppConfig, CacheKind};

use anyhow::{Context, Result};
use extract::{
    CacheStore, FileCache, GraphExtractor, MemoryCache, MetricsSnapshot, ModelRegistry, NoopCache,
    OllamaClient, TextUnit,
};
use ingest::{Chunker, FileReader, finalize_documents};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::output::write_json;

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub documents: usize,
    pub text_units: usize,
    pub entities: usize,
    pub relationships: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Seconds per stage.
    pub stages: BTreeMap<String, f64>,
    pub total_seconds: f64,
    pub extraction: MetricsSnapshot,
}

/// Registry holding the configured Ollama model under `llm.model_id`.
pub fn default_registry(config: &AppConfig) -> Result<ModelRegistry> {
    let client = OllamaClient::with_timeout(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )?;

    let mut registry = ModelRegistry::new();
    registry.register(config.llm.model_id.clone(), Arc::new(client));
    Ok(registry)
}

pub async fn build_cache(config: &AppConfig) -> Result<Arc<dyn CacheStore>> {
    Ok(match config.cache.kind {
        CacheKind::File => Arc::new(FileCache::new(&config.cache.dir).await?),
        CacheKind::Memory => Arc::new(MemoryCache::new(config.cache.max_entries)),
        CacheKind::None => Arc::new(NoopCache),
    })
}

/// Read, chunk, extract, and write every output table.
pub async fn run(config: &AppConfig, registry: &ModelRegistry) -> Result<RunStats> {
    config.validate()?;
    let run_start = Instant::now();
    let mut stages = BTreeMap::new();
    let out = &config.output.dir;

    let stage = Instant::now();
    let documents = FileReader::read_directory(&config.input.dir)
        .await
        .context(format!("Failed to load documents from {:?}", config.input.dir))?;
    stages.insert("load_documents".to_string(), stage.elapsed().as_secs_f64());
    info!(documents = documents.len(), "Loaded documents");

    let stage = Instant::now();
    let chunker = Chunker::from_config(config.chunks.clone())?;
    let chunks = chunker.chunk(&documents)?;
    write_json(out, "text_units.json", &chunks).await?;
    stages.insert("create_base_text_units".to_string(), stage.elapsed().as_secs_f64());

    let stage = Instant::now();
    let final_documents = finalize_documents(&documents, &chunks);
    write_json(out, "documents.json", &final_documents).await?;
    stages.insert("create_final_documents".to_string(), stage.elapsed().as_secs_f64());

    let stage = Instant::now();
    let model = registry.get(&config.llm.model_id)?;
    let cache = build_cache(config).await?;
    let extractor = GraphExtractor::new(model, cache, config.extract.clone())?;
    let units: Vec<TextUnit> = chunks.iter().map(TextUnit::from).collect();
    let result = extractor.extract_graph(&units).await?;

    write_json(out, "entities.json", &result.entities).await?;
    write_json(out, "relationships.json", &result.relationships).await?;
    write_json(out, "graph.json", &result.graph).await?;
    stages.insert("extract_graph".to_string(), stage.elapsed().as_secs_f64());

    let stats = RunStats {
        documents: documents.len(),
        text_units: chunks.len(),
        entities: result.entities.len(),
        relationships: result.relationships.len(),
        nodes: result.graph.node_count(),
        edges: result.graph.edge_count(),
        stages,
        total_seconds: run_start.elapsed().as_secs_f64(),
        extraction: result.metrics,
    };
    write_json(out, "stats.json", &stats).await?;

    info!(
        total_seconds = stats.total_seconds,
        cache_hit_ratio = stats.extraction.cache_hit_ratio,
        degraded = stats.extraction.degraded_chunks,
        "Run complete"
    );
    Ok(stats)
}
