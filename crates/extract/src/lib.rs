pub mod cache;
pub mod config;
pub mod engine;
pub mod graph;
pub mod llm;
pub mod merge;
pub mod metrics;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod retry;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStats, CacheStore, FileCache, MemoryCache, NoopCache};
pub use config::{ExtractionConfig, ExtractionMode};
pub use engine::ExtractionEngine;
pub use graph::{EntityGraph, GraphEdge, GraphNode};
pub use llm::{ChatMessage, ChatModel, ModelResponse, OllamaClient, Usage, YesNo};
pub use merge::{merge_entities, merge_relationships};
pub use metrics::{ExtractionMetrics, MetricsSnapshot};
pub use parser::{ParsedRecords, clean_str, parse_records};
pub use prompt::Delimiters;
pub use registry::ModelRegistry;
pub use retry::{RetryConfig, RetryPolicy};
pub use schema::{
    ChunkExtraction, EntityRecord, ExtractedEntity, ExtractedRelationship, RelationshipRecord,
    TextUnit,
};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub graph: EntityGraph,
    pub extractions: Vec<ChunkExtraction>,
    pub metrics: MetricsSnapshot,
}

pub struct GraphExtractor {
    engine: ExtractionEngine,
}

impl GraphExtractor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        cache: Arc<dyn CacheStore>,
        config: ExtractionConfig,
    ) -> Result<Self> {
        Ok(Self {
            engine: ExtractionEngine::new(model, cache, config)?,
        })
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Extract, parse, merge, and build the graph for a set of chunks.
    pub async fn extract_graph(&self, chunks: &[TextUnit]) -> Result<ExtractionResult> {
        let extractions = self.engine.extract(chunks).await;

        let delimiters = &self.engine.config().delimiters;
        let mut entity_records = Vec::new();
        let mut relationship_records = Vec::new();
        for extraction in &extractions {
            let parsed = parse_records(&extraction.raw, &extraction.chunk_id, delimiters);
            entity_records.extend(parsed.entities);
            relationship_records.extend(parsed.relationships);
        }

        let entities = merge_entities(&entity_records);
        let relationships = merge_relationships(&relationship_records);
        let graph = EntityGraph::build(&entities, &relationships);

        info!(
            entity_records = entity_records.len(),
            relationship_records = relationship_records.len(),
            entities = entities.len(),
            relationships = relationships.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph extraction complete"
        );

        Ok(ExtractionResult {
            entities,
            relationships,
            graph,
            extractions,
            metrics: self.engine.metrics().snapshot(),
        })
    }
}

/// One-shot extraction with the given template, entity types, and gleaning
/// bound; everything else uses defaults.
pub async fn extract_graph(
    model: Arc<dyn ChatModel>,
    cache: Arc<dyn CacheStore>,
    chunks: &[TextUnit],
    prompt_template: Option<String>,
    entity_types: Vec<String>,
    max_gleanings: usize,
) -> Result<ExtractionResult> {
    let config = ExtractionConfig {
        prompt_template,
        entity_types,
        max_gleanings,
        ..ExtractionConfig::default()
    };
    GraphExtractor::new(model, cache, config)?.extract_graph(chunks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use pretty_assertions::assert_eq;

    fn acme_model() -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::new(|prompt, _| {
            Ok(if prompt.contains("widgets plant") {
                r#"("entity"<|>acme<|>org<|>maker of widgets)##("entity"<|>springfield<|>geo<|>a town)##("relationship"<|>acme<|>springfield<|>ACME has a plant in Springfield<|>2)<|COMPLETE|>"#.to_string()
            } else if prompt.contains("defense") {
                r#"("entity"<|>ACME<|>ORG<|>a defense contractor)##("relationship"<|>acme<|>springfield<|>ACME employs Springfield<|>3)<|COMPLETE|>"#.to_string()
            } else {
                anyhow::bail!("unexpected prompt")
            })
        }))
    }

    fn chunks() -> Vec<TextUnit> {
        vec![
            TextUnit::new("A", "ACME runs a widgets plant in Springfield."),
            TextUnit::new("B", "ACME is also a defense supplier."),
            TextUnit::new("C", "This chunk makes the model fail."),
        ]
    }

    fn config() -> ExtractionConfig {
        ExtractionConfig {
            max_gleanings: 0,
            retry: RetryConfig { max_retries: 3, delay_ms: 0 },
            ..ExtractionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_extract_graph_merges_across_chunks() {
        let extractor = GraphExtractor::new(acme_model(), Arc::new(MemoryCache::new(100)), config()).unwrap();

        let result = extractor.extract_graph(&chunks()).await.unwrap();

        let acme = &result.entities[0];
        assert_eq!((acme.title.as_str(), acme.entity_type.as_str()), ("ACME", "ORG"));
        assert_eq!(acme.frequency, 2);
        assert_eq!(acme.descriptions, vec!["maker of widgets", "a defense contractor"]);
        assert_eq!(acme.chunk_ids, vec!["A", "B"]);

        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].weight, 5.0);

        assert_eq!(result.graph.node_count(), 2);
        assert_eq!(result.graph.edge("SPRINGFIELD", "ACME").unwrap().weight, 5.0);

        assert!(result.extractions[2].degraded);
        assert_eq!(result.metrics.degraded_chunks, 1);
    }

    #[tokio::test]
    async fn test_chunk_order_does_not_change_totals() {
        let cache: Arc<dyn CacheStore> = Arc::new(NoopCache);
        let forward = GraphExtractor::new(acme_model(), cache.clone(), config())
            .unwrap()
            .extract_graph(&chunks())
            .await
            .unwrap();

        let mut reversed = chunks();
        reversed.reverse();
        let backward = GraphExtractor::new(acme_model(), cache, config())
            .unwrap()
            .extract_graph(&reversed)
            .await
            .unwrap();

        let find = |r: &ExtractionResult| {
            let e = r.entities.iter().find(|e| e.title == "ACME").unwrap().clone();
            let mut descriptions = e.descriptions.clone();
            descriptions.sort();
            (e.frequency, descriptions)
        };
        assert_eq!(find(&forward), find(&backward));
        assert_eq!(forward.relationships[0].weight, backward.relationships[0].weight);
    }

    #[tokio::test]
    async fn test_rerun_uses_cache_only() {
        let model = acme_model();
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new(100));
        let all = chunks();
        let units = &all[..2];

        let first = extract_graph(model.clone(), cache.clone(), units, None, vec!["org".into(), "geo".into()], 0)
            .await
            .unwrap();
        let calls = model.chat_calls();
        let second = extract_graph(model.clone(), cache, units, None, vec!["org".into(), "geo".into()], 0)
            .await
            .unwrap();

        assert_eq!(model.chat_calls(), calls);
        assert_eq!(first.entities, second.entities);
        assert_eq!(second.metrics.cache_hits, 2);
    }
}
