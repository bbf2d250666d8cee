use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chunk::{ChunkRecord, ChunkSource};
use crate::document::Document;
use crate::error::ChunkError;
use crate::strategy::{ChunkStrategy, ChunkStrategyType, run_strategy};
use crate::tokenizer::{Tokenizer, tokenizer_for};
use crate::window::validate_window;

const METADATA_LINE_DELIMITER: &str = ".\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Tokens per chunk.
    pub size: usize,
    /// Tokens shared by consecutive chunks.
    pub overlap: usize,
    /// Documents sharing these column values are chunked as one stream.
    pub group_by_columns: Vec<String>,
    pub strategy: ChunkStrategyType,
    pub encoding_model: String,
    /// Prefix every chunk with the group's rendered metadata.
    pub prepend_metadata: bool,
    /// Count the metadata prefix against `size`.
    pub chunk_size_includes_metadata: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 1200,
            overlap: 100,
            group_by_columns: vec!["id".to_string()],
            strategy: ChunkStrategyType::Tokens,
            encoding_model: "cl100k_base".to_string(),
            prepend_metadata: false,
            chunk_size_includes_metadata: false,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.strategy == ChunkStrategyType::Tokens {
            validate_window(self.size, self.overlap)?;
        }
        Ok(())
    }
}

struct Group {
    keys: BTreeMap<String, Value>,
    sources: Vec<ChunkSource>,
    metadata: Option<Value>,
}

/// Groups documents, runs the configured strategy per group and explodes the
/// result into one content-addressed [`ChunkRecord`] per chunk.
pub struct Chunker {
    config: ChunkingConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config, tokenizer })
    }

    /// Build with the tokenizer named by `config.encoding_model`.
    pub fn from_config(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let tokenizer = tokenizer_for(&config.encoding_model)?;
        Ok(Self::new(config, tokenizer)?)
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn chunk(&self, documents: &[Document]) -> Result<Vec<ChunkRecord>> {
        let mut sorted: Vec<&Document> = documents.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let groups = self.group(&sorted)?;

        // Resolve every group's prefix and strategy first so configuration
        // errors surface before any chunk is produced.
        let mut prepared = Vec::with_capacity(groups.len());
        for group in groups {
            let (prefix, metadata_tokens) = self.prepare_metadata(group.metadata.as_ref())?;
            let size = self.config.size - metadata_tokens;
            let strategy = self
                .config
                .strategy
                .build(self.tokenizer.clone(), size, self.config.overlap)?;
            prepared.push((group, prefix, strategy));
        }

        let group_count = prepared.len();
        let mut records = Vec::new();

        for (group, prefix, strategy) in prepared {
            let produced = self.chunk_group(&group, &prefix, strategy.as_ref())?;
            debug!(keys = ?group.keys, chunks = produced.len(), "Chunked group");
            records.extend(produced);
        }

        info!(
            documents = documents.len(),
            groups = group_count,
            chunks = records.len(),
            strategy = %self.config.strategy,
            "Chunking complete"
        );

        Ok(records)
    }

    fn chunk_group(
        &self,
        group: &Group,
        prefix: &str,
        strategy: &dyn ChunkStrategy,
    ) -> Result<Vec<ChunkRecord>> {
        let outputs = run_strategy(strategy, &group.sources)?;

        let records = outputs
            .into_iter()
            .filter(|out| !out.text.is_empty())
            .map(|out| {
                let text = if self.config.prepend_metadata {
                    format!("{}{}", prefix, out.text)
                } else {
                    out.text
                };
                ChunkRecord::new(
                    group.keys.clone(),
                    out.document_ids.unwrap_or_default(),
                    text,
                    out.token_count,
                )
            })
            .collect();

        Ok(records)
    }

    /// Groups keep first-appearance order of the sorted documents.
    fn group(&self, sorted: &[&Document]) -> Result<Vec<Group>, ChunkError> {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for doc in sorted {
            let mut keys = BTreeMap::new();
            for column in &self.config.group_by_columns {
                let value = doc.column(column).ok_or_else(|| ChunkError::UnknownColumn {
                    column: column.clone(),
                    document_id: doc.id.clone(),
                })?;
                keys.insert(column.clone(), value);
            }

            let key_values: Vec<&Value> = self
                .config
                .group_by_columns
                .iter()
                .filter_map(|c| keys.get(c))
                .collect();
            let group_key = serde_json::to_string(&key_values)
                .map_err(|e| ChunkError::InvalidMetadata(e.to_string()))?;

            let idx = *index.entry(group_key).or_insert_with(|| {
                groups.push(Group {
                    keys,
                    sources: Vec::new(),
                    metadata: None,
                });
                groups.len() - 1
            });

            let group = &mut groups[idx];
            group.sources.push(ChunkSource::Document {
                id: doc.id.clone(),
                text: doc.text.clone(),
            });
            if group.metadata.is_none() {
                group.metadata = doc.metadata.clone().filter(|m| !m.is_null());
            }
        }

        Ok(groups)
    }

    /// Render metadata as `key: value.\n` lines and count its tokens when it
    /// has to fit inside the chunk size.
    fn prepare_metadata(&self, metadata: Option<&Value>) -> Result<(String, usize), ChunkError> {
        if !self.config.prepend_metadata {
            return Ok((String::new(), 0));
        }
        let Some(metadata) = metadata else {
            return Ok((String::new(), 0));
        };

        let rendered = render_metadata(metadata)?;

        let mut metadata_tokens = 0;
        if self.config.chunk_size_includes_metadata {
            metadata_tokens = self.tokenizer.count_tokens(&rendered);
            if metadata_tokens >= self.config.size {
                return Err(ChunkError::MetadataTooLarge {
                    metadata_tokens,
                    size: self.config.size,
                });
            }
        }

        Ok((rendered, metadata_tokens))
    }
}

fn render_metadata(metadata: &Value) -> Result<String, ChunkError> {
    let parsed;
    let metadata = match metadata {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw)
                .map_err(|e| ChunkError::InvalidMetadata(e.to_string()))?;
            &parsed
        }
        other => other,
    };

    let Value::Object(map) = metadata else {
        return Ok(String::new());
    };
    if map.is_empty() {
        return Ok(String::new());
    }

    let lines: Vec<String> = map
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}: {}", k, s),
            other => format!("{}: {}", k, other),
        })
        .collect();

    Ok(lines.join(METADATA_LINE_DELIMITER) + METADATA_LINE_DELIMITER)
}
