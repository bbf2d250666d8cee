use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};
use std::collections::{BTreeMap, BTreeSet};

/// A window produced by a chunk strategy, before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Indices of the input texts that contributed to this window.
    pub source_doc_indices: BTreeSet<usize>,
    /// Window length in tokens. Strategies that don't tokenize leave this empty.
    pub token_count: Option<usize>,
}

impl TextChunk {
    pub fn new(text: String, source_doc_indices: BTreeSet<usize>, token_count: Option<usize>) -> Self {
        Self {
            text,
            source_doc_indices,
            token_count,
        }
    }
}

/// One element of a strategy's input: either bare text or text attributed to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkSource {
    Text(String),
    Document { id: String, text: String },
}

impl ChunkSource {
    pub fn text(&self) -> &str {
        match self {
            ChunkSource::Text(text) => text,
            ChunkSource::Document { text, .. } => text,
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        match self {
            ChunkSource::Text(_) => None,
            ChunkSource::Document { id, .. } => Some(id),
        }
    }
}

/// Strategy output mapped back onto its sources.
///
/// Chunks that start in a bare-text source carry only their text; chunks that
/// start in a document source also carry the document ids and token count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutput {
    pub text: String,
    pub document_ids: Option<Vec<String>>,
    pub token_count: Option<usize>,
}

/// A row of the chunk table ("text unit").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Content hash of `text`.
    pub id: String,
    pub group_keys: BTreeMap<String, Value>,
    pub document_ids: Vec<String>,
    pub text: String,
    pub token_count: Option<usize>,
}

impl ChunkRecord {
    pub fn new(
        group_keys: BTreeMap<String, Value>,
        document_ids: Vec<String>,
        text: String,
        token_count: Option<usize>,
    ) -> Self {
        let id = content_hash(&text);

        Self {
            id,
            group_keys,
            document_ids,
            text,
            token_count,
        }
    }
}

/// Hex SHA-512 of the text. Used both as chunk id and as extraction cache key.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
