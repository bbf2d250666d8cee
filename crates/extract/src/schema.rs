use serde::{Deserialize, Serialize};

/// The unit of extraction: a chunk id and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub text: String,
}

impl TextUnit {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

impl From<&ingest::ChunkRecord> for TextUnit {
    fn from(record: &ingest::ChunkRecord) -> Self {
        Self::new(record.id.clone(), record.text.clone())
    }
}

/// A single entity record parsed from one chunk's model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub title: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    pub source_id: String,
}

/// A single relationship record parsed from one chunk's model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source: String,
    pub target: String,
    pub description: String,
    pub weight: f64,
    pub source_id: String,
}

/// Entity merged across chunks, unique by `(title, type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub title: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub descriptions: Vec<String>,
    pub chunk_ids: Vec<String>,
    pub frequency: usize,
}

/// Relationship merged across chunks, unique by `(source, target)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub descriptions: Vec<String>,
    pub chunk_ids: Vec<String>,
    pub weight: f64,
}

/// Raw model output for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkExtraction {
    pub chunk_id: String,
    pub raw: String,
    /// Set when every attempt failed and `raw` is the empty placeholder.
    pub degraded: bool,
}
