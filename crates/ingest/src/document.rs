use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::chunk::ChunkRecord;

/// An input document. Columns other than `id`, `text` and `metadata` live in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a column by name, as used for grouping.
    pub fn column(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "text" => Some(Value::String(self.text.clone())),
            "metadata" => self.metadata.clone(),
            other => self.attributes.get(other).cloned(),
        }
    }
}

/// A document with back-references to the chunks built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDocument {
    pub id: String,
    /// 1-based position in the input order.
    pub human_readable_id: usize,
    pub text: String,
    pub text_unit_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, flatten)]
    pub attributes: BTreeMap<String, Value>,
}

/// Attach to every document the ids of the chunks that reference it, in chunk order.
/// Documents no chunk references get an empty list.
pub fn finalize_documents(documents: &[Document], chunks: &[ChunkRecord]) -> Vec<FinalDocument> {
    let mut text_units: HashMap<&str, Vec<String>> = HashMap::new();
    for chunk in chunks {
        for doc_id in &chunk.document_ids {
            text_units
                .entry(doc_id.as_str())
                .or_default()
                .push(chunk.id.clone());
        }
    }

    documents
        .iter()
        .enumerate()
        .map(|(idx, doc)| FinalDocument {
            id: doc.id.clone(),
            human_readable_id: idx + 1,
            text: doc.text.clone(),
            text_unit_ids: text_units.get(doc.id.as_str()).cloned().unwrap_or_default(),
            metadata: doc.metadata.clone(),
            attributes: doc.attributes.clone(),
        })
        .collect()
}
