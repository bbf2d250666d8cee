use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::TextChunk;
use crate::strategy::ChunkStrategy;

/// Sentence boundary detection.
pub trait SentenceSplitter: Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// UAX #29 sentence boundaries. Sentences are trimmed and empty ones dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeSentenceSplitter;

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// One chunk per sentence, no overlap, no token counts.
pub struct SentenceStrategy {
    splitter: Arc<dyn SentenceSplitter>,
}

impl SentenceStrategy {
    pub fn new(splitter: Arc<dyn SentenceSplitter>) -> Self {
        Self { splitter }
    }
}

impl Default for SentenceStrategy {
    fn default() -> Self {
        Self::new(Arc::new(UnicodeSentenceSplitter))
    }
}

impl ChunkStrategy for SentenceStrategy {
    fn name(&self) -> &'static str {
        "sentence"
    }

    fn chunk(&self, texts: &[&str]) -> Result<Vec<TextChunk>> {
        let chunks = texts
            .iter()
            .enumerate()
            .flat_map(|(doc_idx, text)| {
                self.splitter.split(text).into_iter().map(move |sentence| {
                    TextChunk::new(sentence.to_string(), BTreeSet::from([doc_idx]), None)
                })
            })
            .collect();
        Ok(chunks)
    }
}
