//! Sliding token windows over one or more texts.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chunk::TextChunk;
use crate::error::ChunkError;
use crate::strategy::ChunkStrategy;
use crate::tokenizer::Tokenizer;

/// Fixed-size, overlapping token windows.
///
/// All inputs are encoded independently and concatenated into one stream of
/// `(source index, token id)` pairs, so a window may span several documents.
pub struct TokenWindowStrategy {
    tokenizer: Arc<dyn Tokenizer>,
    tokens_per_chunk: usize,
    overlap: usize,
}

impl std::fmt::Debug for TokenWindowStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenWindowStrategy")
            .field("tokens_per_chunk", &self.tokens_per_chunk)
            .field("overlap", &self.overlap)
            .finish()
    }
}

impl TokenWindowStrategy {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        tokens_per_chunk: usize,
        overlap: usize,
    ) -> Result<Self, ChunkError> {
        validate_window(tokens_per_chunk, overlap)?;
        Ok(Self {
            tokenizer,
            tokens_per_chunk,
            overlap,
        })
    }

    pub fn step(&self) -> usize {
        self.tokens_per_chunk - self.overlap
    }

    /// Number of windows produced for `total_tokens` tokens:
    /// `ceil((n - overlap) / step)`, and never zero for a non-empty stream.
    pub fn expected_chunks(&self, total_tokens: usize) -> usize {
        if total_tokens == 0 {
            return 0;
        }
        total_tokens
            .saturating_sub(self.overlap)
            .div_ceil(self.step())
            .max(1)
    }
}

/// `step = size - overlap` has to be positive or the window never advances.
pub fn validate_window(tokens_per_chunk: usize, overlap: usize) -> Result<(), ChunkError> {
    if tokens_per_chunk == 0 || overlap >= tokens_per_chunk {
        return Err(ChunkError::InvalidWindow {
            size: tokens_per_chunk,
            overlap,
        });
    }
    Ok(())
}

impl ChunkStrategy for TokenWindowStrategy {
    fn name(&self) -> &'static str {
        "tokens"
    }

    fn chunk(&self, texts: &[&str]) -> Result<Vec<TextChunk>> {
        let stream: Vec<(usize, usize)> = texts
            .iter()
            .enumerate()
            .flat_map(|(source_idx, text)| {
                self.tokenizer
                    .encode(text)
                    .into_iter()
                    .map(move |id| (source_idx, id))
            })
            .collect();

        let step = self.step();
        let mut chunks = Vec::with_capacity(self.expected_chunks(stream.len()));
        let mut start = 0;

        // A window that already reaches the end of the stream is the last one,
        // otherwise the trailing `overlap` tokens would be emitted again on their own.
        while start < stream.len() && (start == 0 || start + self.overlap < stream.len()) {
            let end = (start + self.tokens_per_chunk).min(stream.len());
            let window = &stream[start..end];

            let ids: Vec<usize> = window.iter().map(|&(_, id)| id).collect();
            let text = self.tokenizer.decode(&ids)?;
            let sources: BTreeSet<usize> = window.iter().map(|&(idx, _)| idx).collect();

            chunks.push(TextChunk::new(text, sources, Some(window.len())));
            start += step;
        }

        Ok(chunks)
    }
}
