use anyhow::{Context, Result};
use std::sync::Arc;

use crate::error::ChunkError;

/// Reversible text <-> token id mapping used by the token window strategy.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<usize>;

    /// Decode ids previously produced by `encode`. Any contiguous run of
    /// those ids must decode, even one that cuts through a character.
    fn decode(&self, tokens: &[usize]) -> Result<String>;

    fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// BPE tokenizer backed by tiktoken.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl TiktokenTokenizer {
    /// Accepts an encoding name (`cl100k_base`, `p50k_base`, ...) or a model name
    /// such as `gpt-4`.
    pub fn for_encoding(name: &str) -> Result<Self> {
        let bpe = match name {
            "cl100k_base" => tiktoken_rs::cl100k_base()?,
            "p50k_base" => tiktoken_rs::p50k_base()?,
            "p50k_edit" => tiktoken_rs::p50k_edit()?,
            "r50k_base" => tiktoken_rs::r50k_base()?,
            model => tiktoken_rs::get_bpe_from_model(model)
                .map_err(|_| ChunkError::UnknownEncoding(model.to_string()))?,
        };
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        self.bpe.encode_ordinary(text)
    }

    // Window edges can split a multi-byte character across tokens; the
    // partial bytes become U+FFFD.
    fn decode(&self, tokens: &[usize]) -> Result<String> {
        let bytes = self.bpe._decode_native(tokens);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// One token per Unicode scalar value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        text.chars().map(|c| c as usize).collect()
    }

    fn decode(&self, tokens: &[usize]) -> Result<String> {
        tokens
            .iter()
            .map(|&t| {
                u32::try_from(t)
                    .ok()
                    .and_then(char::from_u32)
                    .with_context(|| format!("Invalid character token: {}", t))
            })
            .collect()
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Resolve the configured `encoding_model` to a tokenizer.
///
/// `characters` selects [`CharTokenizer`]; anything else goes through tiktoken.
pub fn tokenizer_for(encoding_model: &str) -> Result<Arc<dyn Tokenizer>> {
    match encoding_model {
        "characters" | "chars" => Ok(Arc::new(CharTokenizer)),
        name => Ok(Arc::new(TiktokenTokenizer::for_encoding(name)?)),
    }
}
