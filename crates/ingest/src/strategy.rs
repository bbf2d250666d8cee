use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::chunk::{ChunkOutput, ChunkSource, TextChunk};
use crate::error::ChunkError;
use crate::sentence::SentenceStrategy;
use crate::tokenizer::Tokenizer;
use crate::window::TokenWindowStrategy;

/// Splits a list of texts into chunks, recording which inputs fed each chunk.
pub trait ChunkStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn chunk(&self, texts: &[&str]) -> Result<Vec<TextChunk>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategyType {
    #[default]
    Tokens,
    Sentence,
}

impl fmt::Display for ChunkStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkStrategyType::Tokens => write!(f, "tokens"),
            ChunkStrategyType::Sentence => write!(f, "sentence"),
        }
    }
}

impl FromStr for ChunkStrategyType {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tokens" => Ok(ChunkStrategyType::Tokens),
            "sentence" => Ok(ChunkStrategyType::Sentence),
            other => Err(ChunkError::UnknownStrategy(other.to_string())),
        }
    }
}

impl ChunkStrategyType {
    /// Construct the strategy for this type. `size`/`overlap` only matter for `Tokens`.
    pub fn build(
        self,
        tokenizer: Arc<dyn Tokenizer>,
        size: usize,
        overlap: usize,
    ) -> Result<Box<dyn ChunkStrategy>, ChunkError> {
        Ok(match self {
            ChunkStrategyType::Tokens => {
                Box::new(TokenWindowStrategy::new(tokenizer, size, overlap)?)
            }
            ChunkStrategyType::Sentence => Box::new(SentenceStrategy::default()),
        })
    }
}

/// Run `strategy` over `input` and map each chunk back to its sources.
///
/// Whether a chunk carries document ids is decided by the first source it
/// covers, so mixing bare texts and documents in one call is allowed.
pub fn run_strategy(strategy: &dyn ChunkStrategy, input: &[ChunkSource]) -> Result<Vec<ChunkOutput>> {
    let texts: Vec<&str> = input.iter().map(ChunkSource::text).collect();
    let chunks = strategy.chunk(&texts)?;

    let outputs = chunks
        .into_iter()
        .map(|chunk| {
            let first = chunk
                .source_doc_indices
                .first()
                .and_then(|&idx| input.get(idx));

            match first {
                Some(ChunkSource::Document { .. }) => {
                    let mut document_ids: Vec<String> = Vec::new();
                    for id in chunk
                        .source_doc_indices
                        .iter()
                        .filter_map(|&idx| input.get(idx).and_then(ChunkSource::document_id))
                    {
                        if !document_ids.iter().any(|seen| seen == id) {
                            document_ids.push(id.to_string());
                        }
                    }
                    ChunkOutput {
                        text: chunk.text,
                        document_ids: Some(document_ids),
                        token_count: chunk.token_count,
                    }
                }
                _ => ChunkOutput {
                    text: chunk.text,
                    document_ids: None,
                    token_count: None,
                },
            }
        })
        .collect();

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::CharTokenizer;

    fn doc(id: &str, text: &str) -> ChunkSource {
        ChunkSource::Document {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_parse_strategy_names() {
        assert_eq!("tokens".parse::<ChunkStrategyType>().unwrap(), ChunkStrategyType::Tokens);
        assert_eq!(" Sentence ".parse::<ChunkStrategyType>().unwrap(), ChunkStrategyType::Sentence);
        assert_eq!(
            "paragraph".parse::<ChunkStrategyType>().unwrap_err(),
            ChunkError::UnknownStrategy("paragraph".to_string())
        );
    }

    #[test]
    fn test_bare_text_yields_text_only() {
        let strategy = ChunkStrategyType::Tokens.build(Arc::new(CharTokenizer), 4, 1).unwrap();
        let out = run_strategy(strategy.as_ref(), &[ChunkSource::Text("ABCDEFGH".into())]).unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[1].text, "DEFG");
        assert!(out.iter().all(|c| c.document_ids.is_none() && c.token_count.is_none()));
    }

    #[test]
    fn test_documents_carry_ids_and_token_counts() {
        let strategy = ChunkStrategyType::Tokens.build(Arc::new(CharTokenizer), 4, 0).unwrap();
        let out = run_strategy(
            strategy.as_ref(),
            &[doc("a", "AB"), doc("a", "CD"), doc("b", "EF"), doc("c", "GH")],
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].document_ids, Some(vec!["a".to_string()]));
        assert_eq!(out[0].token_count, Some(4));
        assert_eq!(out[1].text, "EFGH");
        assert_eq!(out[1].document_ids, Some(vec!["b".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_invalid_window_rejected_at_build() {
        let err = ChunkStrategyType::Tokens
            .build(Arc::new(CharTokenizer), 10, 12)
            .err()
            .unwrap();
        assert_eq!(err, ChunkError::InvalidWindow { size: 10, overlap: 12 });
        assert!(ChunkStrategyType::Sentence.build(Arc::new(CharTokenizer), 10, 12).is_ok());
    }
}
