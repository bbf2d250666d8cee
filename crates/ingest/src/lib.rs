pub mod chunk;
pub mod chunker;
pub mod document;
pub mod error;
pub mod reader;
pub mod sentence;
pub mod strategy;
pub mod tokenizer;
pub mod window;

pub use chunk::{ChunkOutput, ChunkRecord, ChunkSource, TextChunk, content_hash};
pub use chunker::{Chunker, ChunkingConfig};
pub use document::{Document, FinalDocument, finalize_documents};
pub use error::ChunkError;
pub use reader::FileReader;
pub use sentence::{SentenceSplitter, SentenceStrategy, UnicodeSentenceSplitter};
pub use strategy::{ChunkStrategy, ChunkStrategyType, run_strategy};
pub use tokenizer::{CharTokenizer, TiktokenTokenizer, Tokenizer, tokenizer_for};
pub use window::TokenWindowStrategy;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

pub struct Ingested {
    pub documents: Vec<Document>,
    pub chunks: Vec<ChunkRecord>,
}

/// Main ingestion pipeline
pub async fn ingest_file(file_path: &Path, chunker: &Chunker) -> Result<Ingested> {
    let document = FileReader::read_file(file_path).await?;
    let documents = vec![document];
    let chunks = chunker.chunk(&documents)?;

    Ok(Ingested { documents, chunks })
}

/// Ingest entire directory
pub async fn ingest_directory(dir_path: &Path, chunker: &Chunker) -> Result<Ingested> {
    let documents = FileReader::read_directory(dir_path).await?;
    let chunks = chunker.chunk(&documents)?;

    Ok(Ingested { documents, chunks })
}
