use thiserror::Error;

/// Configuration problems detected before any chunking work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("overlap ({overlap}) must be smaller than the chunk size ({size})")]
    InvalidWindow { size: usize, overlap: usize },

    #[error(
        "metadata uses {metadata_tokens} tokens which exceeds the maximum of {size} tokens per chunk, increase the chunk size"
    )]
    MetadataTooLarge { metadata_tokens: usize, size: usize },

    #[error("unknown chunk strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown encoding model: {0}")]
    UnknownEncoding(String),

    #[error("group-by column not found on document {document_id}: {column}")]
    UnknownColumn { column: String, document_id: String },

    #[error("metadata is not a JSON object: {0}")]
    InvalidMetadata(String),
}
