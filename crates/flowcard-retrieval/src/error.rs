//! Error types for retrieval: embeddings, signal generation, hybrid ranking.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding provider failed or is not configured; callers fall back to
    /// lexical-only ranking rather than failing the whole search.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The configured LLM backend could not be reached; card/doc generation
    /// falls back to structural synthesis.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// The cross-encoder reranker could not be reached; ranking falls back
    /// to the fused RRF order.
    #[error("reranker unavailable: {0}")]
    RerankUnavailable(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store error: {0}")]
    Store(#[from] flowcard_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;
