//! Signal generation, card synthesis, embeddings and hybrid ranking.
//!
//! This crate turns the parsed-file/graph/flow output of `flowcard-core`
//! into ranked, citation-grounded knowledge cards: it derives per-repo
//! signals, synthesises cards, embeds and scores them, and serves the
//! hybrid lexical+dense retrieval pipeline the orchestrator and MCP
//! surface both call into.

pub mod card_generator;
pub mod embedder;
pub mod error;
pub mod hybrid;
pub mod signals;
pub mod specificity;

pub use card_generator::{generate_cards, CardGenerationInput};
pub use embedder::{EmbeddingProvider, HashingEmbedder};
pub use error::{RetrievalError, RetrievalResult};
pub use hybrid::{HybridRetriever, NoopReranker, Reranker, SearchOptions, SearchResult};
pub use signals::{generate_repo_signals, RepoSignalInputs};
pub use specificity::{repo_centroids, specificity, CardVector};

#[cfg(feature = "candle")]
pub use embedder::CandleEmbedder;
