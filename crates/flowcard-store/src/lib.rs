//! Embedded storage layer: one SQLite database per workspace holding
//! cards, their embeddings, the file graph, generated docs, repo signals,
//! and usage metrics.

pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::Store;
pub use types::{
    config_keys, Card, CardEmbedding, CardType, DocType, FileIndexRow, Metric, ProjectDoc, RepoProfileRow, RepoSignals, SignalSource,
};
