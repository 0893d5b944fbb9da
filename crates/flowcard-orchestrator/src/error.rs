//! Orchestrator error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("phase '{phase}' failed: {source}")]
    Phase { phase: &'static str, #[source] source: Box<OrchestratorError> },

    #[error("store error: {0}")]
    Store(#[from] flowcard_store::StoreError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] flowcard_retrieval::RetrievalError),

    #[error("core error: {0}")]
    Core(#[from] flowcard_core::error::CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn in_phase(phase: &'static str, source: OrchestratorError) -> Self {
        OrchestratorError::Phase { phase, source: Box::new(source) }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
