//! Error types for the MCP server.

use thiserror::Error;

/// Result type for MCP-surface operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur in the MCP server, independent of the `rmcp`
/// wire-level `ErrorData` used inside tool handlers.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("store error: {0}")]
    Store(#[from] flowcard_store::StoreError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] flowcard_orchestrator::OrchestratorError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] flowcard_retrieval::RetrievalError),

    #[error("config error: {0}")]
    Config(#[from] flowcard_config::ConfigError),

    #[error("repo not found: {0}")]
    RepoNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
