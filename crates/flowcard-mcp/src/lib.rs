//! Flowcard MCP - MCP server exposing citation-grounded knowledge cards to
//! AI coding assistants.
//!
//! # Features
//!
//! - **Hybrid search**: lexical + dense retrieval via `search`
//! - **Change tracking**: `sync` stales cards and docs on file changes
//! - **Workspace management**: `repos.register` / `repos.unregister` / `repos.list`
//! - **Index freshness**: `refresh`, `reindex-stale`, `reindex-status`

pub mod error;
pub mod server;
pub mod tools;

pub use error::{McpError, Result};
pub use server::{FlowcardServer, ServerConfig};
