//! MCP tool parameter definitions.
//!
//! These structs define the JSON Schema for tool parameters using schemars.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

/// A single changed file reported by a client-side sync.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangedFileParam {
    #[schemars(description = "Workspace-relative file path")]
    pub path: String,

    #[schemars(description = "\"added\", \"modified\", or \"deleted\"")]
    pub status: String,

    #[schemars(description = "File content, used only to decide card/doc staleness, not persisted")]
    pub content: Option<String>,
}

/// Parameters for the `sync` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    #[schemars(description = "Name of the repo the changes belong to")]
    pub repo: String,

    #[schemars(description = "Branch the changes are on")]
    pub branch: Option<String>,

    #[schemars(description = "Commit SHA the changes are relative to")]
    pub commit_sha: Option<String>,

    #[schemars(description = "\"save\", \"merge\", \"pull\", or \"rebase\"")]
    pub event_type: String,

    #[schemars(description = "Files touched since the last sync")]
    pub changed_files: Vec<ChangedFileParam>,

    #[schemars(description = "Opaque identifier for the developer driving the change, used for metrics only")]
    pub dev_id: Option<String>,
}

/// Parameters for the `search` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Natural-language or identifier query")]
    pub query: String,

    #[schemars(description = "Maximum cards to return (default 5)")]
    pub limit: Option<usize>,

    #[schemars(description = "Branch to scope results to, when cards carry valid_branches")]
    pub branch: Option<String>,
}

/// Parameters for the `health` tool (no params needed).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthParams {}

/// Parameters for `repos.register`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RepoRegisterParams {
    #[schemars(description = "Short name used to refer to the repo elsewhere")]
    pub name: String,

    #[schemars(description = "Absolute path to the repo's working tree")]
    pub path: String,
}

/// Parameters for `repos.unregister`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RepoUnregisterParams {
    #[schemars(description = "Name previously passed to repos.register")]
    pub name: String,
}

/// Parameters for `repos.list` (no params needed).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RepoListParams {}

/// Parameters for `refresh`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RefreshParams {
    #[schemars(description = "Limit doc refresh to one repo; omit to refresh all registered repos")]
    pub repo: Option<String>,
}

/// Parameters for `reindex-stale`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReindexStaleParams {
    #[schemars(description = "Limit reindexing to one repo; omit to reindex every registered repo")]
    pub repo: Option<String>,
}

/// Parameters for `reindex-status` (no params needed).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReindexStatusParams {}

/// Parameters for `config.get`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigGetParams {
    #[schemars(description = "Settings key, e.g. \"max_hub_cards\"; omit to fetch all keys")]
    pub key: Option<String>,
}

/// Parameters for `config.put`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigPutParams {
    #[schemars(description = "Settings key to write")]
    pub key: String,

    #[schemars(description = "Value to store, as a string")]
    pub value: String,
}
