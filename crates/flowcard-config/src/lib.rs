//! Global and per-workspace settings loading.
//!
//! Settings are merged in order: global (`~/.flowcard/config.toml`) →
//! local (`.flowcard/config.toml` in the workspace) → CLI overrides. The
//! merged value seeds the store's key-value settings table on first run;
//! after that the store is authoritative and the config file only
//! supplies defaults for keys it hasn't seen yet.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for a flowcard workspace.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowcardConfig {
    /// Workspace root and registered repos
    pub workspace: WorkspaceConfig,

    /// Retrieval tuning knobs
    pub retrieval: RetrievalConfig,

    /// Current branch-ticket context, surfaced to card/doc generation
    pub ticket: TicketConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// A single UI-registered repo: `{name, path}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoRef {
    pub name: String,
    pub path: PathBuf,
}

/// Workspace configuration: root path plus any repos registered outside
/// the primary discovery walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Absolute path, set once per workspace
    pub workspace_root: Option<PathBuf>,

    /// UI-registered repos, in addition to whatever discovery finds
    pub extra_repos: Vec<RepoRef>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { workspace_root: None, extra_repos: Vec::new() }
    }
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 0 suppresses hub cards entirely
    pub max_hub_cards: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { max_hub_cards: 2 }
    }
}

/// Branch-ticket context, read by card/doc generation for framing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TicketConfig {
    pub current_ticket_id: Option<String>,
    pub current_ticket_desc: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional; stderr when unset)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::default(), file: None }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// CLI overrides applied on top of file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace_root: Option<PathBuf>,
    pub max_hub_cards: Option<u32>,
    pub log_level: Option<String>,
}

impl FlowcardConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref root) = overrides.workspace_root {
            self.workspace.workspace_root = Some(root.clone());
        }
        if let Some(max_hub_cards) = overrides.max_hub_cards {
            self.retrieval.max_hub_cards = max_hub_cards;
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Flattens the merged config into the `key → value` pairs recognised
    /// by the store's settings table, skipping unset keys so the store's
    /// own defaults (or a previously-`PUT` value) aren't clobbered.
    pub fn as_settings_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(root) = &self.workspace.workspace_root {
            pairs.push(("workspace_root", root.display().to_string()));
        }
        pairs.push(("max_hub_cards", self.retrieval.max_hub_cards.to_string()));
        if !self.workspace.extra_repos.is_empty() {
            if let Ok(json) = serde_json::to_string(&self.workspace.extra_repos) {
                pairs.push(("extra_repos", json));
            }
        }
        if let Some(id) = &self.ticket.current_ticket_id {
            pairs.push(("current_ticket_id", id.clone()));
        }
        if let Some(desc) = &self.ticket.current_ticket_desc {
            pairs.push(("current_ticket_desc", desc.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_retrieval_knobs() {
        let config = FlowcardConfig::default();
        assert_eq!(config.retrieval.max_hub_cards, 2);
        assert!(config.workspace.workspace_root.is_none());
        assert!(config.workspace.extra_repos.is_empty());
    }

    #[test]
    fn apply_overrides_sets_workspace_root_and_hub_cap() {
        let mut config = FlowcardConfig::default();
        let overrides = ConfigOverrides {
            workspace_root: Some(PathBuf::from("/work/repos")),
            max_hub_cards: Some(0),
            ..Default::default()
        };
        config.apply_overrides(&overrides);

        assert_eq!(config.workspace.workspace_root, Some(PathBuf::from("/work/repos")));
        assert_eq!(config.retrieval.max_hub_cards, 0);
    }

    #[test]
    fn settings_pairs_always_include_max_hub_cards() {
        let config = FlowcardConfig::default();
        let pairs = config.as_settings_pairs();
        assert!(pairs.iter().any(|(k, v)| *k == "max_hub_cards" && v == "2"));
    }

    #[test]
    fn settings_pairs_include_extra_repos_as_json() {
        let mut config = FlowcardConfig::default();
        config.workspace.extra_repos.push(RepoRef { name: "payments".to_string(), path: PathBuf::from("/repos/payments") });
        let pairs = config.as_settings_pairs();
        let (_, json) = pairs.iter().find(|(k, _)| *k == "extra_repos").unwrap();
        assert!(json.contains("payments"));
    }
}
