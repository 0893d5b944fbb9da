//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.flowcard/config.toml`
//! 2. Local config: `.flowcard/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, FlowcardConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".flowcard";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".flowcard";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.flowcard`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<FlowcardConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.flowcard`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self { global_config_dir, global_config: None }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self { global_config_dir: Some(global_dir.into()), global_config: None }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(&mut self, workspace_root: &Path, overrides: Option<&ConfigOverrides>) -> Result<FlowcardConfig, ConfigError> {
        let mut config = FlowcardConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        if config.workspace.workspace_root.is_none() {
            config.workspace.workspace_root = Some(workspace_root.to_path_buf());
        }

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<FlowcardConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;

        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<FlowcardConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &FlowcardConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &FlowcardConfig) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.flowcard/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        if !global_dir.exists() {
            std::fs::create_dir_all(global_dir).map_err(|e| ConfigError::create_dir(global_dir, e))?;
        }

        let config_path = global_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = FlowcardConfig::default();
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.flowcard/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = workspace_root.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir).map_err(|e| ConfigError::create_dir(&local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let mut default_config = FlowcardConfig::default();
            default_config.workspace.workspace_root = Some(workspace_root.to_path_buf());
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<FlowcardConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &FlowcardConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: FlowcardConfig, overlay: FlowcardConfig) -> FlowcardConfig {
    FlowcardConfig {
        workspace: merge_workspace(base.workspace, overlay.workspace),
        retrieval: merge_retrieval(base.retrieval, overlay.retrieval),
        ticket: merge_ticket(base.ticket, overlay.ticket),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Merge workspace config: overlay root wins if set, extra repos accumulate.
fn merge_workspace(base: crate::WorkspaceConfig, overlay: crate::WorkspaceConfig) -> crate::WorkspaceConfig {
    crate::WorkspaceConfig {
        workspace_root: overlay.workspace_root.or(base.workspace_root),
        extra_repos: {
            let mut repos = base.extra_repos;
            for repo in overlay.extra_repos {
                if !repos.iter().any(|r: &crate::RepoRef| r.name == repo.name) {
                    repos.push(repo);
                }
            }
            repos
        },
    }
}

/// Merge retrieval config.
fn merge_retrieval(base: crate::RetrievalConfig, overlay: crate::RetrievalConfig) -> crate::RetrievalConfig {
    crate::RetrievalConfig { max_hub_cards: if overlay.max_hub_cards != 2 { overlay.max_hub_cards } else { base.max_hub_cards } }
}

/// Merge ticket config.
fn merge_ticket(base: crate::TicketConfig, overlay: crate::TicketConfig) -> crate::TicketConfig {
    crate::TicketConfig {
        current_ticket_id: overlay.current_ticket_id.or(base.current_ticket_id),
        current_ticket_desc: overlay.current_ticket_desc.or(base.current_ticket_desc),
    }
}

/// Merge logging config.
fn merge_logging(base: crate::LoggingConfig, overlay: crate::LoggingConfig) -> crate::LoggingConfig {
    crate::LoggingConfig {
        level: if overlay.level != "info" { overlay.level } else { base.level },
        format: overlay.format,
        file: overlay.file.or(base.file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(content: &str, dir: &Path, filename: &str) -> PathBuf {
        let config_dir = dir.join(".flowcard");
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(filename);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.retrieval.max_hub_cards, 2);
        assert_eq!(config.workspace.workspace_root, Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_test_config(
            r#"
            [retrieval]
            max_hub_cards = 5
            "#,
            temp.path(),
            "config.toml",
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.retrieval.max_hub_cards, 5);
    }

    #[test]
    fn test_global_overrides_default() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            r#"
            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            r#"
            [logging]
            level = "debug"

            [retrieval]
            max_hub_cards = 3
            "#,
        )
        .unwrap();

        create_test_config(
            r#"
            [retrieval]
            max_hub_cards = 7
            "#,
            temp.path(),
            "config.toml",
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.retrieval.max_hub_cards, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_all() {
        let temp = TempDir::new().unwrap();

        create_test_config(
            r#"
            [retrieval]
            max_hub_cards = 3
            "#,
            temp.path(),
            "config.toml",
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let overrides = ConfigOverrides { max_hub_cards: Some(9), log_level: Some("trace".to_string()), ..Default::default() };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.retrieval.max_hub_cards, 9);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = FlowcardConfig::default();
        config.retrieval.max_hub_cards = 4;
        config.logging.level = "warn".to_string();

        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded.retrieval.max_hub_cards, 4);
        assert_eq!(loaded.logging.level, "warn");
    }

    #[test]
    fn test_init_local_creates_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init_local(temp.path()).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with(".flowcard/config.toml"));

        let content = std::fs::read_to_string(&config_path).unwrap();
        let _: FlowcardConfig = toml::from_str(&content).unwrap();
    }

    #[test]
    fn test_extra_repos_merge_dedupes_by_name() {
        let base = crate::WorkspaceConfig { workspace_root: None, extra_repos: vec![crate::RepoRef { name: "payments".to_string(), path: PathBuf::from("/a") }] };

        let overlay = crate::WorkspaceConfig { workspace_root: None, extra_repos: vec![crate::RepoRef { name: "billing".to_string(), path: PathBuf::from("/b") }] };

        let merged = merge_workspace(base, overlay);

        assert!(merged.extra_repos.iter().any(|r| r.name == "payments"));
        assert!(merged.extra_repos.iter().any(|r| r.name == "billing"));
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            r#"
            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let mut loader = ConfigLoader::with_global_dir(&global_dir);

        let _ = loader.load_global().unwrap();
        assert!(loader.global_config.is_some());

        loader.clear_cache();
        assert!(loader.global_config.is_none());
    }
}
