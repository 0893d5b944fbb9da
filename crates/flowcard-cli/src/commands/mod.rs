//! CLI command implementations
//!
//! This module contains all flowcard CLI command implementations.

pub mod config;
pub mod health;
pub mod init;
pub mod mcp;
pub mod reindex;
pub mod repos;
pub mod search;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use flowcard_config::{ConfigLoader, FlowcardConfig, RepoRef};
use flowcard_orchestrator::{IndexerOrchestrator, RepoTarget};
use flowcard_retrieval::embedder::{EmbeddingProvider, HashingEmbedder};
use flowcard_retrieval::hybrid::{HybridRetriever, NoopReranker};
use flowcard_store::Store;

use crate::GlobalOptions;

/// Resolve the workspace root from options or the current directory.
pub fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    let path = match &global.workspace {
        Some(ws) => PathBuf::from(ws),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    path.canonicalize().context("Failed to resolve workspace path")
}

/// Load configuration with CLI overrides applied.
pub fn load_config(global: &GlobalOptions, workspace: &Path) -> Result<FlowcardConfig> {
    let mut loader = ConfigLoader::new();
    let mut config = loader.load(workspace, None).context("Failed to load configuration")?;
    config.apply_overrides(&global.to_config_overrides());
    Ok(config)
}

fn store_path(workspace: &Path) -> PathBuf {
    workspace.join(".flowcard").join("flowcard.db")
}

/// Open the store for a workspace, creating `.flowcard/` if needed.
pub fn open_store(workspace: &Path) -> Result<Arc<Store>> {
    let db_path = store_path(workspace);
    std::fs::create_dir_all(db_path.parent().unwrap()).context("Failed to create .flowcard directory")?;
    Ok(Arc::new(Store::open(&db_path)?))
}

/// The trio a CLI command needs to drive indexing and search directly,
/// without the MCP protocol layer.
pub struct Runtime {
    pub workspace: PathBuf,
    pub config: FlowcardConfig,
    pub store: Arc<Store>,
    pub orchestrator: Arc<IndexerOrchestrator>,
    pub retriever: Arc<HybridRetriever>,
}

impl Runtime {
    pub fn open(global: &GlobalOptions) -> Result<Self> {
        let workspace = resolve_workspace(global)?;
        let config = load_config(global, &workspace)?;
        let store = open_store(&workspace)?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
        let orchestrator = Arc::new(IndexerOrchestrator::new(Arc::clone(&store), Arc::clone(&embedder)));
        let retriever = Arc::new(HybridRetriever::new(Arc::clone(&store), embedder, Arc::new(NoopReranker)));

        Ok(Self { workspace, config, store, orchestrator, retriever })
    }

    /// Registered repo targets: the workspace root plus any extra repos,
    /// optionally filtered to one name.
    pub fn repo_targets(&self, only_repo: Option<&str>) -> Vec<RepoTarget> {
        let root_name = self.workspace.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "workspace".to_string());

        let mut repos = vec![RepoRef { name: root_name, path: self.workspace.clone() }];
        repos.extend(self.config.workspace.extra_repos.clone());

        repos
            .into_iter()
            .filter(|r| only_repo.map(|name| name == r.name).unwrap_or(true))
            .map(|r| RepoTarget { name: r.name, path: r.path })
            .collect()
    }
}

/// Print a result in a consistent format.
#[allow(dead_code)]
pub fn print_result<T: std::fmt::Display>(result: T, quiet: bool) {
    if !quiet {
        println!("{}", result);
    }
}

/// Print an error message to stderr.
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("error: {}", message);
}

/// Print a warning message to stderr.
#[allow(dead_code)]
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
