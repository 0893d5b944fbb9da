//! Flowcard MCP server implementation.
//!
//! Exposes the retrieval engine's external interface as MCP tools:
//! - `sync`: ingest changed files, invalidate stale cards/docs, scoped reindex on merge/pull
//! - `search`: hybrid lexical+dense card retrieval
//! - `health`: store-level liveness and counts
//! - `repos.register` / `repos.unregister` / `repos.list`: per-repo management
//! - `refresh`: regenerate stale docs only
//! - `reindex-stale` / `reindex-status`: full reindex, queued in the background

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rmcp::{handler::server::{tool::ToolRouter, wrapper::Parameters}, model::*, tool, tool_handler, tool_router, ErrorData as McpError};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use flowcard_config::{ConfigLoader, FlowcardConfig, RepoRef};
use flowcard_orchestrator::{ChangeStatus, ChangedFile, IndexerOrchestrator, InvalidationRequest, OrchestratorConfig, RepoTarget, RunOutcome};
use flowcard_retrieval::embedder::{EmbeddingProvider, HashingEmbedder};
use flowcard_retrieval::hybrid::{HybridRetriever, NoopReranker, SearchOptions};
use flowcard_store::types::config_keys;
use flowcard_store::Store;

use crate::tools::*;

/// Server configuration: one workspace root, one store.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub workspace_root: PathBuf,
    pub skip_existing_docs: bool,
}

impl ServerConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into(), skip_existing_docs: true }
    }

    fn store_path(&self) -> PathBuf {
        self.workspace_root.join(".flowcard").join("flowcard.db")
    }
}

/// Status of a reindex run, surfaced by `reindex-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexStatus {
    Idle,
    Running,
    Done,
    Error,
}

impl ReindexStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ReindexStatus::Idle => "idle",
            ReindexStatus::Running => "running",
            ReindexStatus::Done => "done",
            ReindexStatus::Error => "error",
        }
    }
}

/// State of the background reindex task.
#[derive(Debug, Clone)]
struct ReindexState {
    status: ReindexStatus,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    log: Vec<String>,
    error: Option<String>,
}

impl Default for ReindexState {
    fn default() -> Self {
        Self { status: ReindexStatus::Idle, started_at: None, finished_at: None, log: Vec::new(), error: None }
    }
}

/// Flowcard MCP server exposing the retrieval engine's external interface.
#[derive(Clone)]
pub struct FlowcardServer {
    workspace_root: PathBuf,
    store: Arc<Store>,
    orchestrator: Arc<IndexerOrchestrator>,
    retriever: Arc<HybridRetriever>,
    repos: Arc<RwLock<Vec<RepoRef>>>,
    reindex_state: Arc<RwLock<ReindexState>>,
    tool_router: ToolRouter<Self>,
    shutdown_tx: watch::Sender<bool>,
}

#[tool_router]
impl FlowcardServer {
    pub async fn new(config: ServerConfig) -> Result<Self, crate::McpError> {
        info!("Initializing flowcard MCP server");
        info!("  Workspace: {}", config.workspace_root.display());

        std::fs::create_dir_all(config.store_path().parent().unwrap())?;
        let store = Arc::new(Store::open(&config.store_path())?);

        let mut loader = ConfigLoader::new();
        let flowcard_config = loader.load(&config.workspace_root, None).map_err(crate::McpError::Config)?;
        seed_store_config(&store, &flowcard_config)?;

        let repo_name = config.workspace_root.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "workspace".to_string());
        let mut repos = vec![RepoRef { name: repo_name, path: config.workspace_root.clone() }];
        repos.extend(flowcard_config.workspace.extra_repos.clone());

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
        let orchestrator = Arc::new(IndexerOrchestrator::new(Arc::clone(&store), Arc::clone(&embedder)));
        let retriever = Arc::new(HybridRetriever::new(Arc::clone(&store), embedder, Arc::new(NoopReranker)));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            workspace_root: config.workspace_root,
            store,
            orchestrator,
            retriever,
            repos: Arc::new(RwLock::new(repos)),
            reindex_state: Arc::new(RwLock::new(ReindexState::default())),
            tool_router: Self::tool_router(),
            shutdown_tx,
        })
    }

    pub fn shutdown(&self) {
        info!("Shutdown signal sent to background tasks");
        let _ = self.shutdown_tx.send(true);
    }

    async fn orchestrator_config(&self, only_repo: Option<&str>) -> Vec<RepoTarget> {
        let repos = self.repos.read().await;
        repos
            .iter()
            .filter(|r| only_repo.map(|name| name == r.name).unwrap_or(true))
            .map(|r| RepoTarget { name: r.name.clone(), path: r.path.clone() })
            .collect()
    }

    // =========================================================================
    // MCP Tools
    // =========================================================================

    #[tool(name = "sync", description = "Ingest changed files for a repo: stales the cards and docs they touch, and for merge/pull events triggers a scoped reindex of that repo.")]
    async fn sync(&self, Parameters(params): Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        let changed: Vec<ChangedFile> = params
            .changed_files
            .iter()
            .map(|f| ChangedFile {
                path: f.path.clone(),
                status: match f.status.as_str() {
                    "added" => ChangeStatus::Added,
                    "deleted" => ChangeStatus::Deleted,
                    _ => ChangeStatus::Modified,
                },
            })
            .collect();

        let is_merge_event = matches!(params.event_type.as_str(), "merge" | "pull");
        let request = InvalidationRequest { repo: &params.repo, changed_files: &changed, is_merge_event };

        let result = self.orchestrator.invalidate_repo(&request).map_err(|e| McpError::internal_error(e.to_string(), None))?;

        if is_merge_event {
            let targets = self.orchestrator_config(Some(&params.repo)).await;
            if !targets.is_empty() {
                let orchestrator = Arc::clone(&self.orchestrator);
                let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: false };
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.run(&run_config).await {
                        warn!(error = %e, "scoped reindex after merge/pull failed");
                    }
                });
            }
        }

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&serde_json::json!({
                "indexed": is_merge_event,
                "invalidated": result.staled_card_count,
                "staledDocTypes": result.staled_doc_types.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            }))
            .unwrap_or_default(),
        )]))
    }

    #[tool(name = "search", description = "Hybrid lexical+dense search over knowledge cards. Returns cards ranked by fused score, reranked when a cross-encoder is configured, hub-capped per max_hub_cards.")]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let options = SearchOptions { limit: params.limit.unwrap_or(5), branch: params.branch, semantic_query: None };

        let result = self.retriever.search(&params.query, options).await.map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let results: Vec<serde_json::Value> = result
            .cards
            .iter()
            .map(|scored| {
                serde_json::json!({
                    "card": scored.card,
                    "score": scored.score,
                    "source": scored.source.as_str(),
                })
            })
            .collect();

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&serde_json::json!({
                "query": params.query,
                "cacheHit": result.cache_hit,
                "reranked": result.reranked,
                "results": results,
            }))
            .unwrap_or_default(),
        )]))
    }

    #[tool(name = "health", description = "Liveness check: store status plus card and flow counts.")]
    async fn health(&self, Parameters(_params): Parameters<HealthParams>) -> Result<CallToolResult, McpError> {
        let cards = self.store.fetch_all_cards().map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let flows: std::collections::HashSet<&str> = cards.iter().filter(|c| !c.stale).map(|c| c.flow.as_str()).collect();

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&serde_json::json!({
                "status": "ok",
                "workspaceRoot": self.workspace_root,
                "cards": cards.len(),
                "flows": flows.len(),
            }))
            .unwrap_or_default(),
        )]))
    }

    #[tool(name = "repos.register", description = "Register an additional repo in this workspace. Triggers a background reindex of that repo.")]
    async fn repos_register(&self, Parameters(params): Parameters<RepoRegisterParams>) -> Result<CallToolResult, McpError> {
        let repo = RepoRef { name: params.name.clone(), path: PathBuf::from(&params.path) };
        {
            let mut repos = self.repos.write().await;
            repos.retain(|r| r.name != repo.name);
            repos.push(repo.clone());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let reindex_state = Arc::clone(&self.reindex_state);
        let run_config = OrchestratorConfig { repos: vec![RepoTarget { name: repo.name, path: repo.path }], skip_existing_docs: true };
        tokio::spawn(run_reindex(orchestrator, reindex_state, run_config));

        Ok(CallToolResult::success(vec![Content::text(serde_json::to_string_pretty(&serde_json::json!({ "reindexing": true })).unwrap_or_default())]))
    }

    #[tool(name = "repos.unregister", description = "Remove a repo previously added with repos.register. Does not delete its cards.")]
    async fn repos_unregister(&self, Parameters(params): Parameters<RepoUnregisterParams>) -> Result<CallToolResult, McpError> {
        let mut repos = self.repos.write().await;
        let before = repos.len();
        repos.retain(|r| r.name != params.name);
        let removed = repos.len() < before;

        Ok(CallToolResult::success(vec![Content::text(serde_json::to_string_pretty(&serde_json::json!({ "removed": removed })).unwrap_or_default())]))
    }

    #[tool(name = "repos.list", description = "List every repo registered in this workspace, including the primary workspace root.")]
    async fn repos_list(&self, Parameters(_params): Parameters<RepoListParams>) -> Result<CallToolResult, McpError> {
        let repos = self.repos.read().await;
        let listed: Vec<serde_json::Value> = repos.iter().map(|r| serde_json::json!({ "name": r.name, "path": r.path })).collect();

        Ok(CallToolResult::success(vec![Content::text(serde_json::to_string_pretty(&serde_json::json!({ "repos": listed })).unwrap_or_default())]))
    }

    #[tool(name = "refresh", description = "Regenerate stale project docs only, for one repo or the whole workspace. Does not touch cards.")]
    async fn refresh(&self, Parameters(params): Parameters<RefreshParams>) -> Result<CallToolResult, McpError> {
        let targets = self.orchestrator_config(params.repo.as_deref()).await;
        if targets.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({ "refreshed": 0, "skipped": 0, "errors": [format!("unknown repo: {:?}", params.repo)] })).unwrap_or_default(),
            )]));
        }

        let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: true };
        match self.orchestrator.run(&run_config).await {
            Ok(RunOutcome::Completed(summary)) => Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({
                    "refreshed": summary.docs_generated,
                    "skipped": summary.docs_skipped,
                    "errors": [],
                }))
                .unwrap_or_default(),
            )])),
            Ok(RunOutcome::Queued) => Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({ "refreshed": 0, "skipped": 0, "errors": ["an indexing run is already in progress"] })).unwrap_or_default(),
            )])),
            Err(e) => Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({ "refreshed": 0, "skipped": 0, "errors": [e.to_string()] })).unwrap_or_default(),
            )])),
        }
    }

    #[tool(name = "reindex-stale", description = "Queue a full reindex of one repo or the whole workspace. Returns immediately; poll reindex-status for completion. Fails if a run is already in progress.")]
    async fn reindex_stale(&self, Parameters(params): Parameters<ReindexStaleParams>) -> Result<CallToolResult, McpError> {
        {
            let state = self.reindex_state.read().await;
            if state.status == ReindexStatus::Running {
                return Ok(CallToolResult::success(vec![Content::text(
                    serde_json::to_string_pretty(&serde_json::json!({ "status": "conflict", "message": "a reindex is already running" })).unwrap_or_default(),
                )]));
            }
        }

        let targets = self.orchestrator_config(params.repo.as_deref()).await;
        if targets.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({ "status": "noop", "staleCount": 0 })).unwrap_or_default(),
            )]));
        }

        let stale_count: usize = self
            .store
            .fetch_all_cards()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .iter()
            .filter(|c| c.stale)
            .count();

        let orchestrator = Arc::clone(&self.orchestrator);
        let reindex_state = Arc::clone(&self.reindex_state);
        let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: true };
        tokio::spawn(run_reindex(orchestrator, reindex_state, run_config));

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&serde_json::json!({ "status": "queued", "staleCount": stale_count })).unwrap_or_default(),
        )]))
    }

    #[tool(name = "reindex-status", description = "Check the status of the background reindex task: idle, running, done, or error.")]
    async fn reindex_status(&self, Parameters(_params): Parameters<ReindexStatusParams>) -> Result<CallToolResult, McpError> {
        let state = self.reindex_state.read().await;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&serde_json::json!({
                "status": state.status.as_str(),
                "startedAt": state.started_at.map(|t| t.elapsed().as_secs()),
                "finishedAt": state.finished_at.map(|t| t.elapsed().as_secs()),
                "log": state.log,
                "error": state.error,
            }))
            .unwrap_or_default(),
        )]))
    }

    #[tool(name = "config.get", description = "Read a setting from the workspace's config store, or every recognised setting when key is omitted.")]
    async fn config_get(&self, Parameters(params): Parameters<ConfigGetParams>) -> Result<CallToolResult, McpError> {
        if let Some(key) = params.key {
            let value = self.store.get_config(&key).map_err(|e| McpError::internal_error(e.to_string(), None))?;
            return Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string_pretty(&serde_json::json!({ "key": key, "value": value })).unwrap_or_default(),
            )]));
        }

        let all = self.store.all_config().map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&all.into_iter().collect::<std::collections::HashMap<_, _>>()).unwrap_or_default(),
        )]))
    }

    #[tool(name = "config.put", description = "Write a setting to the workspace's config store. Only recognised keys take effect on the next run.")]
    async fn config_put(&self, Parameters(params): Parameters<ConfigPutParams>) -> Result<CallToolResult, McpError> {
        if !config_keys::RECOGNISED.contains(&params.key.as_str()) {
            return Err(McpError::invalid_params(format!("unrecognised config key: {}", params.key), None));
        }
        self.store.set_config(&params.key, &params.value).map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(serde_json::to_string_pretty(&serde_json::json!({ "ok": true })).unwrap_or_default())]))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for FlowcardServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Flowcard: persistent, repo-aware knowledge retrieval for AI assistants.\n\n\
                TOOLS:\n\
                - search: hybrid lexical+dense card retrieval (start here)\n\
                - sync: report changed files so stale cards/docs are marked correctly\n\
                - refresh / reindex-stale / reindex-status: keep the index current\n\
                - repos.register / repos.unregister / repos.list: manage the workspace\n\
                - config.get / config.put: read and write workspace settings\n\
                - health: liveness and card/flow counts\n\n\
                WORKFLOW: search → sync on file changes → reindex-stale when search looks outdated"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Seeds the store's settings table from file-based config, without
/// overwriting a key the store already has a value for.
fn seed_store_config(store: &Store, config: &FlowcardConfig) -> Result<(), crate::McpError> {
    for (key, value) in config.as_settings_pairs() {
        if store.get_config(key)?.is_none() {
            store.set_config(key, &value)?;
        }
    }
    Ok(())
}

/// Drives one background reindex run, updating `reindex_state` for
/// `reindex-status` to observe.
async fn run_reindex(orchestrator: Arc<IndexerOrchestrator>, reindex_state: Arc<RwLock<ReindexState>>, run_config: OrchestratorConfig) {
    {
        let mut state = reindex_state.write().await;
        state.status = ReindexStatus::Running;
        state.started_at = Some(Instant::now());
        state.finished_at = None;
        state.error = None;
    }

    match orchestrator.run(&run_config).await {
        Ok(RunOutcome::Completed(summary)) => {
            let mut state = reindex_state.write().await;
            state.status = ReindexStatus::Done;
            state.finished_at = Some(Instant::now());
            state.log = orchestrator.phase_log();
            state.log.push(format!(
                "completed: {} repos, {} cards, {} docs generated",
                summary.repos_indexed, summary.cards_generated, summary.docs_generated
            ));
        }
        Ok(RunOutcome::Queued) => {
            let mut state = reindex_state.write().await;
            state.status = ReindexStatus::Idle;
            state.finished_at = Some(Instant::now());
        }
        Err(e) => {
            warn!(error = %e, "background reindex failed");
            let mut state = reindex_state.write().await;
            state.status = ReindexStatus::Error;
            state.finished_at = Some(Instant::now());
            state.error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn health_reports_zero_cards_for_a_fresh_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.rb"), "class A; end\n").unwrap();

        let server = FlowcardServer::new(ServerConfig::new(dir.path())).await.unwrap();
        let cards = server.store.fetch_all_cards().unwrap();
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn repos_register_adds_to_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let server = FlowcardServer::new(ServerConfig::new(dir.path())).await.unwrap();

        {
            let mut repos = server.repos.write().await;
            repos.push(RepoRef { name: "billing".to_string(), path: PathBuf::from("/repos/billing") });
        }

        let repos = server.repos.read().await;
        assert!(repos.iter().any(|r| r.name == "billing"));
    }

    #[tokio::test]
    async fn health_tool_reports_ok_status() {
        let dir = tempfile::tempdir().unwrap();
        let server = FlowcardServer::new(ServerConfig::new(dir.path())).await.unwrap();

        let result = server.health(Parameters(HealthParams {})).await.unwrap();
        let rendered = format!("{result:?}");
        assert!(rendered.contains("\\\"status\\\": \\\"ok\\\"") || rendered.contains("\"status\": \"ok\""));
    }

    #[tokio::test]
    async fn search_tool_finds_a_generated_card() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn checkout(cart: &Cart) -> Receipt {\n    charge(cart)\n}\n\nfn charge(cart: &Cart) -> Receipt {\n    Receipt::new()\n}\n").unwrap();

        let server = FlowcardServer::new(ServerConfig::new(dir.path())).await.unwrap();
        let repo_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        let targets = server.orchestrator_config(Some(&repo_name)).await;
        server.orchestrator.run(&OrchestratorConfig { repos: targets, skip_existing_docs: false }).await.unwrap();

        let result = server.search(Parameters(SearchParams { query: "checkout".to_string(), limit: Some(5), branch: None })).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn sync_stales_cards_touching_the_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn checkout() {}\n").unwrap();

        let server = FlowcardServer::new(ServerConfig::new(dir.path())).await.unwrap();
        let repo_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        let targets = server.orchestrator_config(Some(&repo_name)).await;
        server.orchestrator.run(&OrchestratorConfig { repos: targets, skip_existing_docs: false }).await.unwrap();

        let cards_before = server.store.fetch_all_cards().unwrap();
        assert!(!cards_before.is_empty());
        assert!(cards_before.iter().any(|c| c.source_files.iter().any(|f| f == "src/lib.rs")));
        assert!(cards_before.iter().all(|c| !c.stale));

        let params = SyncParams {
            repo: repo_name,
            branch: None,
            commit_sha: None,
            event_type: "save".to_string(),
            changed_files: vec![ChangedFileParam { path: "src/lib.rs".to_string(), status: "modified".to_string(), content: None }],
            dev_id: None,
        };

        let result = server.sync(Parameters(params)).await;
        assert!(result.is_ok());

        let rendered = format!("{:?}", result.unwrap());
        assert!(rendered.contains("\\\"invalidated\\\": 1") || rendered.contains("\"invalidated\": 1"));

        let cards_after = server.store.fetch_all_cards().unwrap();
        let touching_lib_rs: Vec<_> = cards_after.iter().filter(|c| c.source_files.iter().any(|f| f == "src/lib.rs")).collect();
        assert!(!touching_lib_rs.is_empty());
        assert!(touching_lib_rs.iter().all(|c| c.stale));
    }
}
