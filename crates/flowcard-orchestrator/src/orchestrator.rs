//! Drives one indexing run across all repos, phase by phase, under the
//! store's single advisory lock.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use flowcard_core::discovery::parse_repo;
use flowcard_core::error::ParseStats;
use flowcard_core::flow_detector::{detect_flows, SeedFlow};
use flowcard_core::git_signals::thermal_map;
use flowcard_core::graph_builder::build_edges;
use flowcard_core::parser::{Association, ParsedFile};
use flowcard_core::stack_profiler::profile_repo;

use flowcard_retrieval::card_generator::{generate_cards, CardGenerationInput};
use flowcard_retrieval::embedder::{EmbeddingMode, EmbeddingProvider};
use flowcard_retrieval::signals::{generate_repo_signals, RepoSignalInputs};
use flowcard_retrieval::specificity::{repo_centroids, specificity, CardVector};

use flowcard_store::types::{config_keys, CardEmbedding, DocType, FileIndexRow, ProjectDoc, RepoProfileRow};
use flowcard_store::Store;

use crate::docs::{DocGenerationContext, DocGenerator, StructuralDocGenerator};
use crate::error::OrchestratorResult;
use crate::invalidator;

const LOCK_OWNER: &str = "indexer";
const PHASE_LOG_CAPACITY: usize = 200;

/// All project-level doc types an indexing run is responsible for, in the
/// order they're attempted.
const ALL_DOC_TYPES: &[DocType] = &[
    DocType::Readme,
    DocType::About,
    DocType::Architecture,
    DocType::CodeStyle,
    DocType::Rules,
    DocType::Styles,
    DocType::Pages,
    DocType::BeOverview,
    DocType::Business,
    DocType::Product,
    DocType::CrossRepo,
    DocType::Specialist,
];

pub struct RepoTarget {
    pub name: String,
    pub path: PathBuf,
}

pub struct OrchestratorConfig {
    pub repos: Vec<RepoTarget>,
    pub skip_existing_docs: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub repos_indexed: usize,
    pub files_parsed: usize,
    pub unreadable_files: usize,
    pub unparseable_files: usize,
    pub cards_generated: usize,
    pub docs_generated: usize,
    pub docs_skipped: usize,
}

pub enum RunOutcome {
    Queued,
    Completed(RunSummary),
}

/// Deepest directory that is an ancestor of every registered repo's root.
/// Falls back to `.` when there are no repos, or to the first repo's own
/// root when the repos don't share a common ancestor (rare outside tests
/// that register unrelated temp directories).
fn common_ancestor(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter();
    let Some(first) = iter.next() else { return PathBuf::from(".") };

    let mut common: Vec<std::ffi::OsString> = first.components().map(|c| c.as_os_str().to_os_string()).collect();
    for path in iter {
        let components: Vec<_> = path.components().map(|c| c.as_os_str().to_os_string()).collect();
        let shared = common.iter().zip(&components).take_while(|(a, b)| a == b).count();
        common.truncate(shared);
    }

    if common.is_empty() {
        first.clone()
    } else {
        common.into_iter().collect()
    }
}

fn head_commit_sha(repo_root: &Path) -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).current_dir(repo_root).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

pub struct IndexerOrchestrator {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    doc_generator: Arc<dyn DocGenerator>,
    phase_log: Mutex<VecDeque<String>>,
}

impl IndexerOrchestrator {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        IndexerOrchestrator { store, embedder, doc_generator: Arc::new(StructuralDocGenerator), phase_log: Mutex::new(VecDeque::new()) }
    }

    pub fn with_doc_generator(mut self, doc_generator: Arc<dyn DocGenerator>) -> Self {
        self.doc_generator = doc_generator;
        self
    }

    /// Rolling 200-line log surfaced by `reindex-status`.
    pub fn phase_log(&self) -> Vec<String> {
        self.phase_log.lock().iter().cloned().collect()
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        let mut log = self.phase_log.lock();
        log.push_back(line);
        while log.len() > PHASE_LOG_CAPACITY {
            log.pop_front();
        }
    }

    pub async fn run(&self, config: &OrchestratorConfig) -> OrchestratorResult<RunOutcome> {
        match self.store.acquire_lock(LOCK_OWNER) {
            Ok(()) => {}
            Err(flowcard_store::StoreError::ConcurrentRun { .. }) => return Ok(RunOutcome::Queued),
            Err(e) => return Err(e.into()),
        }

        let result = self.run_locked(config).await;
        self.store.release_lock(LOCK_OWNER)?;
        result.map(RunOutcome::Completed)
    }

    async fn run_locked(&self, config: &OrchestratorConfig) -> OrchestratorResult<RunSummary> {
        let mut summary = RunSummary::default();

        // Phase 0: intelligence (thermal map + commit shas), per repo.
        self.log("phase 0: intelligence");
        let mut thermals = HashMap::new();
        let mut commit_shas = HashMap::new();
        for repo in &config.repos {
            thermals.insert(repo.name.clone(), thermal_map(&repo.path));
            if let Some(sha) = head_commit_sha(&repo.path) {
                commit_shas.insert(repo.name.clone(), sha);
            }
        }

        // Phase 1: parse each repo, union across repos.
        self.log("phase 1: parse");
        let mut all_files: Vec<ParsedFile> = Vec::new();
        let mut stats = ParseStats::default();
        for repo in &config.repos {
            let (files, repo_stats) = parse_repo(&repo.path, &repo.name);
            stats.merge(&repo_stats);
            all_files.extend(files);
        }
        summary.files_parsed = stats.parsed;
        summary.unreadable_files = stats.unreadable;
        summary.unparseable_files = stats.unparseable;
        self.log(stats.summary_line());

        // Phase 2: build and persist edges.
        self.log("phase 2: build edges");
        let workspace_root = common_ancestor(&config.repos.iter().map(|r| r.path.clone()).collect::<Vec<_>>());
        let edges = build_edges(&all_files, &workspace_root);
        self.store.replace_graph_edges(&edges)?;

        // Phase 3: optional LLM-gated discovery passes — skipped, no LLM configured.
        self.log("phase 3: discovery (skipped, no llm configured)");

        // Phase 4: detect flows, seeded from route/page associations.
        self.log("phase 4: detect flows");
        let seeds: Vec<SeedFlow> = all_files
            .iter()
            .filter(|f| f.associations.iter().any(|a| matches!(a, Association::Route { .. })))
            .map(|f| SeedFlow { name: f.path.to_string_lossy().to_string(), files: vec![f.path.clone()] })
            .collect();
        let flows = detect_flows(&edges, &all_files, &seeds);

        // Phase 5: stack profiling + signal pass 1.
        self.log("phase 5: stack profiling");
        let mut profiles = HashMap::new();
        for repo in &config.repos {
            let profile = profile_repo(&repo.path);
            self.store.upsert_repo_profile(&RepoProfileRow {
                repo: repo.name.clone(),
                primary_language: profile.primary_language.clone(),
                frameworks: profile.frameworks.clone(),
                is_lambda: profile.is_lambda,
                package_manager: profile.package_manager.clone(),
                skill_ids: profile.skill_ids.clone(),
            })?;
            profiles.insert(repo.name.clone(), profile);
        }
        self.run_signal_pass(&config.repos, &profiles, &all_files)?;

        // Phase 6: doc generation.
        self.log("phase 6: doc generation");
        for repo in &config.repos {
            let repo_files: Vec<ParsedFile> = all_files.iter().filter(|f| f.repo == repo.name).cloned().collect();
            let repo_flows: Vec<_> = flows.iter().filter(|f| f.repos.contains(&repo.name)).cloned().collect();
            let profile = profiles.get(&repo.name).cloned().unwrap_or_default();
            let ctx = DocGenerationContext { repo: &repo.name, profile: &profile, files: &repo_files, edges: &edges, flows: &repo_flows };

            for doc_type in ALL_DOC_TYPES {
                let existing = self.store.fetch_project_doc(&repo.name, *doc_type)?;
                if config.skip_existing_docs && existing.as_ref().is_some_and(|d| !d.stale) {
                    summary.docs_skipped += 1;
                    continue;
                }
                match self.doc_generator.generate(*doc_type, &ctx).await? {
                    Some(content) => {
                        self.store.upsert_project_doc(&ProjectDoc {
                            repo: repo.name.clone(),
                            doc_type: *doc_type,
                            content,
                            source_file_paths: repo_files.iter().map(|f| f.path.to_string_lossy().to_string()).collect(),
                            stale: false,
                            updated_at: Utc::now(),
                        })?;
                        summary.docs_generated += 1;
                    }
                    None => summary.docs_skipped += 1,
                }
            }
        }

        // Phase 7: signal pass 2, now with fresh docs.
        self.log("phase 7: signal pass 2");
        self.run_signal_pass(&config.repos, &profiles, &all_files)?;

        // Phase 8: card generation + mandatory lexical rebuild.
        self.log("phase 8: card generation");
        let cards = generate_cards(&CardGenerationInput {
            flows: &flows,
            files: &all_files,
            edges: &edges,
            commit_shas: &commit_shas,
            thermal_map: thermals.values().next(),
        });
        summary.cards_generated = cards.len();
        self.store.replace_cards_of_types(flowcard_store::types::CardType::regenerated_types(), &cards)?;

        // Phase 9: embeddings, specificity, centroid refresh.
        self.log("phase 9: embeddings + specificity");
        self.embed_and_score(&cards).await?;

        // Phase 10: file index upsert with heat scores and branch names.
        self.log("phase 10: file index upsert");
        for file in &all_files {
            let branch = config.repos.iter().find(|r| r.name == file.repo).and_then(|r| flowcard_core::git_signals::current_branch(&r.path));
            let heat = thermals.get(&file.repo).map(|t| t.score(&file.path)).unwrap_or(0.0);
            self.store.upsert_file_index(&FileIndexRow {
                path: file.path.to_string_lossy().to_string(),
                repo: file.repo.clone(),
                branch,
                file_role: format!("{:?}", file.file_role),
                parsed_data: serde_json::to_value(file).unwrap_or(serde_json::Value::Null),
                heat_score: heat,
            })?;
        }

        // Phase 11: optional filesystem doc writing — skipped, docs stay in the store.
        self.log("phase 11: filesystem doc writing (skipped)");

        self.store.set_config(config_keys::LAST_INDEXED_AT, &Utc::now().to_rfc3339())?;
        summary.repos_indexed = config.repos.len();
        Ok(summary)
    }

    fn run_signal_pass(&self, repos: &[RepoTarget], profiles: &HashMap<String, flowcard_core::stack_profiler::RepoProfile>, files: &[ParsedFile]) -> OrchestratorResult<()> {
        let mut inputs = Vec::new();
        for repo in repos {
            let profile = profiles.get(&repo.name).cloned().unwrap_or_default();
            let repo_files: Vec<&ParsedFile> = files.iter().filter(|f| f.repo == repo.name).collect();
            let docs_text = self
                .store
                .fetch_docs_for_repo(&repo.name)?
                .into_iter()
                .filter(|d| matches!(d.doc_type, DocType::About | DocType::Architecture | DocType::Pages | DocType::BeOverview))
                .map(|d| d.content)
                .collect::<Vec<_>>()
                .join("\n");
            inputs.push(RepoSignalInputs {
                repo: repo.name.clone(),
                primary_language: profile.primary_language.clone(),
                frameworks: profile.frameworks.clone(),
                is_lambda: profile.is_lambda,
                docs_text,
                backend_leaning_classes: repo_files.iter().filter(|f| f.file_role.is_backend_leaning()).flat_map(|f| &f.classes).count(),
                frontend_leaning_classes: repo_files.iter().filter(|f| f.file_role.is_frontend_leaning()).flat_map(|f| &f.classes).count(),
                total_classes: repo_files.iter().flat_map(|f| &f.classes).count(),
            });
        }

        let signals = generate_repo_signals(&inputs);
        for (repo, signals) in signals {
            self.store.upsert_derived_repo_signals(&repo, signals)?;
        }
        Ok(())
    }

    async fn embed_and_score(&self, cards: &[flowcard_store::types::Card]) -> OrchestratorResult<()> {
        if cards.is_empty() {
            return Ok(());
        }

        let bodies: Vec<String> = cards.iter().map(|c| format!("{}\n\n{}", c.title, c.content)).collect();
        let titles: Vec<String> = cards.iter().map(|c| c.title.clone()).collect();
        let vectors = self.embedder.embed(bodies, EmbeddingMode::Document).await?;
        let title_vectors = self.embedder.embed(titles, EmbeddingMode::Document).await?;

        for (card, (vector, title_vector)) in cards.iter().zip(vectors.iter().zip(&title_vectors)) {
            self.store.upsert_embedding(&CardEmbedding {
                card_id: card.id.clone(),
                vector: vector.clone(),
                title_vector: title_vector.clone(),
            })?;
        }

        let card_vectors: Vec<CardVector> = cards
            .iter()
            .zip(&vectors)
            .filter_map(|(card, vector)| card.source_repos.first().map(|repo| CardVector { card_id: &card.id, repo, vector }))
            .collect();
        let centroids = repo_centroids(&card_vectors);

        for cv in &card_vectors {
            if let Some(score) = specificity(cv, &centroids) {
                if let Some(mut stored) = self.store.fetch_cards_by_ids(&[cv.card_id.to_string()])?.into_iter().next() {
                    stored.specificity_score = Some(score);
                    self.store.upsert_card(&stored)?;
                }
            }
        }
        Ok(())
    }

    pub fn invalidate_repo(&self, request: &invalidator::InvalidationRequest) -> OrchestratorResult<invalidator::InvalidationResult> {
        let edges = self.store.fetch_graph_edges()?;
        Ok(invalidator::invalidate(&self.store, &edges, request)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use flowcard_retrieval::embedder::HashingEmbedder;
    use flowcard_store::Store;
    use tempfile::tempdir;

    use super::*;

    fn write_fixture_repo(root: &Path) {
        fs::create_dir_all(root.join("app/models")).unwrap();
        fs::write(
            root.join("app/models/charge.rb"),
            "class Charge < ApplicationRecord\n  belongs_to :account\nend\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn run_produces_cards_and_docs_for_a_single_repo() {
        let dir = tempdir().unwrap();
        write_fixture_repo(dir.path());

        let store = Arc::new(Store::open_in_memory().unwrap());
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
        let orchestrator = IndexerOrchestrator::new(store.clone(), embedder);

        let config = OrchestratorConfig {
            repos: vec![RepoTarget { name: "payments".to_string(), path: dir.path().to_path_buf() }],
            skip_existing_docs: false,
        };

        let outcome = orchestrator.run(&config).await.unwrap();
        let summary = match outcome {
            RunOutcome::Completed(summary) => summary,
            RunOutcome::Queued => panic!("expected the run to complete, lock was held"),
        };

        assert_eq!(summary.repos_indexed, 1);
        assert!(summary.files_parsed >= 1);
        assert!(store.lock_holder().unwrap().is_none());

        let readme = store.fetch_project_doc("payments", DocType::Readme).unwrap();
        assert!(readme.is_some());
    }

    #[tokio::test]
    async fn second_run_queues_while_first_holds_the_lock() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.acquire_lock("other-run").unwrap();

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
        let orchestrator = IndexerOrchestrator::new(store, embedder);
        let config = OrchestratorConfig { repos: vec![], skip_existing_docs: false };

        let outcome = orchestrator.run(&config).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Queued));
    }
}
