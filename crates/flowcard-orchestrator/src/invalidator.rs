//! Marks cards and project docs stale on file change, including cross-repo
//! propagation across `api_endpoint` edges.

use std::collections::HashSet;

use flowcard_core::graph::{GraphEdge, Relation};
use flowcard_store::types::DocType;
use flowcard_store::{Store, StoreResult};

#[derive(Debug, Clone)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
}

pub struct InvalidationRequest<'a> {
    pub repo: &'a str,
    pub changed_files: &'a [ChangedFile],
    pub is_merge_event: bool,
}

#[derive(Debug, Default)]
pub struct InvalidationResult {
    pub staled_card_count: usize,
    pub staled_doc_types: Vec<DocType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeCategory {
    Schema,
    Routes,
    Models,
    Manifest,
    Stylesheet,
    Ordinary,
}

const MANIFEST_NAMES: &[&str] =
    &["package.json", "gemfile", "cargo.toml", "go.mod", "requirements.txt", "pyproject.toml", "composer.json", "pom.xml", "build.gradle"];

fn classify_changed_file(path: &str) -> ChangeCategory {
    let lowered = path.to_lowercase();
    let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);

    if MANIFEST_NAMES.iter().any(|m| file_name == *m) {
        ChangeCategory::Manifest
    } else if lowered.ends_with(".css") || lowered.ends_with(".scss") || lowered.ends_with(".sass") || lowered.ends_with(".less") {
        ChangeCategory::Stylesheet
    } else if file_name.contains("schema") || lowered.contains("/migrations/") {
        ChangeCategory::Schema
    } else if file_name == "routes" || file_name == "urls.py" || lowered.contains("/routes/") {
        ChangeCategory::Routes
    } else if lowered.contains("/models/") || file_name.ends_with("_model.rb") {
        ChangeCategory::Models
    } else {
        ChangeCategory::Ordinary
    }
}

fn doc_types_for_category(category: ChangeCategory) -> &'static [DocType] {
    match category {
        ChangeCategory::Schema => &[DocType::Architecture, DocType::Rules],
        ChangeCategory::Routes => &[DocType::Architecture],
        ChangeCategory::Models => &[DocType::About, DocType::Architecture, DocType::Rules],
        ChangeCategory::Manifest => &[DocType::Readme],
        ChangeCategory::Stylesheet => &[DocType::Styles],
        ChangeCategory::Ordinary => &[DocType::CodeStyle],
    }
}

/// Applies the card-staling rule, the doc pattern rules (plus specialist
/// cascade and merge-only changelog), and cross-repo `api_endpoint`
/// propagation, in one pass.
pub fn invalidate(store: &Store, edges: &[GraphEdge], request: &InvalidationRequest) -> StoreResult<InvalidationResult> {
    let changed_paths: HashSet<&str> = request.changed_files.iter().map(|f| f.path.as_str()).collect();

    let mut staled_ids = Vec::new();
    for card in store.fetch_all_cards()? {
        if card.stale {
            continue;
        }
        let belongs_to_repo = card.source_repos.iter().any(|r| r == request.repo);
        let touches_changed_file = card.source_files.iter().any(|f| changed_paths.contains(f.as_str()));
        if belongs_to_repo && touches_changed_file {
            staled_ids.push(card.id.clone());
        }
    }

    let mut doc_types: HashSet<DocType> = HashSet::new();
    for path in &changed_paths {
        for dt in doc_types_for_category(classify_changed_file(path)) {
            doc_types.insert(*dt);
        }
    }
    if doc_types.contains(&DocType::About) || doc_types.contains(&DocType::Architecture) || doc_types.contains(&DocType::Rules) {
        doc_types.insert(DocType::Specialist);
    }
    if request.is_merge_event {
        doc_types.insert(DocType::Changelog);
    }

    let cross_repo_targets: Vec<String> = edges
        .iter()
        .filter(|e| e.relation == Relation::ApiEndpoint)
        .filter(|e| changed_paths.contains(e.source_file.to_string_lossy().as_ref()))
        .map(|e| e.target_file.to_string_lossy().to_string())
        .collect();

    if !cross_repo_targets.is_empty() {
        for card in store.fetch_cards_by_type(flowcard_store::types::CardType::CrossService)? {
            if card.stale || staled_ids.contains(&card.id) {
                continue;
            }
            let spans_other_repo = card.source_repos.iter().any(|r| r != request.repo);
            let touches_target = card.source_files.iter().any(|f| cross_repo_targets.contains(f));
            if spans_other_repo && touches_target {
                staled_ids.push(card.id.clone());
            }
        }
    }

    let staled_card_count = store.mark_cards_stale(&staled_ids)?;
    let doc_types: Vec<DocType> = doc_types.into_iter().collect();
    store.mark_docs_stale(request.repo, &doc_types)?;

    Ok(InvalidationResult { staled_card_count, staled_doc_types: doc_types })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_change_stales_architecture_and_rules() {
        let types = doc_types_for_category(classify_changed_file("db/schema.rb"));
        assert!(types.contains(&DocType::Architecture));
        assert!(types.contains(&DocType::Rules));
    }

    #[test]
    fn manifest_change_stales_only_readme() {
        let types = doc_types_for_category(classify_changed_file("package.json"));
        assert_eq!(types, &[DocType::Readme]);
    }

    #[test]
    fn card_touching_changed_file_is_staled() {
        let store = Store::open_in_memory().unwrap();
        let card = flowcard_store::types::Card {
            id: "c1".to_string(),
            flow: "billing".to_string(),
            title: "Billing".to_string(),
            content: "x".to_string(),
            card_type: flowcard_store::types::CardType::Flow,
            source_files: vec!["app/models/charge.rb".to_string()],
            source_repos: vec!["payments".to_string()],
            tags: vec![],
            identifiers: vec![],
            commit_sha: None,
            content_hash: "h".to_string(),
            valid_branches: None,
            specificity_score: None,
            usage_count: 0,
            stale: false,
            expires_at: None,
        };
        store.upsert_card(&card).unwrap();

        let changed = vec![ChangedFile { path: "app/models/charge.rb".to_string(), status: ChangeStatus::Modified }];
        let request = InvalidationRequest { repo: "payments", changed_files: &changed, is_merge_event: false };
        let result = invalidate(&store, &[], &request).unwrap();
        assert_eq!(result.staled_card_count, 1);
        assert!(result.staled_doc_types.contains(&DocType::About));
    }

    #[test]
    fn changelog_only_stales_on_merge_events() {
        let store = Store::open_in_memory().unwrap();
        let changed = vec![ChangedFile { path: "src/main.rs".to_string(), status: ChangeStatus::Modified }];
        let non_merge = InvalidationRequest { repo: "payments", changed_files: &changed, is_merge_event: false };
        let result = invalidate(&store, &[], &non_merge).unwrap();
        assert!(!result.staled_doc_types.contains(&DocType::Changelog));

        let merge = InvalidationRequest { repo: "payments", changed_files: &changed, is_merge_event: true };
        let result = invalidate(&store, &[], &merge).unwrap();
        assert!(result.staled_doc_types.contains(&DocType::Changelog));
    }
}
