//! Git-derived signals: thermal map, stale directories, branch
//! classification, workspace epic detection.
//!
//! Every git invocation degrades to an empty result on failure (missing
//! binary, non-git directory, offline remote) rather than propagating an
//! error — indexing must continue with whatever signal is available.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::warn;

const THERMAL_WINDOW: &str = "180.days.ago";
const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct ThermalMap {
    /// path -> normalised commit frequency in [0, 1]
    pub heat: HashMap<PathBuf, f64>,
}

impl ThermalMap {
    pub fn score(&self, path: &Path) -> f64 {
        self.heat.get(path).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchClass {
    Base,
    Environment,
    Feature,
}

#[derive(Debug, Clone)]
pub struct BranchDiffContext {
    pub branch: String,
    pub base_branch: String,
    pub commits_ahead: usize,
    pub changed_files: Vec<PathBuf>,
    pub ticket_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceEpic {
    pub branch: Option<String>,
    pub repos_on_epic: Vec<String>,
    pub repos_behind: Vec<String>,
}

fn run_git(repo_root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(repo_root).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn is_git_repo(repo_root: &Path) -> bool {
    repo_root.join(".git").exists()
}

/// One `git log --since --name-only` pass per repo, folded into a
/// normalised per-file heat score.
pub fn thermal_map(repo_root: &Path) -> ThermalMap {
    if !is_git_repo(repo_root) {
        return ThermalMap::default();
    }
    let Some(output) = run_git(
        repo_root,
        &["log", &format!("--since={THERMAL_WINDOW}"), "--name-only", "--pretty=format:"],
    ) else {
        warn!(repo = %repo_root.display(), "git log failed, thermal map empty");
        return ThermalMap::default();
    };

    let mut counts: HashMap<PathBuf, u64> = HashMap::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        *counts.entry(PathBuf::from(line)).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0).max(1) as f64;
    ThermalMap {
        heat: counts.into_iter().map(|(path, count)| (path, count as f64 / max)).collect(),
    }
}

/// Top-level directories present in the repo but absent from the thermal
/// map (zero commits in the window).
pub fn stale_directories(repo_root: &Path, thermal: &ThermalMap) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(repo_root) else {
        return Vec::new();
    };
    let mut stale = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || path.file_name().map(|n| n.to_string_lossy().starts_with('.')).unwrap_or(false) {
            continue;
        }
        let rel = PathBuf::from(path.file_name().unwrap());
        let has_heat = thermal.heat.keys().any(|p| p.starts_with(&rel));
        if !has_heat {
            stale.push(rel);
        }
    }
    stale
}

pub fn classify_branch(name: &str) -> BranchClass {
    const BASE: &[&str] = &["main", "master", "develop", "trunk"];
    const ENV_PATTERNS: &[&str] = &["demo", "staging", "production", "release"];
    let lower = name.to_lowercase();
    if BASE.contains(&lower.as_str()) {
        BranchClass::Base
    } else if ENV_PATTERNS.iter().any(|p| lower.contains(p)) {
        BranchClass::Environment
    } else {
        BranchClass::Feature
    }
}

fn extract_ticket_ids(text: &str) -> Vec<String> {
    use regex::Regex;
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[A-Z]{2,}-\d+").unwrap());
    let mut ids: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
    ids.sort();
    ids.dedup();
    ids
}

pub fn current_branch(repo_root: &Path) -> Option<String> {
    run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"]).map(|s| s.trim().to_string())
}

/// Builds the diff context for the current branch against the repo's base
/// branch (the first of `main`/`master`/`develop`/`trunk` that exists).
pub fn branch_diff_context(repo_root: &Path) -> Option<BranchDiffContext> {
    if !is_git_repo(repo_root) {
        return None;
    }
    let branch = current_branch(repo_root)?;
    if classify_branch(&branch) == BranchClass::Base {
        return None;
    }
    let base_branch = ["main", "master", "develop", "trunk"]
        .into_iter()
        .find(|b| run_git(repo_root, &["rev-parse", "--verify", b]).is_some())?
        .to_string();

    let commits_ahead = run_git(repo_root, &["rev-list", "--count", &format!("{base_branch}..{branch}")])
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);

    let changed_files = run_git(repo_root, &["diff", "--name-only", &format!("{base_branch}...{branch}")])
        .map(|s| s.lines().map(PathBuf::from).collect())
        .unwrap_or_default();

    let log_subjects = run_git(repo_root, &["log", "--pretty=format:%s", &format!("{base_branch}..{branch}")]).unwrap_or_default();
    let mut ticket_ids = extract_ticket_ids(&branch);
    ticket_ids.extend(extract_ticket_ids(&log_subjects));
    ticket_ids.sort();
    ticket_ids.dedup();

    Some(BranchDiffContext { branch, base_branch, commits_ahead, changed_files, ticket_ids })
}

/// The dominant non-base branch shared by two or more repos is the
/// workspace epic; repos still on a base branch while an epic exists are
/// reported as behind.
pub fn workspace_epic(repo_branches: &[(String, String)]) -> WorkspaceEpic {
    let mut counts: HashMap<&str, Vec<&str>> = HashMap::new();
    for (repo, branch) in repo_branches {
        if classify_branch(branch) != BranchClass::Base {
            counts.entry(branch.as_str()).or_default().push(repo.as_str());
        }
    }
    let Some((epic_branch, repos_on_epic)) = counts.into_iter().filter(|(_, repos)| repos.len() >= 2).max_by_key(|(_, repos)| repos.len())
    else {
        return WorkspaceEpic::default();
    };

    let repos_behind: Vec<String> = repo_branches
        .iter()
        .filter(|(repo, branch)| classify_branch(branch) == BranchClass::Base && !repos_on_epic.contains(&repo.as_str()))
        .map(|(repo, _)| repo.clone())
        .collect();

    WorkspaceEpic {
        branch: Some(epic_branch.to_string()),
        repos_on_epic: repos_on_epic.into_iter().map(String::from).collect(),
        repos_behind,
    }
}

/// Opt-in, time-boxed remote fetch; failures are swallowed.
pub fn fetch_remote(repo_root: &Path, allow_remote: bool) {
    if !allow_remote || !is_git_repo(repo_root) {
        return;
    }
    let mut child = match Command::new("git").args(["fetch", "--quiet"]).current_dir(repo_root).spawn() {
        Ok(c) => c,
        Err(_) => return,
    };
    let start = std::time::Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) if start.elapsed() >= REMOTE_FETCH_TIMEOUT => {
                let _ = child.kill();
                warn!(repo = %repo_root.display(), "git fetch timed out");
                return;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_base_branches() {
        assert_eq!(classify_branch("main"), BranchClass::Base);
        assert_eq!(classify_branch("staging-2"), BranchClass::Environment);
        assert_eq!(classify_branch("feature/billing"), BranchClass::Feature);
    }

    #[test]
    fn non_git_directory_degrades_to_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = thermal_map(dir.path());
        assert!(map.heat.is_empty());
    }

    #[test]
    fn workspace_epic_requires_two_repos() {
        let branches = vec![
            ("payments".to_string(), "feature/refund".to_string()),
            ("onboarding".to_string(), "feature/refund".to_string()),
            ("billing".to_string(), "main".to_string()),
        ];
        let epic = workspace_epic(&branches);
        assert_eq!(epic.branch.as_deref(), Some("feature/refund"));
        assert_eq!(epic.repos_behind, vec!["billing".to_string()]);
    }

    #[test]
    fn extracts_ticket_ids_from_branch_name() {
        let ids = extract_ticket_ids("feature/ABC-123-refund-flow");
        assert_eq!(ids, vec!["ABC-123".to_string()]);
    }
}
