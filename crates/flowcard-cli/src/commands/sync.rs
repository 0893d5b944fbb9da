//! Sync command - report changed files so stale cards/docs are invalidated

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use flowcard_orchestrator::{ChangeStatus, ChangedFile, InvalidationRequest, OrchestratorConfig};
use serde::Deserialize;

use super::Runtime;
use crate::GlobalOptions;

/// A single changed file, as read from `--changes-file`.
#[derive(Debug, Deserialize)]
struct ChangedFileEntry {
    path: String,
    status: String,
}

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Name of the repo the changes belong to
    repo: String,

    /// JSON file with an array of {"path", "status"} entries
    #[arg(long)]
    changes_file: PathBuf,

    /// "save", "merge", "pull", or "rebase"
    #[arg(long, default_value = "save")]
    event_type: String,

    /// Branch the changes are on
    #[arg(long)]
    branch: Option<String>,
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;

    let raw = std::fs::read_to_string(&args.changes_file).with_context(|| format!("Failed to read {}", args.changes_file.display()))?;
    let entries: Vec<ChangedFileEntry> = serde_json::from_str(&raw).context("Failed to parse changes file")?;

    let changed: Vec<ChangedFile> = entries
        .into_iter()
        .map(|e| ChangedFile {
            path: e.path,
            status: match e.status.as_str() {
                "added" => ChangeStatus::Added,
                "deleted" => ChangeStatus::Deleted,
                _ => ChangeStatus::Modified,
            },
        })
        .collect();

    let is_merge_event = matches!(args.event_type.as_str(), "merge" | "pull");
    let request = InvalidationRequest { repo: &args.repo, changed_files: &changed, is_merge_event };

    let result = runtime.orchestrator.invalidate_repo(&request)?;

    if !global.quiet {
        println!("Invalidated {} card(s)", result.staled_card_count);
        if !result.staled_doc_types.is_empty() {
            println!("Staled docs: {}", result.staled_doc_types.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", "));
        }
    }

    if is_merge_event {
        let targets = runtime.repo_targets(Some(&args.repo));
        if !targets.is_empty() {
            let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: false };
            if !global.quiet {
                println!("Running scoped reindex of {} after {}", args.repo, args.event_type);
            }
            runtime.orchestrator.run(&run_config).await?;
        }
    }

    Ok(())
}
