//! Reindex command - queue a full reindex, or check on one already running

use anyhow::Result;
use clap::{Args, Subcommand};
use flowcard_orchestrator::{OrchestratorConfig, RunOutcome};

use super::Runtime;
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Reindex commands
#[derive(Subcommand, Debug)]
pub enum ReindexCommand {
    /// Reindex stale cards for one repo, or the whole workspace
    Stale(StaleArgs),

    /// Report how many cards are currently marked stale
    Status(StatusArgs),
}

/// Arguments for the stale command
#[derive(Args, Debug)]
pub struct StaleArgs {
    /// Limit reindexing to one registered repo
    #[arg(long)]
    repo: Option<String>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the reindex command
pub async fn execute(cmd: ReindexCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ReindexCommand::Stale(args) => execute_stale(args, global).await,
        ReindexCommand::Status(args) => execute_status(args, global).await,
    }
}

async fn execute_stale(args: StaleArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;
    let targets = runtime.repo_targets(args.repo.as_deref());

    if targets.is_empty() {
        anyhow::bail!("No repos to reindex (unknown repo: {:?})", args.repo);
    }

    let stale_count = runtime.store.fetch_all_cards()?.iter().filter(|c| c.stale).count();

    let pb = spinner(&format!("Reindexing ({} stale card(s))...", stale_count), global.quiet);
    let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: true };
    match runtime.orchestrator.run(&run_config).await {
        Ok(RunOutcome::Completed(summary)) => {
            finish_spinner(pb, &format!("Reindexed {} repo(s), {} cards generated", summary.repos_indexed, summary.cards_generated));
        }
        Ok(RunOutcome::Queued) => {
            finish_spinner_warn(pb, "A reindex is already running; this run was skipped");
        }
        Err(e) => {
            finish_spinner_warn(pb, "Reindexing failed");
            return Err(e.into());
        }
    }

    Ok(())
}

async fn execute_status(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;
    let cards = runtime.store.fetch_all_cards()?;
    let stale_count = cards.iter().filter(|c| c.stale).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "totalCards": cards.len(), "staleCount": stale_count }))?);
        return Ok(());
    }

    println!("Total cards: {}", cards.len());
    println!("Stale cards: {}", stale_count);

    Ok(())
}
