//! Repos command - register, unregister, and list repos in this workspace

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use flowcard_config::{ConfigLoader, RepoRef};
use flowcard_orchestrator::{OrchestratorConfig, RunOutcome};

use super::{resolve_workspace, Runtime};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Repo management commands
#[derive(Subcommand, Debug)]
pub enum ReposCommand {
    /// Register an additional repo, then reindex it
    Register(RegisterArgs),

    /// Remove a previously-registered repo (its cards are left in place)
    Unregister(UnregisterArgs),

    /// List every repo registered in this workspace
    List(ListArgs),
}

/// Arguments for the register command
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Short name used to refer to the repo elsewhere
    name: String,

    /// Absolute path to the repo's working tree
    path: PathBuf,
}

/// Arguments for the unregister command
#[derive(Args, Debug)]
pub struct UnregisterArgs {
    /// Name previously passed to repos.register
    name: String,
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the repos command
pub async fn execute(cmd: ReposCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ReposCommand::Register(args) => execute_register(args, global).await,
        ReposCommand::Unregister(args) => execute_unregister(args, global).await,
        ReposCommand::List(args) => execute_list(args, global).await,
    }
}

async fn execute_register(args: RegisterArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let loader = ConfigLoader::new();

    let mut config = loader.load_local(&workspace_path)?.unwrap_or_default();
    config.workspace.extra_repos.retain(|r| r.name != args.name);
    config.workspace.extra_repos.push(RepoRef { name: args.name.clone(), path: args.path.clone() });
    loader.save_local(&workspace_path, &config).context("Failed to save local config")?;

    let runtime = Runtime::open(&global)?;
    let targets = runtime.repo_targets(Some(&args.name));

    let pb = spinner(&format!("Reindexing {}...", args.name), global.quiet);
    let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: true };
    match runtime.orchestrator.run(&run_config).await {
        Ok(RunOutcome::Completed(summary)) => finish_spinner(pb, &format!("Registered {} ({} cards generated)", args.name, summary.cards_generated)),
        Ok(RunOutcome::Queued) => finish_spinner_warn(pb, "Registered, but another indexing run is in progress - reindex later"),
        Err(e) => {
            finish_spinner_warn(pb, "Registered, but reindexing failed");
            return Err(e.into());
        }
    }

    Ok(())
}

async fn execute_unregister(args: UnregisterArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let loader = ConfigLoader::new();

    let mut config = loader.load_local(&workspace_path)?.unwrap_or_default();
    let before = config.workspace.extra_repos.len();
    config.workspace.extra_repos.retain(|r| r.name != args.name);
    let removed = config.workspace.extra_repos.len() < before;
    loader.save_local(&workspace_path, &config).context("Failed to save local config")?;

    if removed {
        println!("Unregistered {}", args.name);
    } else {
        println!("{} was not registered", args.name);
    }

    Ok(())
}

async fn execute_list(args: ListArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;
    let targets = runtime.repo_targets(None);

    if args.json {
        let repos: Vec<_> = targets.iter().map(|r| serde_json::json!({ "name": r.name, "path": r.path })).collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "repos": repos }))?);
        return Ok(());
    }

    println!("Registered Repos");
    println!("=================\n");
    for repo in &targets {
        println!("{:<20} {}", repo.name, repo.path.display());
    }

    Ok(())
}
