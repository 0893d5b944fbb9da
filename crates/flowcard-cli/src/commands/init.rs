//! Init and index commands - create a workspace and (re)build its cards

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use flowcard_config::ConfigLoader;
use flowcard_orchestrator::{OrchestratorConfig, RunOutcome};

use super::{print_info, Runtime};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to initialize (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Skip indexing after creating the workspace config
    #[arg(long)]
    no_index: bool,
}

/// Arguments for the index command
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Limit indexing to one registered repo
    #[arg(long)]
    repo: Option<String>,

    /// Regenerate project docs even where one already exists
    #[arg(long)]
    force_docs: bool,
}

/// Execute the init command
pub async fn execute(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = if args.path.is_absolute() { args.path.clone() } else { std::env::current_dir()?.join(&args.path) };

    std::fs::create_dir_all(&workspace_path).context("Failed to create workspace directory")?;
    let workspace_path = workspace_path.canonicalize().context("Failed to resolve workspace path")?;

    print_info(&format!("Initializing flowcard workspace at {}", workspace_path.display()), global.quiet);

    let loader = ConfigLoader::new();
    let config_path = loader.init_local(&workspace_path).context("Failed to write local config")?;
    print_info(&format!("Created {}", config_path.display()), global.quiet);

    if !args.no_index {
        execute_index(IndexArgs { repo: None, force_docs: false }, global).await?;
    } else if !global.quiet {
        println!("\nWorkspace initialized. Run 'flowcard index' when you're ready to build the card index.");
    }

    Ok(())
}

/// Execute the index command
pub async fn execute_index(args: IndexArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;
    let targets = runtime.repo_targets(args.repo.as_deref());

    if targets.is_empty() {
        anyhow::bail!("No repos to index (unknown repo: {:?})", args.repo);
    }

    let pb = spinner("Indexing repos...", global.quiet);

    let run_config = OrchestratorConfig { repos: targets, skip_existing_docs: !args.force_docs };
    match runtime.orchestrator.run(&run_config).await {
        Ok(RunOutcome::Completed(summary)) => {
            finish_spinner(
                pb,
                &format!(
                    "Indexed {} repo{} ({} files parsed, {} cards, {} docs generated, {} docs skipped)",
                    summary.repos_indexed,
                    if summary.repos_indexed == 1 { "" } else { "s" },
                    summary.files_parsed,
                    summary.cards_generated,
                    summary.docs_generated,
                    summary.docs_skipped,
                ),
            );

            if global.verbose && !global.quiet {
                println!("  Unreadable files:   {}", summary.unreadable_files);
                println!("  Unparseable files:  {}", summary.unparseable_files);
            }
        }
        Ok(RunOutcome::Queued) => {
            finish_spinner_warn(pb, "Another indexing run is already in progress; this run was skipped");
        }
        Err(e) => {
            finish_spinner_warn(pb, "Indexing failed");
            anyhow::bail!(e);
        }
    }

    Ok(())
}
