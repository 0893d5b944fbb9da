//! Health command - store liveness and card/flow counts

use anyhow::Result;
use clap::Args;

use super::Runtime;
use crate::GlobalOptions;

/// Arguments for the health command
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the health command
pub async fn execute(args: HealthArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;

    let cards = runtime.store.fetch_all_cards()?;
    let stale = cards.iter().filter(|c| c.stale).count();
    let flows: std::collections::HashSet<&str> = cards.iter().filter(|c| !c.stale).map(|c| c.flow.as_str()).collect();

    if args.json {
        let status = serde_json::json!({
            "status": "ok",
            "workspaceRoot": runtime.workspace,
            "cards": cards.len(),
            "staleCards": stale,
            "flows": flows.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Flowcard Workspace Health");
    println!("=========================\n");
    println!("Workspace: {}", runtime.workspace.display());
    println!("Status:    ok");
    println!("Cards:     {} ({} stale)", cards.len(), stale);
    println!("Flows:     {}", flows.len());

    Ok(())
}
