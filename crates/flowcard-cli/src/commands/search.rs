//! Search command - hybrid lexical + dense card retrieval

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use flowcard_retrieval::hybrid::SearchOptions;

use super::Runtime;
use crate::GlobalOptions;

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    query: String,

    /// Maximum number of cards to return
    #[arg(long, short = 'n', default_value = "5")]
    limit: usize,

    /// Restrict to cards valid on this branch
    #[arg(long)]
    branch: Option<String>,

    /// Output format: text (default), json
    #[arg(long, short = 'o', default_value = "text")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Execute the search command
pub async fn execute(args: SearchArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;

    let options = SearchOptions { limit: args.limit, branch: args.branch.clone(), semantic_query: None };
    let result = runtime.retriever.search(&args.query, options).await.context("Search failed")?;

    if result.cards.is_empty() {
        if !global.quiet {
            eprintln!("No cards found for: {}", args.query);
        }
        return Ok(());
    }

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result.cards).context("Failed to serialize results")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            if !global.quiet {
                let cache_note = if result.cache_hit { " (cache hit)" } else if result.reranked { " (reranked)" } else { "" };
                println!("Found {} card(s) for \"{}\"{}:\n", result.cards.len(), args.query, cache_note);
            }

            for (i, scored) in result.cards.iter().enumerate() {
                let card = &scored.card;
                println!("{}. {} [{}]", i + 1, card.title, card.card_type.as_str());
                println!("   flow: {}  score: {:.3}  source: {}", card.flow, scored.score, scored.source.as_str());
                if !card.source_files.is_empty() {
                    println!("   files: {}", card.source_files.join(", "));
                }
                println!();
            }
        }
    }

    Ok(())
}
