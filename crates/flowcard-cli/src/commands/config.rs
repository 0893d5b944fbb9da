//! Config command - read and write workspace settings
//!
//! Settings live in the store's key-value table, seeded on first run from
//! the merged file config (global -> local -> CLI overrides). After that
//! the store is authoritative; `put` writes straight to it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use flowcard_config::ConfigLoader;
use flowcard_store::types::config_keys;
use serde::Serialize;

use super::{resolve_workspace, Runtime};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Read a setting, or every recognised setting when key is omitted
    Get(GetArgs),

    /// Write a setting
    Put(PutArgs),

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the get command
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Settings key, e.g. "max_hub_cards"; omit to fetch all keys
    key: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the put command
#[derive(clap::Args, Debug)]
pub struct PutArgs {
    /// Settings key to write
    key: String,

    /// Value to store
    value: String,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    pub global: Option<PathBuf>,
    pub local: PathBuf,
    pub global_exists: bool,
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Get(args) => execute_get(args, global).await,
        ConfigCommand::Put(args) => execute_put(args, global).await,
        ConfigCommand::Path(args) => execute_path(args, global).await,
    }
}

async fn execute_get(args: GetArgs, global: GlobalOptions) -> Result<()> {
    let runtime = Runtime::open(&global)?;

    if let Some(key) = args.key {
        let value = runtime.store.get_config(&key)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "key": key, "value": value }))?);
        } else {
            match value {
                Some(v) => println!("{}", v),
                None => println!("(unset)"),
            }
        }
        return Ok(());
    }

    let all = runtime.store.all_config()?;
    if args.json {
        let map: std::collections::HashMap<_, _> = all.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (key, value) in all {
            println!("{} = {}", key, value);
        }
    }

    Ok(())
}

async fn execute_put(args: PutArgs, global: GlobalOptions) -> Result<()> {
    if !config_keys::RECOGNISED.contains(&args.key.as_str()) {
        anyhow::bail!("Unrecognised config key: {}", args.key);
    }

    let runtime = Runtime::open(&global)?;
    runtime.store.set_config(&args.key, &args.value).context("Failed to write setting")?;
    println!("Set {} = {}", args.key, args.value);

    Ok(())
}

async fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let workspace_path = resolve_workspace(&global)?;
    let loader = ConfigLoader::new();

    let global_path = loader.global_config_path();
    let local_path = loader.local_config_path(&workspace_path);

    let paths = ConfigPaths {
        global: global_path.clone(),
        local: local_path.clone(),
        global_exists: global_path.as_ref().map(|p| p.exists()).unwrap_or(false),
        local_exists: local_path.exists(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
    } else {
        println!("Configuration Paths");
        println!("===================\n");

        if let Some(ref gp) = paths.global {
            let status = if paths.global_exists { "exists" } else { "not found" };
            println!("Global: {} ({})", gp.display(), status);
        } else {
            println!("Global: not available (no home directory)");
        }

        let status = if paths.local_exists { "exists" } else { "not found" };
        println!("Local:  {} ({})", paths.local.display(), status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths_serialization() {
        let paths = ConfigPaths {
            global: Some(PathBuf::from("/home/user/.flowcard/config.toml")),
            local: PathBuf::from("/project/.flowcard/config.toml"),
            global_exists: true,
            local_exists: false,
        };

        let json = serde_json::to_string(&paths).unwrap();
        assert!(json.contains("\"global_exists\":true"));
        assert!(json.contains("\"local_exists\":false"));
    }

    #[test]
    fn test_recognised_keys_reject_unknown() {
        assert!(!config_keys::RECOGNISED.contains(&"totally_unknown_key"));
        assert!(config_keys::RECOGNISED.contains(&"max_hub_cards"));
    }
}
