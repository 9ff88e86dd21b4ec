//! Bootstrap command - creates the first workspace and root key

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};

use crate::config::{AppConfig, StorageBackend};
use crate::infrastructure::context::GatewayContext;
use crate::infrastructure::workspace::BootstrapService;

#[derive(Debug, Clone, Args)]
pub struct BootstrapArgs {
    /// Name of the workspace to create
    #[arg(long)]
    pub workspace: String,

    /// Name of the API to create in the workspace
    #[arg(long)]
    pub api: String,
}

/// Create the workspace and print the plaintext root key once
pub async fn run(config: &AppConfig, args: BootstrapArgs) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackend::Memory {
        warn!("Bootstrapping into in-memory storage; nothing will outlive this process");
    }

    let context = GatewayContext::from_config(config)
        .await
        .context("failed to open storage")?;

    let result = BootstrapService::new(&context)
        .bootstrap(&args.workspace, &args.api)
        .await
        .context("bootstrap failed")?;

    info!(
        "Bootstrapped workspace: workspace_id={}, api_id={}, root_key_id={}",
        result.workspace_id, result.api_id, result.root_key_id
    );

    println!("workspace_id: {}", result.workspace_id);
    println!("api_id:       {}", result.api_id);
    println!("root_key_id:  {}", result.root_key_id);
    println!("root_key:     {}", result.root_key);
    println!();
    println!("Store the root key now. It cannot be shown again.");

    Ok(())
}
