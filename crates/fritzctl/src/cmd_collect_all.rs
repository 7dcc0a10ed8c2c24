use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tr064::Tr064Client;
use tracing::info;

use crate::common::GatewayArgs;

/// Invoke every get-only action of the gateway and dump the results as JSON.
pub async fn run(args: &GatewayArgs, result_file: Option<PathBuf>) -> Result<()> {
    let mut client = Tr064Client::connect(&args.gateway_upnp_url, args.credentials())
        .await
        .with_context(|| format!("connect to {}", args.gateway_upnp_url))?;
    let entries = tr064::collect_all(&mut client).await.context("collect all actions")?;
    let failed = entries.iter().filter(|e| e.error().is_some()).count();
    info!(actions = entries.len(), failed, "survey finished");

    let text = tr064::render(&entries).context("serialise survey")?;
    println!("{text}");
    if let Some(path) = result_file {
        fs::write(&path, &text).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "survey written");
    }
    Ok(())
}
