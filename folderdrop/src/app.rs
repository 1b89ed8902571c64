use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::anyhow;
use raindrop_core::RaindropClient;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::config::{
    ConfigError, MountDefinitions, default_config_path, load_config_file, merge_mounts,
    parse_mount_args, read_token_env, resolve_mounts,
};
use crate::sync::backoff::RetryPolicy;
use crate::sync::cache::LookupCache;
use crate::sync::{RunSummary, SyncOptions, SyncOrchestrator};

/// Loads configuration, syncs every mount and prints the statistics.
/// Mount failures are part of the returned summary; only configuration and
/// setup problems are returned as errors.
pub async fn run(cli: Cli, mount_args: Vec<String>) -> anyhow::Result<RunSummary> {
    let cli_mounts = parse_mount_args(mount_args)?;
    let file_mounts = load_file_mounts(&cli).await?;
    let definitions = merge_mounts(file_mounts, cli_mounts);
    if definitions.is_empty() {
        return Err(ConfigError::NoMounts.into());
    }

    let token = read_token_env()?;
    let client = match cli.base_url.as_deref() {
        Some(base_url) => RaindropClient::with_base_url(base_url, token)?,
        None => RaindropClient::new(token)?,
    };
    debug!(base_url = %client.base_url(), "client ready");

    let mounts = resolve_mounts(&client, definitions).await?;
    info!(mounts = mounts.len(), dry_run = cli.dry_run, "configuration checked");

    let options = SyncOptions {
        page_size: cli.page_size,
        dry_run: cli.dry_run,
        fail_fast: cli.fail_fast,
        retry: RetryPolicy::default().with_attempts(cli.max_attempts),
        ..SyncOptions::default()
    };
    let mut orchestrator = SyncOrchestrator::new(client, options);
    let summary = orchestrator.run_all(&mounts).await;

    for (name, stats) in &summary.mounts {
        println!("Mount {name}: {stats}");
    }
    for failure in &summary.failures {
        eprintln!(
            "Mount {} failed ({}): {}",
            failure.mount,
            failure.error.kind(),
            failure.error
        );
    }
    println!("Run: {}", summary.total);

    if let Some(path) = &cli.cache_report {
        write_cache_report(orchestrator.cache(), path)?;
        info!(path = %path.display(), "cache report written");
    }
    Ok(summary)
}

async fn load_file_mounts(cli: &Cli) -> Result<MountDefinitions, ConfigError> {
    if let Some(path) = &cli.config_file {
        return load_config_file(path).await;
    }
    match default_config_path() {
        Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
            load_config_file(&path).await
        }
        _ => Ok(MountDefinitions::new()),
    }
}

fn write_cache_report(cache: &LookupCache, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .map_err(|err| anyhow!("failed to create cache report {}: {err}", path.display()))?;
    let mut out = BufWriter::new(file);
    cache
        .write_report(&mut out)
        .and_then(|()| out.flush())
        .map_err(|err| anyhow!("failed to write cache report {}: {err}", path.display()))
}
