//! Run command - poll the feed and relay new posts

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use skyrelay_domain::TickOutcome;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use super::{Output, build_relay};
use crate::args::RunArgs;
use crate::config::AppConfig;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let output = match (args.dry_run, args.outbox) {
        (true, _) => Output::Console,
        (false, Some(path)) => Output::Outbox(path),
        (false, None) => Output::Discord,
    };

    tracing::info!(
        output = ?output,
        once = args.once,
        source = config.feed.source.as_str(),
        interval_secs = config.poll.interval_secs,
        "Starting skyrelay run"
    );

    let relay = build_relay(&config, &output).await?;

    if args.once {
        tracing::info!("Running single poll cycle");
        if let Some(TickOutcome::Skipped { reason }) = relay.tick_logged().await {
            eprintln!("{}", reason);
        }
        return Ok(());
    }

    // Setup runs in another process, so watch the file it writes
    let (_watcher, changes) = watch_config_file(&config.general.config_json_path)?;

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    relay.run(shutdown, Some(changes)).await;

    tracing::info!("skyrelay run completed");
    Ok(())
}

/// Signal on `()` whenever the config file is created, rewritten or replaced
fn watch_config_file(path: &Path) -> Result<(RecommendedWatcher, mpsc::Receiver<()>)> {
    let (tx, rx) = mpsc::channel(1);
    let file_name = path.file_name().map(|name| name.to_os_string());

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if !(event.kind.is_create() || event.kind.is_modify()) {
                    return;
                }
                let touches_config = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == file_name.as_deref());
                if touches_config {
                    // A full channel already holds a pending reload
                    let _ = tx.try_send(());
                }
            }
            Err(error) => tracing::warn!(error = %error, "Config watcher error"),
        }
    })
    .context("Failed to create config file watcher")?;

    // The store replaces the file by rename, so watch the directory
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    tracing::debug!(path = %path.display(), "Watching config file");
    Ok((watcher, rx))
}
