//! Binary entrypoint for the signage client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use signage_client::backend::{AnnouncementSource, HttpAnnouncementApi};
use signage_client::config::Configuration;
use signage_client::events::{MediaUpdate, PlaybackCommand, ViewEvent};
use signage_client::tasks::synchronizer::MediaSynchronizer;
use signage_client::tasks::{scheduler, viewer};

#[derive(Debug, Parser)]
#[command(
    name = "signage",
    version,
    about = "Digital signage playback client"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args { config } = Args::parse();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::info!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let source: Arc<dyn AnnouncementSource> =
        Arc::new(HttpAnnouncementApi::new(&cfg.backend).context("failed to set up backend")?);
    let synchronizer = Arc::new(MediaSynchronizer::new(
        source,
        cfg.media_dir.clone(),
        cfg.playback.image_duration,
    ));

    // Channels (small/bounded)
    let (playback_tx, playback_rx) = mpsc::channel::<PlaybackCommand>(32); // Control/Sync -> Playback
    let (view_tx, view_rx) = mpsc::channel::<ViewEvent>(16); // Playback/Sync -> View
    let (updates_tx, _) = broadcast::channel::<MediaUpdate>(8); // Control -> Sync

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    // Playback
    tasks.spawn({
        let view_tx = view_tx.clone();
        let cancel = cancel.clone();
        let options = cfg.playback.clone();
        async move {
            scheduler::run(playback_rx, view_tx, cancel, options)
                .await
                .context("playback task failed")
        }
    });

    // View
    tasks.spawn({
        let cancel = cancel.clone();
        let placeholder = cfg.placeholder_image.clone();
        async move {
            viewer::run(view_rx, cancel, &placeholder)
                .await
                .context("view task failed")
        }
    });

    // Control socket
    #[cfg(unix)]
    tasks.spawn({
        let socket_path = cfg.control_socket_path.clone();
        let updates_tx = updates_tx.clone();
        let playback_tx = playback_tx.clone();
        let cancel = cancel.clone();
        async move {
            signage_client::tasks::control::run(socket_path, updates_tx, playback_tx, cancel)
                .await
                .context("control task failed")
        }
    });

    // Startup refresh + media update listener, then start the carousel.
    let subscription = synchronizer.subscribe(
        updates_tx.subscribe(),
        playback_tx.clone(),
        view_tx.clone(),
        &cancel,
    );
    playback_tx
        .send(PlaybackCommand::Start)
        .await
        .context("playback task exited before start")?;
    drop(view_tx);

    // Any task ending early takes the rest down with it.
    tokio::select! {
        _ = cancel.cancelled() => {}
        Some(res) = tasks.join_next() => {
            log_task_result(res);
            cancel.cancel();
        }
    }

    subscription.unsubscribe().await;
    drop(playback_tx);

    // Drain JoinSet (wait for other tasks to complete)
    while let Some(res) = tasks.join_next().await {
        log_task_result(res);
    }

    Ok(())
}

fn log_task_result(res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("task error: {e:?}"),
        Err(e) => tracing::error!("join error: {e}"),
    }
}
