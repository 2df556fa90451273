use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::select;
use tokio::sync::broadcast;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::events::{MediaUpdate, PauseReason, PlaybackCommand};
use crate::media::MediaId;

/// One JSON object per line, e.g. `{"command":"network","connected":false}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    /// The backend announced a changed media list.
    MediaUpdated,
    SettingsOpen,
    SettingsClosed,
    Network {
        connected: bool,
    },
    /// The renderer finished a video.
    VideoEnded {
        #[serde(default)]
        id: Option<String>,
    },
    Next,
    Pause,
    Resume,
}

#[derive(Debug, Clone)]
pub enum Route {
    Update(MediaUpdate),
    Playback(PlaybackCommand),
}

impl ControlCommand {
    pub fn route(self) -> Route {
        let playback = match self {
            Self::MediaUpdated => return Route::Update(MediaUpdate),
            Self::SettingsOpen => PlaybackCommand::Hold(PauseReason::SettingsOpen),
            Self::SettingsClosed => PlaybackCommand::Release(PauseReason::SettingsOpen),
            Self::Network { connected: false } => PlaybackCommand::Hold(PauseReason::NetworkLost),
            Self::Network { connected: true } => {
                PlaybackCommand::Release(PauseReason::NetworkLost)
            }
            Self::VideoEnded { id } => PlaybackCommand::VideoEnded(id.map(MediaId::new)),
            Self::Next => PlaybackCommand::Skip,
            Self::Pause => PlaybackCommand::Hold(PauseReason::Manual),
            Self::Resume => PlaybackCommand::Release(PauseReason::Manual),
        };
        Route::Playback(playback)
    }
}

#[instrument(skip_all, fields(socket = %socket_path.display()))]
pub async fn run(
    socket_path: PathBuf,
    updates: broadcast::Sender<MediaUpdate>,
    to_playback: Sender<PlaybackCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(&socket_path)?;
    info!("control socket listening");

    loop {
        select! {
            _ = cancel.cancelled() => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let updates = updates.clone();
                        let to_playback = to_playback.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_client(stream, updates, to_playback, cancel).await {
                                warn!("control client failed: {err:?}");
                            }
                        });
                    }
                    Err(err) => warn!("control socket accept failed: {err}"),
                }
            }
        }
    }

    if let Err(err) = std::fs::remove_file(&socket_path) {
        debug!("failed to remove control socket: {err}");
    }
    Ok(())
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match std::fs::remove_file(socket_path) {
        Ok(()) => debug!("removed stale control socket"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to remove stale socket {}", socket_path.display())
            });
        }
    }
    UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind control socket {}", socket_path.display()))
}

async fn serve_client(
    stream: UnixStream,
    updates: broadcast::Sender<MediaUpdate>,
    to_playback: Sender<PlaybackCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read control command")?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command: ControlCommand = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(err) => {
                warn!(%line, "ignoring malformed control command: {err}");
                continue;
            }
        };
        info!(?command, "control command");
        match command.route() {
            Route::Update(update) => {
                if updates.send(update).is_err() {
                    debug!("no media update subscribers");
                }
            }
            Route::Playback(cmd) => to_playback
                .send(cmd)
                .await
                .context("playback channel closed")?,
        }
    }
    Ok(())
}
