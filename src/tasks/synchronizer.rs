use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, OptionFuture};
use tokio::select;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::AnnouncementSource;
use crate::error::{AppError, Notice};
use crate::events::{MediaUpdate, PauseReason, PlaybackCommand, ViewEvent};
use crate::media::{MediaItem, PlaylistSnapshot, RawAnnouncement, RawMediaType};

/// Turns backend announcements into playlist snapshots.
pub struct MediaSynchronizer {
    source: Arc<dyn AnnouncementSource>,
    media_dir: PathBuf,
    image_duration: Duration,
}

impl MediaSynchronizer {
    pub fn new(
        source: Arc<dyn AnnouncementSource>,
        media_dir: impl Into<PathBuf>,
        image_duration: Duration,
    ) -> Self {
        Self {
            source,
            media_dir: media_dir.into(),
            image_duration,
        }
    }

    /// Fetch and map the current announcement list.
    ///
    /// Entries with an unsupported media type, an unresolvable source or a
    /// duplicate id are dropped; only a failed list fetch is an error.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<PlaylistSnapshot, AppError> {
        let raw = self.source.fetch_announcements().await?;
        let fetched = raw.len();
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(fetched);
        for entry in raw {
            if !seen.insert(entry.id) {
                warn!(id = entry.id, "duplicate announcement id; keeping the first");
                continue;
            }
            match self.map_entry(&entry).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {
                    warn!(id = entry.id, media_type = ?entry.media_type, "skipping unsupported announcement");
                }
                Err(err) => {
                    warn!(id = entry.id, error = %err, "skipping unresolvable announcement");
                }
            }
        }
        info!(fetched, playable = items.len(), "announcements refreshed");
        Ok(items.into())
    }

    async fn map_entry(&self, raw: &RawAnnouncement) -> Result<Option<MediaItem>, AppError> {
        let id = raw.id.to_string();
        match raw.media_type {
            RawMediaType::Image => {
                let source = resolve_local_path(&self.media_dir, &raw.local_path)?;
                Ok(Some(MediaItem::image(id, source, self.image_duration)))
            }
            RawMediaType::Video => {
                let source = self.source.resolve_video(raw.announcement_id).await?;
                let duration = raw.media_duration.map(Duration::from_millis);
                Ok(Some(MediaItem::video(id, source, duration)))
            }
            RawMediaType::Unsupported => Ok(None),
        }
    }

    /// Listen for media updates and keep the playback task's playlist current.
    ///
    /// The listener performs the startup refresh immediately. Dropping the
    /// returned [`Subscription`] detaches it as well.
    pub fn subscribe(
        self: Arc<Self>,
        updates: broadcast::Receiver<MediaUpdate>,
        to_playback: Sender<PlaybackCommand>,
        to_view: Sender<ViewEvent>,
        parent: &CancellationToken,
    ) -> Subscription {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(self, updates, to_playback, to_view, cancel.clone()));
        Subscription {
            cancel,
            handle: Some(handle),
        }
    }
}

/// Map a stored `local-path` to a renderable URI. Absolute URLs pass
/// through; file paths become `file://` URIs rooted at `media_dir`.
pub fn resolve_local_path(media_dir: &Path, local_path: &str) -> Result<String, AppError> {
    if let Ok(url) = Url::parse(local_path) {
        if matches!(url.scheme(), "http" | "https" | "file") {
            return Ok(url.into());
        }
    }
    let joined = media_dir.join(local_path);
    let absolute = std::path::absolute(&joined).map_err(|err| {
        AppError::Application(format!("cannot resolve {}: {err}", joined.display()))
    })?;
    Url::from_file_path(&absolute)
        .map(Into::into)
        .map_err(|()| AppError::Application(format!("cannot resolve {}", absolute.display())))
}

/// Handle to a running update listener.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Detach from the update channel and wait for the listener to finish.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!("media update listener join error: {err}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type RefreshFuture = BoxFuture<'static, Result<PlaylistSnapshot, AppError>>;

fn start_refresh(sync: &Arc<MediaSynchronizer>) -> RefreshFuture {
    let sync = Arc::clone(sync);
    async move { sync.refresh().await }.boxed()
}

/// Update listener loop.
///
/// Rules:
/// - At most one refresh is in flight.
/// - Updates arriving mid-refresh coalesce into a single follow-up refresh.
/// - Playback is held for the whole burst and released after the last install.
/// - A failed refresh is reported as a notice and installs an empty playlist.
async fn run(
    sync: Arc<MediaSynchronizer>,
    mut updates: broadcast::Receiver<MediaUpdate>,
    to_playback: Sender<PlaybackCommand>,
    to_view: Sender<ViewEvent>,
    cancel: CancellationToken,
) {
    let mut in_flight: Option<RefreshFuture> = Some(start_refresh(&sync));
    let mut pending = false;
    let mut holding = false;
    let mut listening = true;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(result) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                in_flight = None;
                let snapshot = match result {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!(code = err.code(), error = %err, "playlist refresh failed");
                        let notice = Notice::from(&AppError::initialization());
                        if to_view.send(ViewEvent::Notice(notice)).await.is_err() {
                            debug!("view channel closed; notice dropped");
                        }
                        PlaylistSnapshot::empty()
                    }
                };
                if to_playback.send(PlaybackCommand::SetPlaylist(snapshot)).await.is_err() {
                    warn!("playback channel closed");
                    break;
                }
                if pending {
                    pending = false;
                    debug!("running coalesced refresh");
                    in_flight = Some(start_refresh(&sync));
                } else if holding {
                    holding = false;
                    if to_playback.send(PlaybackCommand::Release(PauseReason::Refreshing)).await.is_err() {
                        warn!("playback channel closed");
                        break;
                    }
                }
            }

            received = updates.recv(), if listening => {
                match received {
                    Ok(MediaUpdate) | Err(RecvError::Lagged(_)) => {
                        if !holding {
                            holding = true;
                            if to_playback.send(PlaybackCommand::Hold(PauseReason::Refreshing)).await.is_err() {
                                warn!("playback channel closed");
                                break;
                            }
                        }
                        if in_flight.is_some() {
                            pending = true;
                            debug!("media update coalesced into pending refresh");
                        } else {
                            info!("media update received; refreshing");
                            in_flight = Some(start_refresh(&sync));
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("media update channel closed");
                        listening = false;
                    }
                }
            }
        }
    }

    if holding
        && to_playback
            .send(PlaybackCommand::Release(PauseReason::Refreshing))
            .await
            .is_err()
    {
        debug!("playback channel closed; refresh hold not released");
    }
}
