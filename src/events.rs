use crate::error::Notice;
use crate::media::{MediaId, MediaItem, PlaylistSnapshot};

/// Server-initiated signal that the announcement list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaUpdate;

/// Why playback is held. Playback resumes only once every reason is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PauseReason {
    NetworkLost,
    SettingsOpen,
    Refreshing,
    Manual,
}

/// Inputs to the playback task.
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    SetPlaylist(PlaylistSnapshot),
    Start,
    Stop,
    Hold(PauseReason),
    Release(PauseReason),
    Skip,
    /// Native end-of-playback reported by the renderer, tagged with the item
    /// it was playing when known.
    VideoEnded(Option<MediaId>),
}

/// Emitted by the playback task whenever the visible item may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackUpdate {
    pub index: Option<usize>,
    pub item: Option<MediaItem>,
    pub looping: bool,
    pub paused: bool,
}

/// Everything the view reacts to.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    Playback(PlaybackUpdate),
    Notice(Notice),
}
