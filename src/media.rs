use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

/// Stable identifier of one playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// One renderable announcement.
///
/// Construct through [`MediaItem::image`] or [`MediaItem::video`]; the kind
/// cannot change afterwards and images always carry a duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    id: MediaId,
    kind: MediaKind,
    source: String,
    duration: Option<Duration>,
}

impl MediaItem {
    pub fn image(id: impl Into<MediaId>, source: impl Into<String>, duration: Duration) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Image,
            source: source.into(),
            duration: Some(duration),
        }
    }

    pub fn video(
        id: impl Into<MediaId>,
        source: impl Into<String>,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Video,
            source: source.into(),
            duration,
        }
    }

    pub fn id(&self) -> &MediaId {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

impl From<String> for MediaId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Immutable playback order handed from the synchronizer to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistSnapshot(Arc<[MediaItem]>);

impl PlaylistSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.0
    }
}

impl Deref for PlaylistSnapshot {
    type Target = [MediaItem];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<MediaItem>> for PlaylistSnapshot {
    fn from(items: Vec<MediaItem>) -> Self {
        Self(items.into())
    }
}

impl FromIterator<MediaItem> for PlaylistSnapshot {
    fn from_iter<I: IntoIterator<Item = MediaItem>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawMediaType {
    Image,
    Video,
    #[serde(other)]
    Unsupported,
}

/// Announcement row as reported by the backend collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnnouncement {
    pub id: i64,
    pub announcement_id: i64,
    pub local_path: String,
    pub media_type: RawMediaType,
    /// Milliseconds.
    #[serde(default)]
    pub media_duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_announcement_accepts_unknown_media_type() {
        let raw: RawAnnouncement = serde_json::from_str(
            r#"{"id":1,"announcementId":7,"localPath":"a.gif","mediaType":"gif"}"#,
        )
        .unwrap();
        assert_eq!(raw.media_type, RawMediaType::Unsupported);
        assert_eq!(raw.media_duration, None);
    }

    #[test]
    fn snapshot_clones_share_items() {
        let snapshot = PlaylistSnapshot::from(vec![MediaItem::image(
            "a",
            "file:///a.jpeg",
            Duration::from_secs(3),
        )]);
        let copy = snapshot.clone();
        assert!(std::ptr::eq(snapshot.items(), copy.items()));
        assert_eq!(copy[0].kind(), MediaKind::Image);
    }
}
