use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{PauseReason, PlaybackUpdate, ViewEvent};
use crate::media::{MediaId, MediaKind};

/// What the display should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Image {
        id: MediaId,
        source: String,
    },
    Video {
        id: MediaId,
        source: String,
        /// Restart in place on completion instead of reporting the end.
        looping: bool,
    },
    Placeholder {
        source: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Pause,
    Resume,
}

/// Folds independent pause signals into one paused/playing decision.
///
/// Any held reason keeps playback paused. Only the release of the last
/// reason yields [`GateTransition::Resume`].
#[derive(Debug, Default)]
pub struct PauseGate {
    held: BTreeSet<PauseReason>,
}

impl PauseGate {
    pub fn hold(&mut self, reason: PauseReason) -> Option<GateTransition> {
        let was_blocked = self.is_blocked();
        self.held.insert(reason);
        (!was_blocked).then_some(GateTransition::Pause)
    }

    pub fn release(&mut self, reason: PauseReason) -> Option<GateTransition> {
        if !self.held.remove(&reason) {
            return None;
        }
        (!self.is_blocked()).then_some(GateTransition::Resume)
    }

    pub fn is_blocked(&self) -> bool {
        !self.held.is_empty()
    }

    pub fn held(&self) -> impl Iterator<Item = PauseReason> + '_ {
        self.held.iter().copied()
    }
}

/// Read-only projection of scheduler output onto frames.
#[derive(Debug)]
pub struct PlaybackView {
    placeholder: String,
    current: Option<Frame>,
}

impl PlaybackView {
    pub fn new(placeholder: &Path) -> Self {
        Self {
            placeholder: placeholder.display().to_string(),
            current: None,
        }
    }

    pub fn render(&self, update: &PlaybackUpdate) -> Frame {
        match &update.item {
            Some(item) => match item.kind() {
                MediaKind::Image => Frame::Image {
                    id: item.id().clone(),
                    source: item.source().to_string(),
                },
                MediaKind::Video => Frame::Video {
                    id: item.id().clone(),
                    source: item.source().to_string(),
                    looping: update.looping,
                },
            },
            None => Frame::Placeholder {
                source: self.placeholder.clone(),
            },
        }
    }

    /// Returns the new frame when it differs from the one on screen.
    pub fn present(&mut self, update: &PlaybackUpdate) -> Option<&Frame> {
        let frame = self.render(update);
        if self.current.as_ref() == Some(&frame) {
            return None;
        }
        self.current = Some(frame);
        self.current.as_ref()
    }
}

pub async fn run(
    mut events: Receiver<ViewEvent>,
    cancel: CancellationToken,
    placeholder: &Path,
) -> Result<()> {
    let mut view = PlaybackView::new(placeholder);

    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_event = events.recv() => {
                match maybe_event {
                    Some(ViewEvent::Playback(update)) => {
                        let paused = update.paused;
                        let index = update.index;
                        match view.present(&update) {
                            Some(frame) => info!(?index, paused, ?frame, "presenting"),
                            None => debug!(?index, paused, "frame unchanged"),
                        }
                    }
                    Some(ViewEvent::Notice(notice)) => {
                        warn!(code = notice.code, message = %notice.message, "notice");
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaItem;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn gate_requires_every_reason_released() {
        let mut gate = PauseGate::default();
        assert_eq!(gate.hold(PauseReason::SettingsOpen), Some(GateTransition::Pause));
        assert_eq!(gate.hold(PauseReason::NetworkLost), None);
        assert_eq!(gate.release(PauseReason::NetworkLost), None);
        assert!(gate.is_blocked());
        assert_eq!(gate.release(PauseReason::SettingsOpen), Some(GateTransition::Resume));
        assert!(!gate.is_blocked());
    }

    #[test]
    fn gate_ignores_release_without_hold() {
        let mut gate = PauseGate::default();
        assert_eq!(gate.release(PauseReason::NetworkLost), None);
        assert_eq!(gate.hold(PauseReason::Manual), Some(GateTransition::Pause));
        assert_eq!(gate.hold(PauseReason::Manual), None);
        assert_eq!(gate.held().collect::<Vec<_>>(), vec![PauseReason::Manual]);
    }

    #[test]
    fn empty_update_renders_placeholder() {
        let view = PlaybackView::new(&PathBuf::from("/opt/placeholder.jpeg"));
        let frame = view.render(&PlaybackUpdate {
            index: None,
            item: None,
            looping: false,
            paused: false,
        });
        assert_eq!(
            frame,
            Frame::Placeholder {
                source: "/opt/placeholder.jpeg".into()
            }
        );
    }

    #[test]
    fn present_skips_identical_frames() {
        let mut view = PlaybackView::new(&PathBuf::from("/p.jpeg"));
        let update = PlaybackUpdate {
            index: Some(0),
            item: Some(MediaItem::video("v", "https://cdn/v.mp4", None)),
            looping: true,
            paused: false,
        };
        assert!(matches!(
            view.present(&update),
            Some(Frame::Video { looping: true, .. })
        ));
        assert!(view.present(&update).is_none());
        let paused = PlaybackUpdate {
            paused: true,
            ..update
        };
        assert!(view.present(&paused).is_none(), "pausing keeps the frame");
        let image = PlaybackUpdate {
            index: Some(0),
            item: Some(MediaItem::image("a", "file:///a.jpeg", Duration::from_secs(3))),
            looping: false,
            paused: false,
        };
        assert!(matches!(view.present(&image), Some(Frame::Image { .. })));
    }
}
