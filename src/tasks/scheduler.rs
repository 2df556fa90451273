use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PlaybackOptions;
use crate::events::{PlaybackCommand, PlaybackUpdate, ViewEvent};
use crate::media::{MediaId, MediaItem, MediaKind, PlaylistSnapshot};
use crate::tasks::timer::{self, AdvanceTimer, TimerTicket};
use crate::tasks::viewer::{GateTransition, PauseGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub current_index: Option<usize>,
    pub is_running: bool,
    pub is_paused: bool,
}

/// Carousel state machine.
///
/// Rules:
/// - Round-robin over the installed snapshot; index resets to 0 on every install.
/// - Images advance when their duration elapses.
/// - Videos advance on a genuine end-of-playback report, or on a fallback
///   deadline of `duration + grace` when the duration is known.
/// - A playlist made of a single video loops in the renderer and never advances.
/// - Every mutator cancels the pending deadline before arming a new one.
#[derive(Debug)]
pub struct PlaybackScheduler {
    playlist: PlaylistSnapshot,
    current: usize,
    running: bool,
    paused: bool,
    timer: AdvanceTimer,
    video_end_grace: Duration,
}

impl PlaybackScheduler {
    pub fn new(video_end_grace: Duration) -> Self {
        Self {
            playlist: PlaylistSnapshot::empty(),
            current: 0,
            running: false,
            paused: false,
            timer: AdvanceTimer::new(),
            video_end_grace,
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            current_index: self.current_index(),
            is_running: self.running,
            is_paused: self.paused,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.playlist.is_empty()).then_some(self.current)
    }

    pub fn current_item(&self) -> Option<&MediaItem> {
        self.playlist.get(self.current)
    }

    pub fn playlist(&self) -> &PlaylistSnapshot {
        &self.playlist
    }

    /// Whether the renderer should loop the current item instead of
    /// reporting its end.
    pub fn loops_current(&self) -> bool {
        self.playlist.len() == 1 && self.playlist[0].is_video()
    }

    pub fn pending_timer(&self) -> Option<TimerTicket> {
        self.timer.armed()
    }

    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.rearm(now);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.timer.cancel();
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.timer.cancel();
    }

    /// Restarts the full duration of the current item; time already spent on
    /// it before the pause is not credited.
    pub fn resume(&mut self, now: Instant) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.rearm(now);
    }

    pub fn set_playlist(&mut self, playlist: PlaylistSnapshot, now: Instant) {
        self.timer.cancel();
        self.playlist = playlist;
        self.current = 0;
        self.rearm(now);
    }

    /// Move to the next item, wrapping at the end. No-op on an empty playlist.
    pub fn advance(&mut self, now: Instant) -> Option<usize> {
        if self.playlist.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.playlist.len();
        self.rearm(now);
        Some(self.current)
    }

    /// Handle a native end-of-playback report. Returns whether it advanced.
    ///
    /// Reports are dropped while paused or stopped, when the current item is
    /// not a video, when `ended` names another item, and for a looping
    /// single-video playlist.
    pub fn on_video_ended(&mut self, ended: Option<&MediaId>, now: Instant) -> bool {
        if !self.running || self.paused || self.loops_current() {
            return false;
        }
        let Some(item) = self.current_item() else {
            return false;
        };
        if item.kind() != MediaKind::Video {
            return false;
        }
        if ended.is_some_and(|id| id != item.id()) {
            return false;
        }
        self.advance(now).is_some()
    }

    /// Handle an expired deadline. Stale tickets are ignored.
    pub fn on_timer(&mut self, ticket: TimerTicket, now: Instant) -> bool {
        if !self.timer.fire(ticket) {
            return false;
        }
        self.advance(now).is_some()
    }

    fn rearm(&mut self, now: Instant) {
        self.timer.cancel();
        if !self.running || self.paused {
            return;
        }
        let loops = self.loops_current();
        let Some(item) = self.current_item() else {
            return;
        };
        let wait = match (item.kind(), item.duration()) {
            (MediaKind::Image, Some(duration)) => duration,
            (MediaKind::Video, Some(duration)) if !loops => duration + self.video_end_grace,
            _ => return,
        };
        self.timer.arm(now, wait);
    }

    fn update(&self) -> PlaybackUpdate {
        PlaybackUpdate {
            index: self.current_index(),
            item: self.current_item().cloned(),
            looping: self.loops_current(),
            paused: self.paused,
        }
    }
}

/// Owns the scheduler for the session and applies commands in arrival order.
///
/// Pause requests are folded through a [`PauseGate`]; playback resumes only
/// after every outstanding reason has been released.
pub async fn run(
    mut commands: Receiver<PlaybackCommand>,
    to_view: Sender<ViewEvent>,
    cancel: CancellationToken,
    options: PlaybackOptions,
) -> Result<()> {
    let mut scheduler = PlaybackScheduler::new(options.video_end_grace);
    let mut gate = PauseGate::default();
    let mut last_update: Option<PlaybackUpdate> = None;

    loop {
        let pending = scheduler.pending_timer();
        select! {
            _ = cancel.cancelled() => break,

            ticket = timer::expired(pending) => {
                if scheduler.on_timer(ticket, Instant::now()) {
                    debug!(index = ?scheduler.current_index(), "carousel advanced on timer");
                }
            }

            maybe_cmd = commands.recv() => {
                match maybe_cmd {
                    Some(cmd) => apply(&mut scheduler, &mut gate, cmd, Instant::now()),
                    None => {
                        debug!("playback command channel closed");
                        break;
                    }
                }
            }
        }

        let update = scheduler.update();
        if last_update.as_ref() != Some(&update) {
            if to_view.send(ViewEvent::Playback(update.clone())).await.is_err() {
                warn!("view channel closed");
                break;
            }
            last_update = Some(update);
        }
    }

    scheduler.stop();
    info!(state = ?scheduler.state(), "playback stopped");
    Ok(())
}

fn apply(
    scheduler: &mut PlaybackScheduler,
    gate: &mut PauseGate,
    cmd: PlaybackCommand,
    now: Instant,
) {
    match cmd {
        PlaybackCommand::SetPlaylist(snapshot) => {
            info!(items = snapshot.len(), "installing playlist");
            scheduler.set_playlist(snapshot, now);
        }
        PlaybackCommand::Start => scheduler.start(now),
        PlaybackCommand::Stop => scheduler.stop(),
        PlaybackCommand::Hold(reason) => {
            if gate.hold(reason) == Some(GateTransition::Pause) {
                debug!(?reason, "pausing playback");
            }
            scheduler.pause();
        }
        PlaybackCommand::Release(reason) => {
            if gate.release(reason) == Some(GateTransition::Resume) {
                debug!(?reason, "resuming playback");
                scheduler.resume(now);
            }
        }
        PlaybackCommand::Skip => {
            scheduler.advance(now);
        }
        PlaybackCommand::VideoEnded(id) => {
            if !scheduler.on_video_ended(id.as_ref(), now) {
                debug!(id = ?id, index = ?scheduler.current_index(), "ignored video end report");
            }
        }
    }
}
