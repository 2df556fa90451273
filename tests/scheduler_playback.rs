use std::time::Duration;

use signage_client::config::PlaybackOptions;
use signage_client::events::{PauseReason, PlaybackCommand, PlaybackUpdate, ViewEvent};
use signage_client::media::{MediaId, MediaItem, PlaylistSnapshot};
use signage_client::tasks::scheduler;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;

struct Harness {
    commands: mpsc::Sender<PlaybackCommand>,
    view: mpsc::Receiver<ViewEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn spawn(options: PlaybackOptions) -> Self {
        let (commands, commands_rx) = mpsc::channel(16);
        let (view_tx, view) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler::run(commands_rx, view_tx, cancel.clone(), options));
        Self {
            commands,
            view,
            cancel,
            handle,
        }
    }

    async fn send(&self, cmd: PlaybackCommand) {
        self.commands.send(cmd).await.unwrap();
    }

    async fn next_update(&mut self) -> PlaybackUpdate {
        match timeout(Duration::from_secs(60), self.view.recv())
            .await
            .expect("timeout waiting for playback update")
            .expect("view channel closed")
        {
            ViewEvent::Playback(update) => update,
            other => panic!("unexpected view event {other:?}"),
        }
    }

    async fn assert_quiet_for(&mut self, window: Duration) {
        let got = timeout(window, self.view.recv()).await;
        assert!(got.is_err(), "unexpected view event: {got:?}");
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

fn options() -> PlaybackOptions {
    PlaybackOptions {
        image_duration: Duration::from_millis(3000),
        video_end_grace: Duration::from_millis(500),
    }
}

fn image(id: &str, ms: u64) -> MediaItem {
    MediaItem::image(id, format!("file:///media/{id}.jpeg"), Duration::from_millis(ms))
}

fn video(id: &str, ms: Option<u64>) -> MediaItem {
    MediaItem::video(id, format!("https://cdn.example/{id}.mp4"), ms.map(Duration::from_millis))
}

fn playlist(items: Vec<MediaItem>) -> PlaylistSnapshot {
    items.into()
}

#[tokio::test(start_paused = true)]
async fn image_then_video_waits_for_end_report() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("1", 1000), video("2", None)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    let t0 = Instant::now();

    let first = h.next_update().await;
    assert_eq!(first.index, Some(0));
    assert!(!first.looping);

    let second = h.next_update().await;
    assert_eq!(second.index, Some(1));
    assert!(t0.elapsed() >= Duration::from_millis(1000));
    assert!(second.item.as_ref().is_some_and(MediaItem::is_video));

    // No duration: only the renderer can move past the video.
    h.assert_quiet_for(Duration::from_secs(30)).await;

    h.send(PlaybackCommand::VideoEnded(Some(MediaId::from("other")))).await;
    h.send(PlaybackCommand::VideoEnded(Some(MediaId::from("2")))).await;
    let third = h.next_update().await;
    assert_eq!(third.index, Some(0));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn video_with_duration_falls_back_after_grace() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![video("v", Some(2000)), image("i", 1000)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    let t0 = Instant::now();

    assert_eq!(h.next_update().await.index, Some(0));
    assert_eq!(h.next_update().await.index, Some(1));
    assert!(t0.elapsed() >= Duration::from_millis(2500));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn single_video_loops_and_never_advances() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![video("v", Some(1000))])))
        .await;
    h.send(PlaybackCommand::Start).await;

    let update = h.next_update().await;
    assert_eq!(update.index, Some(0));
    assert!(update.looping);

    h.send(PlaybackCommand::VideoEnded(None)).await;
    h.assert_quiet_for(Duration::from_secs(10)).await;

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn network_loss_holds_and_restore_restarts_duration() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("a", 1000), image("b", 1000)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    assert_eq!(h.next_update().await.index, Some(0));

    h.send(PlaybackCommand::Hold(PauseReason::NetworkLost)).await;
    let paused = h.next_update().await;
    assert!(paused.paused);
    assert_eq!(paused.index, Some(0));
    h.assert_quiet_for(Duration::from_secs(5)).await;

    h.send(PlaybackCommand::Release(PauseReason::NetworkLost)).await;
    let resumed = h.next_update().await;
    assert!(!resumed.paused);
    assert_eq!(resumed.index, Some(0));
    let resumed_at = Instant::now();

    assert_eq!(h.next_update().await.index, Some(1));
    assert!(resumed_at.elapsed() >= Duration::from_millis(1000));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn playback_resumes_only_after_every_reason_is_released() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("a", 1000), image("b", 1000)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    assert_eq!(h.next_update().await.index, Some(0));

    h.send(PlaybackCommand::Hold(PauseReason::SettingsOpen)).await;
    assert!(h.next_update().await.paused);
    h.send(PlaybackCommand::Hold(PauseReason::NetworkLost)).await;

    // Settings closed while the network is still down.
    h.send(PlaybackCommand::Release(PauseReason::SettingsOpen)).await;
    h.assert_quiet_for(Duration::from_secs(5)).await;

    h.send(PlaybackCommand::Release(PauseReason::NetworkLost)).await;
    assert!(!h.next_update().await.paused);
    assert_eq!(h.next_update().await.index, Some(1));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_playlist_restarts_at_first_item() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("a", 1000), image("b", 1000), image("c", 1000)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    assert_eq!(h.next_update().await.index, Some(0));
    assert_eq!(h.next_update().await.index, Some(1));

    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("x", 1000), image("y", 1000)])))
        .await;
    let update = h.next_update().await;
    assert_eq!(update.index, Some(0));
    assert_eq!(update.item.unwrap().id().as_str(), "x");

    h.send(PlaybackCommand::SetPlaylist(PlaylistSnapshot::empty())).await;
    let empty = h.next_update().await;
    assert_eq!(empty.index, None);
    assert!(empty.item.is_none());
    h.assert_quiet_for(Duration::from_secs(5)).await;

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn skip_and_stop() {
    let mut h = Harness::spawn(options());
    h.send(PlaybackCommand::SetPlaylist(playlist(vec![image("a", 1000), image("b", 1000)])))
        .await;
    h.send(PlaybackCommand::Start).await;
    assert_eq!(h.next_update().await.index, Some(0));

    h.send(PlaybackCommand::Skip).await;
    assert_eq!(h.next_update().await.index, Some(1));

    h.send(PlaybackCommand::Stop).await;
    h.assert_quiet_for(Duration::from_secs(5)).await;

    h.shutdown().await;
}
