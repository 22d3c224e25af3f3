/// Daemon event loop. Every external input — poll results from the status
/// poller, callbacks from the playback component — funnels into one channel
/// and is handled sequentially here, so all reconciler and view mutation is
/// totally ordered without locks.
use std::sync::Arc;

use simulcast_proto::config::PlayerConfig;
use simulcast_proto::player::{Player, PlayerEvent};
use simulcast_proto::protocol::StreamStatus;
use simulcast_proto::state::StateManager;
use tokio::sync::mpsc;
use tracing::warn;

use crate::reconcile::Reconciler;
use crate::status::PollError;

#[derive(Debug)]
pub enum DaemonEvent {
    Poll(Result<StreamStatus, PollError>),
    Player(PlayerEvent),
}

pub struct DaemonCore<P: Player> {
    reconciler: Reconciler<P>,
    state: Arc<StateManager>,
}

impl<P: Player> DaemonCore<P> {
    pub fn new(
        player_config: PlayerConfig,
        player_events: mpsc::Sender<PlayerEvent>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(player_config, player_events, Arc::clone(&state)),
            state,
        }
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        while let Some(event) = event_rx.recv().await {
            self.handle_event(event).await;
        }
        Ok(())
    }

    pub async fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Poll(Ok(status)) => {
                if status.is_live && status.live_source().is_none() {
                    // The wire contract makes hlsUrl live-only; a live
                    // snapshot without it is malformed and handled like a
                    // failed poll.
                    warn!("status poll: live snapshot missing hlsUrl");
                    self.state.set_poll_failed().await;
                    return;
                }
                let now_ms = chrono::Utc::now().timestamp_millis();
                self.reconciler.apply(&status, now_ms).await;
            }
            DaemonEvent::Poll(Err(e)) => {
                warn!("status poll failed: {}", e);
                self.state.set_poll_failed().await;
            }
            DaemonEvent::Player(player_event) => {
                self.reconciler.on_player_event(player_event).await;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn reconciler(&self) -> &Reconciler<P> {
        &self.reconciler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlayer;
    use simulcast_proto::protocol::{PlaybackStatus, StreamView};

    fn new_core() -> (DaemonCore<FakePlayer>, Arc<StateManager>) {
        let state = Arc::new(StateManager::new());
        let (player_tx, _player_rx) = mpsc::channel(16);
        (
            DaemonCore::new(PlayerConfig::default(), player_tx, Arc::clone(&state)),
            state,
        )
    }

    fn live_status() -> StreamStatus {
        StreamStatus {
            is_live: true,
            hls_url: Some("https://x/a.m3u8".to_string()),
            stream_key_label: Some("Cam1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_failed_poll_updates_message_only() {
        let (mut core, state) = new_core();

        core.handle_event(DaemonEvent::Poll(Ok(live_status()))).await;
        let before_loads = core.reconciler().player().unwrap().loads().len();
        assert!(core.reconciler().was_live());

        let transport_err = reqwest::Client::new()
            .get("http://127.0.0.1:1/status")
            .send()
            .await
            .unwrap_err();
        core.handle_event(DaemonEvent::Poll(Err(PollError::Transport(transport_err))))
            .await;

        // Only the status message changed: player state, the was-live flag,
        // and the view's player flags are untouched.
        assert!(core.reconciler().was_live());
        assert_eq!(
            core.reconciler().player().unwrap().loads().len(),
            before_loads
        );
        let view = state.get_view().await;
        assert_eq!(view.status_line, StreamView::STATUS_POLL_FAILED);
        assert!(view.video_visible);
    }

    #[tokio::test]
    async fn test_live_snapshot_without_url_is_a_failed_poll() {
        let (mut core, state) = new_core();

        let malformed = StreamStatus {
            is_live: true,
            hls_url: None,
            stream_key_label: None,
        };
        core.handle_event(DaemonEvent::Poll(Ok(malformed))).await;

        assert!(core.reconciler().player().is_none());
        assert!(!core.reconciler().was_live());
        assert_eq!(
            state.get_view().await.status_line,
            StreamView::STATUS_POLL_FAILED
        );
    }

    #[tokio::test]
    async fn test_player_events_reach_reconciler() {
        let (mut core, state) = new_core();

        core.handle_event(DaemonEvent::Poll(Ok(live_status()))).await;
        core.handle_event(DaemonEvent::Player(PlayerEvent::Playing))
            .await;

        assert_eq!(state.get_view().await.playback, PlaybackStatus::Playing);
    }
}
