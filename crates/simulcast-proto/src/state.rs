use crate::protocol::{PlaybackStatus, StreamView};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the client-visible view of the stream. The reconciler is the only
/// writer; HTTP clients read snapshots. Every mutation bumps `rev`.
pub struct StateManager {
    view: Arc<RwLock<StreamView>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            view: Arc::new(RwLock::new(StreamView::default())),
        }
    }

    pub async fn get_view(&self) -> StreamView {
        self.view.read().await.clone()
    }

    pub async fn set_live(&self, label: &str) {
        let mut view = self.view.write().await;
        view.status_line = StreamView::live_status_line(label);
        view.live = true;
        view.video_visible = true;
        view.stream_label = Some(label.to_string());
        view.rev += 1;
    }

    pub async fn set_offline(&self) {
        let mut view = self.view.write().await;
        view.status_line = StreamView::STATUS_OFFLINE.to_string();
        view.live = false;
        view.video_visible = false;
        view.stream_label = None;
        view.rev += 1;
    }

    /// A failed poll only replaces the status message. Live/visibility flags
    /// and playback state stay as they were — a transient network error must
    /// not tear down an active player.
    pub async fn set_poll_failed(&self) {
        let mut view = self.view.write().await;
        view.status_line = StreamView::STATUS_POLL_FAILED.to_string();
        view.rev += 1;
    }

    pub async fn set_playback(&self, status: PlaybackStatus) {
        let mut view = self.view.write().await;
        if view.playback != status {
            view.playback = status;
            view.rev += 1;
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_then_offline_view() {
        let state = StateManager::new();

        state.set_live("Cam1").await;
        let view = state.get_view().await;
        assert_eq!(view.status_line, "🔴 LIVE: Cam1");
        assert!(view.live);
        assert!(view.video_visible);
        assert_eq!(view.stream_label.as_deref(), Some("Cam1"));

        state.set_offline().await;
        let view = state.get_view().await;
        assert_eq!(view.status_line, StreamView::STATUS_OFFLINE);
        assert!(!view.live);
        assert!(!view.video_visible);
    }

    #[tokio::test]
    async fn test_poll_failure_preserves_player_flags() {
        let state = StateManager::new();
        state.set_live("Cam1").await;
        state.set_playback(PlaybackStatus::Playing).await;

        state.set_poll_failed().await;
        let view = state.get_view().await;
        assert_eq!(view.status_line, StreamView::STATUS_POLL_FAILED);
        assert!(view.live);
        assert!(view.video_visible);
        assert_eq!(view.playback, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_rev_increments_on_change() {
        let state = StateManager::new();
        let before = state.get_view().await.rev;
        state.set_offline().await;
        let after = state.get_view().await.rev;
        assert!(after > before);

        // Setting the same playback status twice does not bump rev.
        state.set_playback(PlaybackStatus::Idle).await;
        let unchanged = state.get_view().await.rev;
        assert_eq!(unchanged, after);
    }
}
