use serde::{Deserialize, Serialize};

/// One status snapshot from the Simulcast.me API (via the local proxy).
/// Field names are the upstream wire format — camelCase, with the URL and
/// label present only while the stream is live. Produced fresh on every
/// poll, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_key_label: Option<String>,
}

impl StreamStatus {
    /// Returns `(hls_url, label)` when the snapshot describes a playable
    /// live stream. A live snapshot without a URL is malformed — callers
    /// treat it like a failed poll.
    pub fn live_source(&self) -> Option<(&str, &str)> {
        if !self.is_live {
            return None;
        }
        let url = self.hls_url.as_deref()?;
        let label = self.stream_key_label.as_deref().unwrap_or("");
        Some((url, label))
    }
}

/// Player state as surfaced to clients — reflects what the reconciler
/// knows about the playback component.
///
/// `Connecting` doubles as the startup-grace "loading" affordance: expected
/// source-not-found errors during stream warm-up keep the player here
/// instead of surfacing `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // no player yet / never been live
    Connecting, // source loading, startup grace active
    Playing,    // first frame rendered, audio/video flowing
    Paused,     // stream went offline, player kept for fast resume
    Error,      // playback failed outside startup grace
}

/// Everything a front-end needs to render the embed: status line, container
/// visibility, playback phase.  `rev` is a monotonically increasing counter
/// incremented every time the view changes; clients can use it to skip
/// unchanged snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamView {
    #[serde(default)]
    pub rev: u64,
    pub status_line: String,
    pub live: bool,
    pub video_visible: bool,
    pub stream_label: Option<String>,
    pub playback: PlaybackStatus,
}

impl StreamView {
    pub const STATUS_LOADING: &'static str = "Loading...";
    pub const STATUS_OFFLINE: &'static str = "⚫ OFFLINE";
    pub const STATUS_POLL_FAILED: &'static str = "Error checking stream status.";

    pub fn live_status_line(label: &str) -> String {
        format!("🔴 LIVE: {}", label)
    }
}

impl Default for StreamView {
    fn default() -> Self {
        Self {
            rev: 1,
            status_line: Self::STATUS_LOADING.to_string(),
            live: false,
            video_visible: false,
            stream_label: None,
            playback: PlaybackStatus::Idle,
        }
    }
}
