/// Playback component capability interface.
///
/// The reconciler drives playback exclusively through this trait, so the
/// concrete component stays swappable: the daemon ships an mpv-backed
/// implementation, tests use a scripted fake. Events flow the other way —
/// the component pushes `Playing` / `Error` onto the channel handed to
/// `create()`, and those land in the daemon event loop fully ordered
/// against poll results.
use tokio::sync::mpsc;

use crate::config::PlayerConfig;

/// Unsolicited playback component callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// First frame rendered / playback resumed — clears startup grace.
    Playing,
    Error(PlayerErrorKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerErrorKind {
    /// "No supported source / not found" class. Expected and transient while
    /// the upstream stream is still publishing its first segments.
    SourceNotFound,
    Other(String),
}

/// Why a start attempt did not begin playback.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Start was refused pending user interaction (autoplay-policy class).
    /// Benign: no retry needed, a user gesture resumes playback.
    #[error("playback start blocked pending user interaction")]
    Blocked,
    #[error("playback start failed: {0}")]
    Other(String),
}

#[allow(async_fn_in_trait)]
pub trait Player: Sized {
    /// Construct a component configured for auto-muted autoplay. Events are
    /// delivered on `events` for the component's whole lifetime.
    async fn create(
        config: &PlayerConfig,
        events: mpsc::Sender<PlayerEvent>,
    ) -> anyhow::Result<Self>;

    /// Set the current source descriptor.
    async fn load(&mut self, url: &str) -> anyhow::Result<()>;

    /// Attempt to start playback of the loaded source.
    async fn start(&mut self) -> Result<(), StartError>;

    async fn pause(&mut self) -> anyhow::Result<()>;

    /// The source currently held by the component, if any.
    fn current_src(&self) -> Option<&str>;

    /// True once the component is gone for good (page teardown in a browser,
    /// dead process here). A disposed player is never reused.
    fn is_disposed(&self) -> bool;
}
