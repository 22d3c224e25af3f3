/// Player reconciler — brings the visible player state into agreement with
/// the latest status snapshot.
///
/// One `apply()` per successful poll. The decision that matters is the
/// offline→live transition ("fresh start"): live manifests get cached at
/// every intermediate layer, and after an offline gap the first manifest
/// fetched must not be a stale copy describing segments that no longer
/// exist. So every fresh start and every retry loads a cache-busted URL,
/// even when the base URL is unchanged.
///
/// Failed polls never reach this type — the core loop only updates the
/// status message for those, so a transient network error cannot tear down
/// an active player.
use std::sync::Arc;

use simulcast_proto::config::PlayerConfig;
use simulcast_proto::player::{Player, PlayerErrorKind, PlayerEvent, StartError};
use simulcast_proto::protocol::{PlaybackStatus, StreamStatus};
use simulcast_proto::state::StateManager;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Appends a timestamp query parameter so every load bypasses HTTP/manifest
/// caches. `&` when the URL already carries a query string, `?` otherwise.
pub fn cache_busted_url(base: &str, now_ms: i64) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", base, separator, now_ms)
}

pub struct Reconciler<P: Player> {
    player: Option<P>,
    /// Live signal from the previous cycle. Read before it is updated, so a
    /// fresh start is detected exactly on the cycle after an offline one.
    was_live: bool,
    /// Startup grace: suppress error surfacing while the component is still
    /// negotiating its initial source.
    grace: bool,
    has_error: bool,
    current_base: Option<String>,
    player_config: PlayerConfig,
    player_events: mpsc::Sender<PlayerEvent>,
    state: Arc<StateManager>,
}

impl<P: Player> Reconciler<P> {
    pub fn new(
        player_config: PlayerConfig,
        player_events: mpsc::Sender<PlayerEvent>,
        state: Arc<StateManager>,
    ) -> Self {
        Self {
            player: None,
            was_live: false,
            grace: false,
            has_error: false,
            current_base: None,
            player_config,
            player_events,
            state,
        }
    }

    /// Reconcile against one status snapshot. `now_ms` stamps the
    /// cache-busted URL for this cycle.
    pub async fn apply(&mut self, status: &StreamStatus, now_ms: i64) {
        // A dead component cannot be reused; forget it so the next live
        // cycle constructs a fresh one.
        if self.player.as_ref().is_some_and(|p| p.is_disposed()) {
            info!("player: component disposed, dropping handle");
            self.player = None;
            self.current_base = None;
        }

        match status.live_source() {
            Some((url, label)) => self.apply_live(url, label, now_ms).await,
            None if status.is_live => {
                // Live without a playable URL is a malformed snapshot; the
                // core loop filters these, but never act on one.
                warn!("reconcile: live status without hlsUrl ignored");
            }
            None => self.apply_offline().await,
        }
    }

    async fn apply_offline(&mut self) {
        self.state.set_offline().await;

        // Pause, don't destroy — keeps resume cheap when the stream returns.
        if let Some(p) = self.player.as_mut() {
            if let Err(e) = p.pause().await {
                warn!("player: pause failed: {}", e);
            }
            self.state.set_playback(PlaybackStatus::Paused).await;
        }

        self.was_live = false;
    }

    async fn apply_live(&mut self, url: &str, label: &str, now_ms: i64) {
        let is_fresh_start = !self.was_live;
        let busted = cache_busted_url(url, now_ms);

        self.state.set_live(label).await;

        if self.player.is_none() {
            match P::create(&self.player_config, self.player_events.clone()).await {
                Ok(mut p) => {
                    self.grace = true;
                    self.has_error = false;
                    self.state.set_playback(PlaybackStatus::Connecting).await;

                    if let Err(e) = p.load(&busted).await {
                        warn!("player: initial source load failed: {}", e);
                        self.has_error = true;
                    } else {
                        attempt_start(&mut p).await;
                    }

                    self.current_base = Some(url.to_string());
                    self.player = Some(p);
                }
                Err(e) => {
                    warn!("player: creation failed: {} (next poll retries)", e);
                }
            }
            self.was_live = true;
            return;
        }

        if let Some(p) = self.player.as_mut() {
            // Reload when the base URL changed, the component is in an error
            // state, or the stream just came back online. The fresh-start
            // case is required even with an unchanged URL: buffered media
            // from before the outage is stale.
            let same_base_url = p.current_src().is_some_and(|src| src.contains(url));

            if !same_base_url || self.has_error || is_fresh_start {
                info!("stream check: updating source (fresh start or retry)");

                if self.has_error {
                    // Clear the error and re-enter startup grace before the
                    // new source is applied, so no stale error flashes
                    // during the reload.
                    self.has_error = false;
                    self.grace = true;
                }
                self.state.set_playback(PlaybackStatus::Connecting).await;

                if let Err(e) = p.load(&busted).await {
                    warn!("player: source reload failed: {}", e);
                    self.has_error = true;
                } else {
                    attempt_start(p).await;
                }

                self.current_base = Some(url.to_string());
            }
        }

        self.was_live = true;
    }

    /// Playback component callbacks, delivered on the daemon event loop.
    pub async fn on_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Playing => {
                self.grace = false;
                self.has_error = false;
                self.state.set_playback(PlaybackStatus::Playing).await;
            }
            PlayerEvent::Error(PlayerErrorKind::SourceNotFound) => {
                // Expected while the stream is still publishing its first
                // segments: keep the loading affordance up, retry on the
                // next poll cycle.
                debug!("player: source not available yet, staying in startup grace");
                self.has_error = true;
                self.grace = true;
                self.state.set_playback(PlaybackStatus::Connecting).await;
            }
            PlayerEvent::Error(PlayerErrorKind::Other(message)) => {
                warn!("player: playback error: {}", message);
                self.has_error = true;
                if !self.grace {
                    self.state.set_playback(PlaybackStatus::Error).await;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn player(&self) -> Option<&P> {
        self.player.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self) -> Option<&mut P> {
        self.player.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn was_live(&self) -> bool {
        self.was_live
    }
}

/// Classify a start attempt the way the original player glue does: a block
/// by autoplay policy is benign (user interaction resumes it), anything
/// else is logged and left for the next poll cycle.
async fn attempt_start<P: Player>(p: &mut P) {
    match p.start().await {
        Ok(()) => {}
        Err(StartError::Blocked) => {
            debug!("player: autoplay blocked (browser policy class), waiting for user gesture");
        }
        Err(StartError::Other(e)) => {
            info!("player: start failed ({}), next poll cycle retries", e);
        }
    }
}
