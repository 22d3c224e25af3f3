/// Status poller — one GET against the local status endpoint per tick.
///
/// The loop is a single sequential task: tick, fetch, report, repeat. A
/// slow response delays the next tick instead of overlapping it, so at most
/// one poll is ever in flight. There is no backoff — the fixed cadence is
/// the retry mechanism.
use reqwest::Client;
use simulcast_proto::protocol::StreamStatus;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::DaemonEvent;

/// Everything that can go wrong fetching a status snapshot. Callers treat
/// every variant the same way ("poll failed"); the distinction exists for
/// the logs.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status endpoint returned {0}")]
    Http(reqwest::StatusCode),
    #[error("invalid status payload: {0}")]
    Parse(#[from] serde_json::Error),
}

pub struct StatusPoller {
    client: Client,
    url: String,
}

impl StatusPoller {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub async fn fetch(&self) -> Result<StreamStatus, PollError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Http(status));
        }

        let body = response.bytes().await?;
        let parsed: StreamStatus = serde_json::from_slice(&body)?;
        debug!("status poll: isLive={}", parsed.is_live);
        Ok(parsed)
    }
}

/// Runs the poll loop for the daemon's lifetime. The first tick fires
/// immediately, giving the startup check.
pub fn spawn(
    poller: StatusPoller,
    interval_ms: u64,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "status poller: {} every {}ms",
            poller.url, interval_ms
        );
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(250)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let result = poller.fetch().await;
            if event_tx.send(DaemonEvent::Poll(result)).await.is_err() {
                // Event loop gone — daemon is shutting down.
                break;
            }
        }
    })
}
