//! Shared test double for the playback component.
use simulcast_proto::config::PlayerConfig;
use simulcast_proto::player::{Player, PlayerEvent, StartError};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Load(String),
    Start,
    Pause,
}

/// Scripted in-memory player: records every capability call and lets tests
/// force start failures or disposal.
pub struct FakePlayer {
    pub calls: Vec<FakeCall>,
    pub current: Option<String>,
    pub disposed: bool,
    pub fail_next_start: Option<StartError>,
}

impl Player for FakePlayer {
    async fn create(
        _config: &PlayerConfig,
        _events: mpsc::Sender<PlayerEvent>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            calls: Vec::new(),
            current: None,
            disposed: false,
            fail_next_start: None,
        })
    }

    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        self.calls.push(FakeCall::Load(url.to_string()));
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), StartError> {
        self.calls.push(FakeCall::Start);
        match self.fail_next_start.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.calls.push(FakeCall::Pause);
        Ok(())
    }

    fn current_src(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl FakePlayer {
    pub fn loads(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Load(url) => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn start_count(&self) -> usize {
        self.calls.iter().filter(|c| **c == FakeCall::Start).count()
    }

    pub fn pause_count(&self) -> usize {
        self.calls.iter().filter(|c| **c == FakeCall::Pause).count()
    }
}
