/// mpv-backed playback component, driven over mpv's JSON IPC with
/// separated reader/writer tasks.
///
/// ```text
///   MpvPlayer::create()
///         │
///         ├── writer_task     ← receives MpvRequest via mpsc, serialises → socket
///         ├── reader_task     ← reads JSON lines from socket
///         │                       ├── response (has request_id) → matched oneshot::Sender
///         │                       └── event / property-change   → raw event channel
///         └── translate task  ← raw mpv events → PlayerEvent for the reconciler
/// ```
///
/// Event mapping:
///   - `core-idle` flips to false        → `PlayerEvent::Playing`
///   - `end-file` with reason `error`    → `PlayerEvent::Error`, classified by
///     the `file_error` text into the source-not-found class vs everything else
///   - socket closed / process dead      → the component reports disposed and
///     the reconciler builds a fresh one on the next live cycle
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use simulcast_proto::config::PlayerConfig;
use simulcast_proto::player::{Player, PlayerErrorKind, PlayerEvent, StartError};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

/// Fixed observe_property ID for `core-idle`; false means frames are flowing.
pub const OBS_CORE_IDLE: u64 = 1;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── IPC handle ────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_source(&self, url: &str) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    /// Register observe_property for playback progress.  Must be called once
    /// after connecting; mpv then pushes property-change events.
    pub async fn observe_playback(&self) {
        match self
            .send(json!(["observe_property", OBS_CORE_IDLE, "core-idle"]))
            .await
        {
            Ok(_) => debug!("mpv: observing core-idle"),
            Err(e) => warn!("mpv: observe_property core-idle failed: {}", e),
        }
    }
}

// ── process driver ────────────────────────────────────────────────────────────

/// Owns the mpv child process and the IPC connection handshake.
struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    volume: f32,
}

impl MpvDriver {
    fn new(volume: f32) -> Self {
        Self {
            socket_name: simulcast_proto::platform::mpv_socket_name(),
            process: None,
            volume,
        }
    }

    fn spawn_command(&self) -> anyhow::Result<tokio::process::Command> {
        let mpv_binary = simulcast_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let mut cmd = tokio::process::Command::new(mpv_binary);
        cmd.arg("--idle=yes")
            .arg(simulcast_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            // Auto-muted autoplay contract: start muted so playback can
            // begin without a user gesture; unmuting is a user action.
            .arg("--mute=yes")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        Ok(cmd)
    }

    #[cfg(unix)]
    async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let child = self.spawn_command()?.spawn()?;
        self.process = Some(child);

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(Self::start_io_tasks(stream, event_tx))
    }

    #[cfg(unix)]
    fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle {
        let (read_half, write_half) = stream.into_split();
        let reader = BufReader::new(read_half);

        // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        let pending_w = pending.clone();
        tokio::spawn(writer_task(write_half, cmd_rx, pending_w));
        tokio::spawn(reader_task(reader, pending, event_tx));

        MpvHandle { tx: cmd_tx }
    }

    #[cfg(windows)]
    async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        info!("mpv: spawning new process");
        let child = self.spawn_command()?.spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            match ClientOptions::new().open(&pipe_path) {
                Ok(client) => {
                    info!("mpv: connected to named pipe");
                    return Ok(Self::start_io_tasks_windows(client, event_tx));
                }
                Err(_) => continue,
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }

    #[cfg(windows)]
    fn start_io_tasks_windows(
        pipe: tokio::net::windows::named_pipe::NamedPipeClient,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> MpvHandle {
        use tokio::io::split;
        let (read_half, write_half) = split(pipe);
        let reader = BufReader::new(read_half);

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        let pending_w = pending.clone();
        tokio::spawn(writer_task(write_half, cmd_rx, pending_w));
        tokio::spawn(reader_task(reader, pending, event_tx));

        MpvHandle { tx: cmd_tx }
    }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                // Fail all pending requests
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    // This is a command response — route to pending request
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            debug!("mpv reader: response req={} ok", req_id);
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    // Unsolicited event / property-change
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            // Remove and fail the request we just registered
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── event translation ─────────────────────────────────────────────────────────

/// Sort mpv's `end-file` error text into the "source not available" class
/// (expected while a live stream is still publishing its first segments)
/// versus everything else.
fn classify_end_file_error(file_error: &str) -> PlayerErrorKind {
    let lower = file_error.to_ascii_lowercase();
    if lower.contains("not found")
        || lower.contains("no such")
        || lower.contains("loading failed")
        || lower.contains("unrecognized")
    {
        PlayerErrorKind::SourceNotFound
    } else {
        PlayerErrorKind::Other(file_error.to_string())
    }
}

async fn translate_events(
    mut raw_rx: mpsc::Receiver<MpvEvent>,
    events: mpsc::Sender<PlayerEvent>,
    disposed: Arc<AtomicBool>,
) {
    while let Some(ev) = raw_rx.recv().await {
        let translated = if let Some((id, data)) = ev.as_property_change() {
            if id == OBS_CORE_IDLE && data.as_bool() == Some(false) {
                Some(PlayerEvent::Playing)
            } else {
                None
            }
        } else if ev.event_name() == Some("end-file") {
            let reason = ev.raw.get("reason").and_then(|v| v.as_str()).unwrap_or("");
            if reason == "error" {
                let detail = ev
                    .raw
                    .get("file_error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown playback error");
                Some(PlayerEvent::Error(classify_end_file_error(detail)))
            } else {
                None
            }
        } else {
            None
        };

        if let Some(event) = translated {
            if events.send(event).await.is_err() {
                break;
            }
        }
    }

    // Reader task gone: socket closed or process dead. The component is
    // finished; the reconciler constructs a fresh one on the next live cycle.
    disposed.store(true, Ordering::Relaxed);
    debug!("mpv: event stream ended, component disposed");
}

// ── Player implementation ─────────────────────────────────────────────────────

pub struct MpvPlayer {
    // Keeps the child process handle alive for the component's lifetime.
    _driver: MpvDriver,
    handle: MpvHandle,
    current_src: Option<String>,
    disposed: Arc<AtomicBool>,
}

impl Player for MpvPlayer {
    async fn create(
        config: &PlayerConfig,
        events: mpsc::Sender<PlayerEvent>,
    ) -> anyhow::Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<MpvEvent>(64);

        let mut driver = MpvDriver::new(config.default_volume);
        let handle = driver.spawn_and_connect(raw_tx).await?;
        handle.observe_playback().await;

        let disposed = Arc::new(AtomicBool::new(false));
        tokio::spawn(translate_events(raw_rx, events, disposed.clone()));

        Ok(Self {
            _driver: driver,
            handle,
            current_src: None,
            disposed,
        })
    }

    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        self.handle.load_source(url).await?;
        self.current_src = Some(url.to_string());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), StartError> {
        // mpv has no autoplay policy to be blocked by; any refusal here is
        // an IPC/playback failure.
        self.handle
            .set_pause(false)
            .await
            .map_err(|e| StartError::Other(e.to_string()))
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.handle.set_pause(true).await
    }

    fn current_src(&self) -> Option<&str> {
        self.current_src.as_deref()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_change_parsing() {
        let ev = MpvEvent {
            raw: json!({"event": "property-change", "id": 1, "data": false}),
        };
        let (id, data) = ev.as_property_change().unwrap();
        assert_eq!(id, OBS_CORE_IDLE);
        assert_eq!(data.as_bool(), Some(false));

        let ev = MpvEvent {
            raw: json!({"event": "end-file", "reason": "error"}),
        };
        assert!(ev.as_property_change().is_none());
        assert_eq!(ev.event_name(), Some("end-file"));
    }

    #[test]
    fn test_end_file_error_classification() {
        assert_eq!(
            classify_end_file_error("loading failed or was aborted"),
            PlayerErrorKind::SourceNotFound
        );
        assert_eq!(
            classify_end_file_error("file not found"),
            PlayerErrorKind::SourceNotFound
        );
        assert!(matches!(
            classify_end_file_error("audio output initialization failed"),
            PlayerErrorKind::Other(_)
        ));
    }
}
