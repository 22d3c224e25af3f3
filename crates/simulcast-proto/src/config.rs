use serde::{Deserialize, Serialize};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub tips: TipsConfig,
}

/// Local HTTP API (view state + tip hand-off).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Status proxy: the one local endpoint that talks to the upstream API.
/// The API key lives here and nowhere else — clients only ever see the
/// local `/status` route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Simulcast.me API key. Empty means unconfigured — the proxy answers
    /// every request with `no_api_key` until one is set.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Status URL the poller fetches. Empty means "use the local proxy".
    #[serde(default)]
    pub poll_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

/// Tip checkout hand-off. Both `checkout_url` and `product_id` must be set
/// before a tip can be submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipsConfig {
    #[serde(default)]
    pub checkout_url: String,
    #[serde(default)]
    pub product_id: String,
    #[serde(default = "default_min_tip")]
    pub min_amount: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_proxy_port(),
            upstream_url: default_upstream_url(),
            api_key: String::new(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            poll_url: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
        }
    }
}

impl Default for TipsConfig {
    fn default() -> Self {
        Self {
            checkout_url: String::new(),
            product_id: String::new(),
            min_amount: default_min_tip(),
        }
    }
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8989
}

fn default_proxy_port() -> u16 {
    8990
}

fn default_upstream_url() -> String {
    "https://simulcast.me/api/public/stream/status".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2500
}

fn default_volume() -> f32 {
    0.5
}

fn default_min_tip() -> f64 {
    1.0
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> std::path::PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// The URL the status poller should fetch: the configured override, or
    /// the local proxy endpoint when none is set.
    pub fn status_poll_url(&self) -> String {
        if self.status.poll_url.is_empty() {
            format!(
                "http://{}:{}/status",
                self.http.bind_address, self.proxy.port
            )
        } else {
            self.status.poll_url.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            proxy: ProxyConfig::default(),
            status: StatusConfig::default(),
            player: PlayerConfig::default(),
            tips: TipsConfig::default(),
        }
    }
}
