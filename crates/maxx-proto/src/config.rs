use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::platform;
use crate::catalog::SearchFilters;
use crate::protocol::PACKET_BUFFER_SIZE;
use crate::quality::{QualityPolicy, UHD_RESOLUTION};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Remote-control TCP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_bind")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Read-only status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Query loaded at startup, before any remote has spoken.
    #[serde(default = "default_query")]
    pub default_query: String,
    #[serde(default = "default_quality_filter")]
    pub quality: String,
    #[serde(default = "default_all")]
    pub genre: String,
    #[serde(default = "default_zero")]
    pub rating: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_zero")]
    pub year: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub allow_4k: bool,
    #[serde(default = "default_ceiling")]
    pub resolution_ceiling: u32,
    /// Program that downloads and plays a torrent.
    #[serde(default = "default_player_command")]
    pub player_command: String,
    /// `{media}` is replaced by the file path (or link).
    #[serde(default = "default_player_args")]
    pub player_args: Vec<String>,
    /// Extra process to kill by name on stop: the video player the
    /// downloader spawned (`--mpv` launches mpv as its own child).
    #[serde(default = "default_process_name")]
    pub process_name: Option<String>,
    #[serde(default = "default_true")]
    pub download_first: bool,
    #[serde(default = "platform::downloads_dir")]
    pub downloads_dir: PathBuf,
}

/// OS key-injection tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_key_command")]
    pub command: String,
    #[serde(default = "default_key_args")]
    pub args_prefix: Vec<String>,
    /// Key pressed for unknown symbols.
    #[serde(default = "default_filler_key")]
    pub filler: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_server_bind(),
            port: default_server_port(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_http_bind(),
            port: default_http_port(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_query: default_query(),
            quality: default_quality_filter(),
            genre: default_all(),
            rating: default_zero(),
            order: default_order(),
            year: default_zero(),
            language: default_language(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            allow_4k: false,
            resolution_ceiling: default_ceiling(),
            player_command: default_player_command(),
            player_args: default_player_args(),
            process_name: default_process_name(),
            download_first: true,
            downloads_dir: platform::downloads_dir(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            command: default_key_command(),
            args_prefix: default_key_args(),
            filler: default_filler_key(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl CatalogConfig {
    pub fn filters(&self) -> SearchFilters {
        SearchFilters {
            quality: self.quality.clone(),
            genre: self.genre.clone(),
            rating: self.rating.clone(),
            order: self.order.clone(),
            year: self.year.clone(),
            language: self.language.clone(),
        }
    }
}

impl ServerConfig {
    /// Reads larger than a packet can be are rejected by the parser anyway,
    /// and a zero-sized read would look like a hang-up.
    pub fn clamp_buffer_size(&mut self) {
        let clamped = self.buffer_size.clamp(1, PACKET_BUFFER_SIZE);
        if clamped != self.buffer_size {
            warn!(
                "server.buffer_size {} out of range, using {}",
                self.buffer_size, clamped
            );
            self.buffer_size = clamped;
        }
    }
}

impl PlaybackConfig {
    pub fn quality_policy(&self) -> QualityPolicy {
        QualityPolicy {
            ceiling: self.resolution_ceiling,
            allow_4k: self.allow_4k,
        }
    }
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    platform::REMOTE_TCP_PORT
}

fn default_buffer_size() -> usize {
    PACKET_BUFFER_SIZE
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8081
}

fn default_base_url() -> String {
    "https://yts.mx".to_string()
}

fn default_query() -> String {
    "0".to_string()
}

fn default_quality_filter() -> String {
    SearchFilters::default().quality
}

fn default_all() -> String {
    "all".to_string()
}

fn default_zero() -> String {
    "0".to_string()
}

fn default_order() -> String {
    SearchFilters::default().order
}

fn default_language() -> String {
    SearchFilters::default().language
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ceiling() -> u32 {
    UHD_RESOLUTION
}

fn default_player_command() -> String {
    "webtorrent".to_string()
}

fn default_player_args() -> Vec<String> {
    vec!["{media}".to_string(), "--mpv".to_string()]
}

fn default_process_name() -> Option<String> {
    Some("mpv".to_string())
}

fn default_true() -> bool {
    true
}

fn default_key_command() -> String {
    "xdotool".to_string()
}

fn default_key_args() -> Vec<String> {
    vec!["key".to_string()]
}

fn default_filler_key() -> String {
    "shift".to_string()
}

fn default_fps() -> u32 {
    30
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.server.clamp_buffer_size();
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
