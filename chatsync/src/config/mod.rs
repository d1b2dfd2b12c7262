//! Configuration for the `chatsync` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatsync/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. The access token is never
//! read from the file.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::api::Credential;
use crate::sync::SyncConfig;

/// Service root used when nothing else is configured.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";

/// Per-request timeout used when nothing else is configured.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The service URL is not a valid absolute URL.
    #[error("invalid service url {url:?}: {source}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    message_interval_ms: Option<u64>,
    peer_presence_interval_ms: Option<u64>,
    sidebar_presence_interval_ms: Option<u64>,
    unread_interval_ms: Option<u64>,
    pending_match_window_secs: Option<u64>,
    pending_expiry_secs: Option<u64>,
    event_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the chat service.
    pub base_url: Url,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Access token, if one was supplied.
    pub credential: Option<Credential>,
    /// Username of the conversation to open at start-up.
    pub peer: Option<String>,
    /// Sync engine cadences and limits.
    pub sync: SyncConfig,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path
    /// (`~/.config/chatsync/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if the resolved service URL is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let sync_defaults = SyncConfig::default();

        let raw_url = cli
            .base_url
            .as_deref()
            .or(file.server.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(raw_url).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;

        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(
                file.server
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            credential: cli.token.clone().map(Credential::new),
            peer: cli.peer.clone(),
            sync: SyncConfig {
                message_interval: file
                    .sync
                    .message_interval_ms
                    .map_or(sync_defaults.message_interval, Duration::from_millis),
                peer_presence_interval: file
                    .sync
                    .peer_presence_interval_ms
                    .map_or(sync_defaults.peer_presence_interval, Duration::from_millis),
                sidebar_presence_interval: file
                    .sync
                    .sidebar_presence_interval_ms
                    .map_or(sync_defaults.sidebar_presence_interval, Duration::from_millis),
                unread_interval: file
                    .sync
                    .unread_interval_ms
                    .map_or(sync_defaults.unread_interval, Duration::from_millis),
                pending_match_window: file
                    .sync
                    .pending_match_window_secs
                    .map_or(sync_defaults.pending_match_window, Duration::from_secs),
                pending_expiry: file
                    .sync
                    .pending_expiry_secs
                    .map_or(sync_defaults.pending_expiry, Duration::from_secs),
                event_buffer: file.sync.event_buffer.unwrap_or(sync_defaults.event_buffer),
            },
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Default)]
#[command(version, about = "Terminal client for a polling chat service")]
pub struct CliArgs {
    /// Root URL of the chat service.
    #[arg(long, env = "CHATSYNC_URL")]
    pub base_url: Option<String>,

    /// Access token.
    #[arg(long, env = "CHATSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username of the conversation to open at start-up.
    #[arg(long)]
    pub peer: Option<String>,

    /// Path to config file (default: `~/.config/chatsync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/chatsync.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("chatsync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
