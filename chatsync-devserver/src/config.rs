//! Configuration for the development server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatsync-devserver/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading server configuration.
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

    /// A `--user` value is not of the form `name:token`.
    #[error("invalid account {0:?}, expected name:token")]
    InvalidAccount(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the server.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DevConfigFile {
    server: ServerFileConfig,
    users: Vec<AccountFileConfig>,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    online_window_secs: Option<u64>,
}

/// One `[[users]]` entry of the config file.
#[derive(Debug, Clone, serde::Deserialize)]
struct AccountFileConfig {
    username: String,
    token: String,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the development server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "In-memory development server for chatsync")]
pub struct DevCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "CHATSYNC_DEVSERVER_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/chatsync-devserver/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed account as `name:token`. Repeat for several accounts.
    #[arg(short, long = "user")]
    pub users: Vec<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATSYNC_DEVSERVER_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// A seeded account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Display name.
    pub username: String,
    /// Bearer token that signs in as this account.
    pub token: String,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Address to bind the server to (e.g., `127.0.0.1:8000`).
    pub bind_addr: String,
    /// How long a user counts as online after their last request.
    pub online_window: Duration,
    /// Accounts created at start-up.
    pub accounts: Vec<Account>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            online_window: Duration::from_secs(10),
            accounts: ["alice", "bob", "carol"]
                .into_iter()
                .map(|name| Account {
                    username: name.to_string(),
                    token: format!("{name}-token"),
                })
                .collect(),
            log_level: "info".to_string(),
        }
    }
}

impl DevConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a `--user` value is malformed.
    pub fn load(cli: &DevCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `DevConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Accounts are taken from the first
    /// layer that names any.
    fn resolve(cli: &DevCliArgs, file: &DevConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let accounts = if !cli.users.is_empty() {
            cli.users
                .iter()
                .map(|raw| parse_account(raw))
                .collect::<Result<Vec<_>, _>>()?
        } else if !file.users.is_empty() {
            file.users
                .iter()
                .map(|a| Account {
                    username: a.username.clone(),
                    token: a.token.clone(),
                })
                .collect()
        } else {
            defaults.accounts
        };

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            online_window: file
                .server
                .online_window_secs
                .map_or(defaults.online_window, Duration::from_secs),
            accounts,
            log_level: cli.log_level.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_account(raw: &str) -> Result<Account, ConfigError> {
    match raw.split_once(':') {
        Some((name, token)) if !name.is_empty() && !token.is_empty() => Ok(Account {
            username: name.to_string(),
            token: token.to_string(),
        }),
        _ => Err(ConfigError::InvalidAccount(raw.to_string())),
    }
}

/// Load and parse a TOML config file for the server.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<DevConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(DevConfigFile::default());
        };
        config_dir.join("chatsync-devserver").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DevConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
