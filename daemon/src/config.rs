//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// How long the control surface keeps a status or error message visible
pub const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(5);

const DEFAULT_INTERPRETER_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-pro";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 100;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Interpretation service settings
    pub interpreter: InterpreterConfig,

    /// Delay the control surface waits before clearing status text
    pub status_clear_delay: Duration,
}

/// Settings for the remote interpretation service
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Scheme and host of the service, without a trailing path
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INTERPRETER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match lookup("VOICE_NAV_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("voice-nav")
            }
        };

        let socket_path = lookup("VOICE_NAV_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = InterpreterConfig::default();
        let interpreter = InterpreterConfig {
            base_url: lookup("VOICE_NAV_INTERPRETER_URL").unwrap_or(defaults.base_url),
            model: lookup("VOICE_NAV_MODEL").unwrap_or(defaults.model),
            max_output_tokens: parse_var(&lookup, "VOICE_NAV_MAX_OUTPUT_TOKENS")?
                .unwrap_or(defaults.max_output_tokens),
            request_timeout: parse_var(&lookup, "VOICE_NAV_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        };

        Ok(Self {
            socket_path,
            data_dir,
            interpreter,
            status_clear_delay: STATUS_CLEAR_DELAY,
        })
    }

    /// File holding the durable credential
    pub fn credential_path(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
