use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from mintgate.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct MintgateConfig {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub api: ApiConfig,
}

/// Local capture server settings.
///
/// The port is fixed (no fallback scan): the signing page is served from the
/// same origin its submit endpoint lives on, so the URL handed to the browser
/// must match whatever we actually bound.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub open_browser: bool,
}

/// Polling policy for the signature waiter.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

/// Remote minting API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            open_browser: true,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        // 2s * 60 attempts = 2-minute ceiling
        Self {
            interval_secs: 2,
            max_attempts: 60,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://genobank.app".to_string(),
            timeout_secs: 10,
        }
    }
}

impl PollConfig {
    /// Poll interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Number of attempts needed to cover `ceiling_secs` of wall-clock wait,
    /// rounded up, never zero.
    pub fn attempts_for_ceiling(&self, ceiling_secs: u64) -> u32 {
        let interval = self.interval_secs.max(1);
        (ceiling_secs.div_ceil(interval) as u32).max(1)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load(path: &Path) -> Result<MintgateConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(MintgateConfig::default());
    }

    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
