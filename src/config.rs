//! Configuration types for the plugin.
//!
//! Every field has a default, so the plugin runs without a config file. The
//! file is only needed to point at a non-standard LM Studio port, to relocate
//! the `lms` binary, or to turn on file logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LMSTUDIO_DECK_CONFIG";

/// Top-level plugin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// LM Studio REST API settings.
    pub lmstudio: LmStudioConfig,
    /// `lms` command-line tool settings.
    pub cli: CliConfig,
    /// Controller host reconnect policy.
    pub reconnect: ReconnectConfig,
    /// Chat completion request defaults.
    pub chat: ChatConfig,
    /// Button action timings.
    pub actions: ActionsConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// LM Studio REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LmStudioConfig {
    /// Base URL of the LM Studio server.
    pub base_url: String,
    /// Request timeout in seconds. Generation can be slow, so this is long.
    pub timeout_secs: u64,
}

impl Default for LmStudioConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_owned(),
            timeout_secs: 300,
        }
    }
}

impl LmStudioConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `lms` command-line tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Explicit path to `lms`. `None` searches `PATH` and `~/.lmstudio/bin`.
    pub binary: Option<PathBuf>,
    /// Timeout for a single `lms` invocation in seconds.
    pub timeout_secs: u64,
    /// Pause after `lms server start` before reporting success, in milliseconds.
    pub start_settle_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout_secs: 30,
            start_settle_ms: 2_000,
        }
    }
}

/// Controller host reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between a lost connection and the next dial, in milliseconds.
    pub delay_ms: u64,
    /// Upper bound of uniformly random extra delay, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            jitter_ms: 0,
        }
    }
}

/// Chat completion request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model id sent when a button does not name one.
    pub default_model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum response tokens; `-1` means unbounded.
    pub max_tokens: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: "local-model".to_owned(),
            temperature: 0.7,
            max_tokens: -1,
        }
    }
}

/// Button action timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// How long the process-clipboard button shows "Success", in milliseconds.
    pub title_restore_ms: u64,
    /// Characters of a quick-chat reply shown on the button.
    pub preview_chars: usize,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            title_restore_ms: 3_000,
            preview_chars: 50,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for daily rolling log files. `None` logs to stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lmstudio_deck=info".to_owned(),
            directory: None,
        }
    }
}

impl PluginConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::PluginError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PluginError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the config file path: `$LMSTUDIO_DECK_CONFIG`, else
    /// `<config dir>/lmstudio-deck/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("lmstudio-deck")
            .join("config.toml")
    }

    /// Load the config at `path` if it exists, otherwise use defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
