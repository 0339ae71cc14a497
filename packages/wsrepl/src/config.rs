use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Tunables (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [history]
//                    request_limit = 500
//
//   env var:         WSREPL_HISTORY__REQUEST_LIMIT=500   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub history: HistoryFileConfig,
    #[serde(default)]
    pub channels: ChannelFileConfig,
    #[serde(default)]
    pub editor: EditorFileConfig,
    /// Overrides `<data_dir>/macros`.
    #[serde(default)]
    pub macros_dir: Option<PathBuf>,
}

/// How many entries each history file keeps (lives under `[history]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryFileConfig {
    #[serde(default = "default_history_limit")]
    pub request_limit: usize,
    #[serde(default = "default_history_limit")]
    pub command_limit: usize,
}

impl Default for HistoryFileConfig {
    fn default() -> Self {
        Self {
            request_limit: default_history_limit(),
            command_limit: default_history_limit(),
        }
    }
}

/// Bounded channel capacities (lives under `[channels]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelFileConfig {
    #[serde(default = "default_message_capacity")]
    pub messages: usize,
    #[serde(default = "default_key_capacity")]
    pub keys: usize,
}

impl Default for ChannelFileConfig {
    fn default() -> Self {
        Self {
            messages: default_message_capacity(),
            keys: default_key_capacity(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditorFileConfig {
    /// Keys closer together than this count as pasted input.
    #[serde(default = "default_paste_threshold_us")]
    pub paste_threshold_us: u64,
}

impl Default for EditorFileConfig {
    fn default() -> Self {
        Self {
            paste_threshold_us: default_paste_threshold_us(),
        }
    }
}

impl EditorFileConfig {
    pub fn paste_threshold(&self) -> Duration {
        Duration::from_micros(self.paste_threshold_us)
    }
}

fn default_history_limit() -> usize {
    100
}

fn default_message_capacity() -> usize {
    100
}

fn default_key_capacity() -> usize {
    64
}

fn default_paste_threshold_us() -> u64 {
    line_editor::editor::PASTE_THRESHOLD.as_micros() as u64
}

/// Builds the layered figment: struct defaults, then `config.toml` in the
/// data directory, then `WSREPL_*` env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("WSREPL_").split("__"))
}

// =============================================================================
// Directory layout (derived from --data-dir, not tunable)
// =============================================================================

#[derive(Clone, Debug)]
pub struct WsReplConfig {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl WsReplConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".wsrepl"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self { data_dir, logs_dir })
    }

    pub fn request_history_path(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn command_history_path(&self) -> PathBuf {
        self.data_dir.join("cmd_history")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("wsrepl.log")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// `configured` wins over `<data_dir>/macros`.
    pub fn macros_dir(&self, configured: Option<&Path>) -> PathBuf {
        configured
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.data_dir.join("macros"))
    }
}
