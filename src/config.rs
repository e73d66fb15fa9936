use crate::error::ConfigError;
use crate::list::ListConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn app_dir() -> PathBuf {
    home_dir().join(".scribe")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub cancel_timeout_ms: u64,
    pub history_page_size: usize,
    /// Delay between chunks emitted by the local echo backend.
    pub echo_delay_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: 3000,
            history_page_size: 30,
            echo_delay_ms: 25,
        }
    }
}

impl ChatSettings {
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn echo_delay(&self) -> Duration {
        Duration::from_millis(self.echo_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub list: ListConfig,
    pub chat: ChatSettings,
    pub log_filter: String,
    pub sessions_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            list: ListConfig::default(),
            chat: ChatSettings::default(),
            log_filter: "scribe=info".to_string(),
            sessions_dir: None,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        app_dir().join("config.json")
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("sessions"))
    }
}
