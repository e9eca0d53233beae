// User settings, stored as JSON next to the managed tools

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::media::errors::ConvertError;
use crate::media::models::NetworkConfig;

pub const SETTINGS_FILE: &str = "settings.json";
pub const HOME_ENV: &str = "ICONV_HOME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Managed tools live under `<install_dir>/<tool>/`
    pub install_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Use a tool found on PATH before downloading one
    pub prefer_system_tools: bool,
    pub download_retries: u32,
    pub network: NetworkConfig,
    pub gif_fps: u32,
    /// Tool name -> artifact URL, replacing the built-in download
    pub tool_overrides: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            output_dir: default_output_dir(),
            prefer_system_tools: false,
            download_retries: 10,
            network: NetworkConfig::default(),
            gif_fps: 10,
            tool_overrides: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, or from `<install_dir>/settings.json` when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConvertError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&default_install_dir().join(SETTINGS_FILE)),
        }
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConvertError> {
        let config_error = |message: String| ConvertError::Config {
            path: path.to_path_buf(),
            message,
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(config_error(e.to_string())),
        };

        let settings: Settings =
            serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))?;
        if settings.gif_fps == 0 {
            return Err(config_error("gif_fps must be at least 1".to_string()));
        }
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }
}

/// `$ICONV_HOME`, else `~/.iconv`
pub fn default_install_dir() -> PathBuf {
    resolve_install_dir(std::env::var_os(HOME_ENV))
}

fn resolve_install_dir(home_override: Option<OsString>) -> PathBuf {
    match home_override.filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".iconv"),
    }
}

fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iConv")
}
