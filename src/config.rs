/// Configuration: process environment plus the per-user settings file.
///
/// LEARNING: In Rust, a struct is like a class without methods (data only).
/// Methods are added separately in `impl` blocks.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{MediaKind, Quality};

const SETTINGS_FILE_NAME: &str = ".blacktube_settings.json";

/// Values read from environment variables at startup.
pub struct Config {
    pub ytdlp_path: String,
    pub settings_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            ytdlp_path: env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".into()),
            settings_path: env::var("BLACKTUBE_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_settings_path()),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_settings_path() -> PathBuf {
    home_dir().join(SETTINGS_FILE_NAME)
}

pub fn default_download_path() -> PathBuf {
    home_dir().join("Downloads").join("BlackTube")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

/// User settings persisted as JSON.
///
/// LEARNING: `#[serde(default)]` on the struct fills every missing key from
/// `Default::default()`, and serde skips unknown keys unless told otherwise.
/// Together that gives "missing keys default, unknown keys ignored" for free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub download_path: PathBuf,
    pub default_quality: Quality,
    pub default_format: MediaKind,
    pub auto_play: bool,
    pub notifications: bool,
    pub theme_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            download_path: default_download_path(),
            default_quality: Quality::Best,
            default_format: MediaKind::Video,
            auto_play: false,
            notifications: true,
            theme_color: "blue".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Like `load`, but an unreadable or corrupt file only logs a warning.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
