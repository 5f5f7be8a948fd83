/// Data models shared by the resolver, the orchestrator and the history.
///
/// LEARNING: Serde's derive macros auto-generate JSON serialization code.
/// #[serde(rename_all = "lowercase")] → `MediaKind::Video` becomes "video".
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Normalized metadata for a remote video. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDescriptor {
    pub source_url: String,
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
    pub view_count: u64,
}

impl VideoDescriptor {
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }

    pub fn views_label(&self) -> String {
        format_views(self.view_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Maximum video height. Only meaningful for video downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl Quality {
    /// Height limit in pixels, `None` for best available.
    pub fn height(self) -> Option<u32> {
        match self {
            Self::Best => None,
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.height() {
            Some(h) => write!(f, "{h}p"),
            None => write!(f, "best"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(Self::Best),
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "480p" => Ok(Self::P480),
            "360p" => Ok(Self::P360),
            other => Err(format!("unknown quality: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Opus,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mp3 => write!(f, "mp3"),
            Self::M4a => write!(f, "m4a"),
            Self::Opus => write!(f, "opus"),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp3" => Ok(Self::Mp3),
            "m4a" => Ok(Self::M4a),
            "opus" => Ok(Self::Opus),
            other => Err(format!("unknown audio format: {other}")),
        }
    }
}

/// One download attempt. Consumed by `Orchestrator::start`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub descriptor: VideoDescriptor,
    pub media_kind: MediaKind,
    /// Ignored for audio.
    pub quality: Quality,
    /// Ignored for video.
    pub audio_format: AudioFormat,
}

/// Incremental progress reported by the provider while a download runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub percent: f64,
    pub transfer_rate_label: String,
    pub eta_label: String,
}

/// A completed download, as shown in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub title: String,
    pub media_kind: MediaKind,
    pub quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<AudioFormat>,
    pub timestamp: DateTime<Local>,
    pub file_path: PathBuf,
}

impl DownloadRecord {
    /// "VIDEO - 720p" or "AUDIO - mp3".
    pub fn summary(&self) -> String {
        let detail = match (self.media_kind, self.audio_format) {
            (MediaKind::Audio, Some(format)) => format.to_string(),
            _ => self.quality.to_string(),
        };
        format!("{} - {}", self.media_kind.to_string().to_uppercase(), detail)
    }

    pub fn date_label(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Format seconds into H:MM:SS or M:SS.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Group digits by thousands: 1234567 → "1,234,567".
pub fn format_views(views: u64) -> String {
    let digits = views.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
