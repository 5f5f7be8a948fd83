//! BlackTube — fetch YouTube video info and download video or audio through
//! yt-dlp, with a session-wide download history.
//!
//! The library has no UI. A front-end owns a [`Session`], forwards user
//! actions to it, and feeds it the [`SessionEvent`]s that background tasks
//! send back over its channel.

pub mod config;
pub mod download;
pub mod error;
pub mod history;
pub mod models;
pub mod provider;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{Config, Settings, Theme};
pub use download::{format_selector, sanitize_title, DownloadHandle, Orchestrator};
pub use error::{Error, Result};
pub use history::HistoryStore;
pub use models::{
    format_duration, format_views, AudioFormat, DownloadRecord, DownloadRequest, MediaKind,
    ProgressEvent, Quality, VideoDescriptor,
};
pub use provider::{DownloadOptions, MediaProvider, RawInfo, YtDlp};
pub use resolver::{resolve, Resolver};
pub use session::{Notification, Session, SessionEvent};
