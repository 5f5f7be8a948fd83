/// The control context: owns all state the front-end reads.
///
/// Background tasks never touch this state directly. They send a
/// `SessionEvent` over the channel returned by `Session::new`, and the
/// control loop hands each one to `Session::handle_event`.
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::Settings;
use crate::download::{DownloadHandle, Orchestrator};
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::models::{
    AudioFormat, DownloadRecord, DownloadRequest, MediaKind, ProgressEvent, Quality,
    VideoDescriptor,
};
use crate::provider::MediaProvider;
use crate::resolver::Resolver;

/// Results marshaled back from background tasks.
#[derive(Debug)]
pub enum SessionEvent {
    Resolved {
        generation: u64,
        result: Result<VideoDescriptor>,
    },
    Progress(ProgressEvent),
    DownloadFinished(Result<DownloadRecord>),
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub is_error: bool,
}

pub struct Session {
    settings: Settings,
    settings_path: PathBuf,
    resolver: Resolver,
    orchestrator: Orchestrator,
    history: HistoryStore,
    current: Option<VideoDescriptor>,
    progress: Option<ProgressEvent>,
    now_playing: Option<DownloadRecord>,
    events: UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        provider: Arc<dyn MediaProvider>,
        history: HistoryStore,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            settings,
            settings_path,
            resolver: Resolver::new(Arc::clone(&provider)),
            orchestrator: Orchestrator::new(provider),
            history,
            current: None,
            progress: None,
            now_playing: None,
            events,
        };
        (session, rx)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn current(&self) -> Option<&VideoDescriptor> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Latest progress of the running download, if any.
    pub fn progress(&self) -> Option<&ProgressEvent> {
        self.progress.as_ref()
    }

    pub fn now_playing(&self) -> Option<&DownloadRecord> {
        self.now_playing.as_ref()
    }

    pub fn is_downloading(&self) -> bool {
        self.orchestrator.is_downloading()
    }

    /// Start a metadata lookup. Discards the current descriptor.
    pub fn resolve(&mut self, url: &str) -> Result<u64> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::EmptyUrl);
        }
        self.current = None;
        Ok(self.resolver.spawn(url.to_string(), self.events.clone()))
    }

    /// Download the current video into the configured download path.
    pub fn start_download(
        &mut self,
        media_kind: MediaKind,
        quality: Quality,
        audio_format: AudioFormat,
    ) -> Result<DownloadHandle> {
        let descriptor = self.current.clone().ok_or(Error::NoVideoSelected)?;
        let request = DownloadRequest {
            descriptor,
            media_kind,
            quality,
            audio_format,
        };
        let handle = self.orchestrator.start(
            request,
            self.settings.download_path.clone(),
            self.events.clone(),
        )?;
        self.progress = None;
        Ok(handle)
    }

    pub fn start_with_defaults(&mut self) -> Result<DownloadHandle> {
        let kind = self.settings.default_format;
        let quality = self.settings.default_quality;
        self.start_download(kind, quality, AudioFormat::default())
    }

    /// Apply a background result. Returns the notification to show, if any.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<Notification> {
        match event {
            SessionEvent::Resolved { generation, result } => {
                if generation != self.resolver.latest_generation() {
                    debug!("Dropping stale resolve #{}", generation);
                    return None;
                }
                match result {
                    Ok(descriptor) => {
                        info!("Resolved {} ({})", descriptor.title, descriptor.source_url);
                        self.current = Some(descriptor);
                        self.notify("Video info fetched".to_string(), false)
                    }
                    Err(e) => self.notify(format!("Error: {e}"), true),
                }
            }
            SessionEvent::Progress(event) => {
                self.progress = Some(event);
                None
            }
            SessionEvent::DownloadFinished(Ok(record)) => {
                self.progress = None;
                let message = format!("Download complete: {}", record.title);
                if self.settings.auto_play {
                    self.now_playing = Some(record.clone());
                }
                if let Err(e) = self.history.append(record) {
                    warn!("Failed to save history: {}", e);
                }
                self.notify(message, false)
            }
            SessionEvent::DownloadFinished(Err(e)) => {
                self.progress = None;
                self.notify(format!("Download failed: {e}"), true)
            }
        }
    }

    /// Select a history entry (index in most-recent-first order) for playback.
    pub fn play(&mut self, index: usize) -> Option<&DownloadRecord> {
        let record = self.history.get(index)?.clone();
        self.now_playing = Some(record);
        self.now_playing.as_ref()
    }

    pub fn set_auto_play(&mut self, enabled: bool) {
        self.settings.auto_play = enabled;
        self.persist();
    }

    pub fn set_notifications(&mut self, enabled: bool) {
        self.settings.notifications = enabled;
        self.persist();
    }

    pub fn toggle_theme(&mut self) {
        self.settings.theme = self.settings.theme.toggled();
        self.persist();
    }

    pub fn set_theme_color(&mut self, color: &str) {
        self.settings.theme_color = color.to_string();
        self.persist();
    }

    pub fn set_default_quality(&mut self, quality: Quality) {
        self.settings.default_quality = quality;
        self.persist();
    }

    pub fn set_default_format(&mut self, media_kind: MediaKind) {
        self.settings.default_format = media_kind;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            warn!("Failed to save settings: {}", e);
        }
    }

    fn notify(&self, message: String, is_error: bool) -> Option<Notification> {
        if !is_error && !self.settings.notifications {
            return None;
        }
        Some(Notification { message, is_error })
    }
}
