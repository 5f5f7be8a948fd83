/// Scripted `MediaProvider` for unit tests.
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use crate::models::ProgressEvent;
use crate::provider::{DownloadOptions, MediaProvider, RawInfo};

pub fn progress(percent: f64) -> ProgressEvent {
    ProgressEvent {
        percent,
        transfer_rate_label: "1.00MiB/s".to_string(),
        eta_label: "00:01".to_string(),
    }
}

#[derive(Default)]
pub struct FakeProvider {
    info: Option<RawInfo>,
    info_error: Option<String>,
    download_error: Option<String>,
    progress: Vec<ProgressEvent>,
    /// When set, `download` blocks until the gate is notified.
    gate: Option<Arc<Notify>>,
    /// When set, the first `download` call panics.
    panic_once: bool,
    pub info_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub last_options: Mutex<Option<DownloadOptions>>,
}

impl FakeProvider {
    pub fn with_info(info: RawInfo) -> Self {
        Self {
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn failing_info(message: &str) -> Self {
        Self {
            info_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_download(mut self, message: &str) -> Self {
        self.download_error = Some(message.to_string());
        self
    }

    pub fn with_progress(mut self, events: Vec<ProgressEvent>) -> Self {
        self.progress = events;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_once = true;
        self
    }

    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    async fn extract_info(&self, _url: &str) -> Result<RawInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        match &self.info_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.info.clone().unwrap_or_default()),
        }
    }

    async fn download(
        &self,
        _url: &str,
        options: &DownloadOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<PathBuf> {
        let call = self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_once && call == 0 {
            panic!("provider crashed");
        }
        *self.last_options.lock().unwrap() = Some(options.clone());

        for event in &self.progress {
            let _ = progress.send(event.clone());
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.download_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(options.output_dir.join(format!("{}.mp4", options.file_stem))),
        }
    }
}
