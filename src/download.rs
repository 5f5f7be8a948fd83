/// Download orchestration: one background job at a time.
///
/// LEARNING: The "only one download" rule is a Semaphore with a single
/// permit. The permit moves into the spawned task and is released when it is
/// dropped (RAII pattern), so success, failure, cancellation and even a panic
/// all free the slot without any manual bookkeeping.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{error, info};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::{DownloadRecord, DownloadRequest, MediaKind, ProgressEvent, Quality};
use crate::provider::{DownloadOptions, MediaProvider};
use crate::session::SessionEvent;

/// Target bitrate for extracted audio.
pub const AUDIO_QUALITY: &str = "192K";

/// Keep only alphanumerics, spaces, hyphens and underscores.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// yt-dlp format selector for a media kind and quality.
pub fn format_selector(media_kind: MediaKind, quality: Quality) -> String {
    match (media_kind, quality.height()) {
        (MediaKind::Audio, _) => "bestaudio/best".to_string(),
        (MediaKind::Video, None) => "bestvideo+bestaudio/best".to_string(),
        (MediaKind::Video, Some(h)) => {
            format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")
        }
    }
}

pub fn download_options(request: &DownloadRequest, output_dir: &Path) -> DownloadOptions {
    DownloadOptions {
        format: format_selector(request.media_kind, request.quality),
        extract_audio: match request.media_kind {
            MediaKind::Audio => Some(request.audio_format),
            MediaKind::Video => None,
        },
        audio_quality: AUDIO_QUALITY.to_string(),
        output_dir: output_dir.to_path_buf(),
        file_stem: sanitize_title(&request.descriptor.title),
    }
}

/// Handle to a running download.
pub struct DownloadHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DownloadHandle {
    /// Stop the download. The job finishes with `Error::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct Orchestrator {
    provider: Arc<dyn MediaProvider>,
    slot: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self {
            provider,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Launch a download into `output_dir`.
    ///
    /// Progress arrives as `SessionEvent::Progress`, the outcome as exactly one
    /// `SessionEvent::DownloadFinished`. Fails immediately with
    /// `AlreadyInProgress` if another job holds the slot.
    pub fn start(
        &self,
        request: DownloadRequest,
        output_dir: PathBuf,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<DownloadHandle> {
        let permit = Arc::clone(&self.slot)
            .try_acquire_owned()
            .map_err(|_| Error::AlreadyInProgress)?;

        let provider = Arc::clone(&self.provider);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(
            "Download started: {} ({}, {})",
            request.descriptor.title, request.media_kind, request.quality
        );

        let title = request.descriptor.title.clone();
        let task = tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
            let forward = events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = progress_rx.recv().await {
                    let _ = forward.send(SessionEvent::Progress(event));
                }
            });

            // LEARNING: the job runs in its own task so a panic inside the
            // provider surfaces here as a JoinError instead of unwinding
            // through this task and skipping the final event.
            let job = tokio::spawn(async move {
                run_job(provider.as_ref(), &request, &output_dir, progress_tx, &token).await
            });
            let result = match job.await {
                Ok(result) => result,
                Err(e) => Err(Error::Download(format!("Download task failed: {e}"))),
            };

            // All progress goes out before the final event.
            let _ = forwarder.await;
            // Release the slot first so a caller reacting to the event can start again.
            drop(permit);

            match &result {
                Ok(record) => info!("Download finished: {}", record.file_path.display()),
                Err(e) => error!("Download failed for {}: {}", title, e),
            }
            let _ = events.send(SessionEvent::DownloadFinished(result));
        });

        Ok(DownloadHandle { cancel, task })
    }
}

async fn run_job(
    provider: &dyn MediaProvider,
    request: &DownloadRequest,
    output_dir: &Path,
    progress: UnboundedSender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<DownloadRecord> {
    let options = download_options(request, output_dir);
    let url = &request.descriptor.source_url;

    let work = async {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::Download(format!("{}: {}", output_dir.display(), e)))?;
        provider
            .download(url, &options, progress)
            .await
            .map_err(|e| Error::Download(format!("{e:#}")))
    };

    // LEARNING: `select!` races the two futures. If cancellation wins, the
    // work future is dropped, and with it the yt-dlp child process.
    // `biased` checks the token first, so an early cancel never reaches yt-dlp.
    let file_path = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = work => result?,
    };

    Ok(DownloadRecord {
        title: request.descriptor.title.clone(),
        media_kind: request.media_kind,
        quality: request.quality,
        audio_format: options.extract_audio,
        timestamp: Local::now(),
        file_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioFormat, VideoDescriptor};
    use crate::testing::{progress, FakeProvider};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn request(title: &str, media_kind: MediaKind, quality: Quality) -> DownloadRequest {
        DownloadRequest {
            descriptor: VideoDescriptor {
                source_url: "https://youtube.com/watch?v=abc".to_string(),
                title: title.to_string(),
                author: "someone".to_string(),
                duration_seconds: 10,
                view_count: 5,
            },
            media_kind,
            quality,
            audio_format: AudioFormat::Mp3,
        }
    }

    /// Collect events until the job reports its outcome.
    async fn until_finished(
        rx: &mut UnboundedReceiver<SessionEvent>,
    ) -> (Vec<ProgressEvent>, Result<DownloadRecord>) {
        let mut seen = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                SessionEvent::Progress(p) => seen.push(p),
                SessionEvent::DownloadFinished(result) => return (seen, result),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("My Video!!"), "My Video");
        assert_eq!(sanitize_title("  a/b\\c: d_e-f? "), "abc d_e-f");
        assert_eq!(sanitize_title("Café 2024"), "Café 2024");
        assert_eq!(sanitize_title("!!!"), "untitled");
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(
            format_selector(MediaKind::Audio, Quality::P720),
            "bestaudio/best"
        );
        assert_eq!(
            format_selector(MediaKind::Video, Quality::Best),
            "bestvideo+bestaudio/best"
        );
        assert_eq!(
            format_selector(MediaKind::Video, Quality::P480),
            "bestvideo[height<=480]+bestaudio/best[height<=480]"
        );
    }

    #[test]
    fn test_download_options_for_audio() {
        let dir = tempfile::tempdir().unwrap();
        let opts = download_options(&request("My Video!!", MediaKind::Audio, Quality::Best), dir.path());
        assert_eq!(opts.extract_audio, Some(AudioFormat::Mp3));
        assert_eq!(opts.audio_quality, "192K");
        assert_eq!(opts.file_stem, "My Video");
        assert_eq!(opts.output_dir, dir.path());
    }

    #[tokio::test]
    async fn test_successful_download_produces_record() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("downloads");
        let provider = Arc::new(
            FakeProvider::default().with_progress(vec![progress(10.0), progress(100.0)]),
        );
        let orchestrator = Orchestrator::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .start(request("My Video!!", MediaKind::Video, Quality::P720), out.clone(), tx)
            .unwrap();
        let (seen, result) = until_finished(&mut rx).await;

        let record = result.unwrap();
        assert_eq!(record.title, "My Video!!");
        assert_eq!(record.quality, Quality::P720);
        assert_eq!(record.audio_format, None);
        assert_eq!(record.file_path, out.join("My Video.mp4"));
        assert!(out.is_dir());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].percent, 100.0);
        assert!(!orchestrator.is_downloading());

        let options = provider.last_options.lock().unwrap().clone().unwrap();
        assert_eq!(
            options.format,
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_without_calling_provider() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, gate) = FakeProvider::default().gated();
        let provider = Arc::new(provider);
        let orchestrator = Orchestrator::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .start(request("one", MediaKind::Video, Quality::Best), dir.path().to_path_buf(), tx.clone())
            .unwrap();
        assert!(orchestrator.is_downloading());

        let second = orchestrator.start(
            request("two", MediaKind::Video, Quality::Best),
            dir.path().to_path_buf(),
            tx,
        );
        assert!(matches!(second, Err(Error::AlreadyInProgress)));

        gate.notify_one();
        let (_, result) = until_finished(&mut rx).await;
        assert_eq!(result.unwrap().title, "one");
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_released_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default().failing_download("ERROR: HTTP Error 403"));
        let orchestrator = Orchestrator::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .start(request("a", MediaKind::Audio, Quality::Best), dir.path().to_path_buf(), tx.clone())
            .unwrap();
        let (_, result) = until_finished(&mut rx).await;
        match result {
            Err(Error::Download(msg)) => assert_eq!(msg, "ERROR: HTTP Error 403"),
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(!orchestrator.is_downloading());
        orchestrator
            .start(request("b", MediaKind::Audio, Quality::Best), dir.path().to_path_buf(), tx)
            .unwrap();
        let _ = until_finished(&mut rx).await;
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_panic_still_reports_finished() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeProvider::default().panicking());
        let orchestrator = Orchestrator::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .start(request("crash", MediaKind::Video, Quality::Best), dir.path().to_path_buf(), tx.clone())
            .unwrap();
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), until_finished(&mut rx))
            .await
            .expect("finished event after panic");
        assert!(matches!(result, Err(Error::Download(_))));
        assert!(!orchestrator.is_downloading());

        // Still usable afterwards.
        orchestrator
            .start(request("again", MediaKind::Video, Quality::Best), dir.path().to_path_buf(), tx)
            .unwrap();
        let _ = until_finished(&mut rx).await;
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_job_runs_skips_provider_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never");
        let provider = Arc::new(FakeProvider::default());
        let orchestrator = Orchestrator::new(provider.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = orchestrator
            .start(request("early", MediaKind::Video, Quality::Best), out.clone(), tx)
            .unwrap();
        handle.cancel();

        let (_, result) = until_finished(&mut rx).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 0);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_job_and_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (provider, _gate) = FakeProvider::default().gated();
        let orchestrator = Orchestrator::new(Arc::new(provider));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = orchestrator
            .start(request("slow", MediaKind::Video, Quality::Best), dir.path().to_path_buf(), tx)
            .unwrap();
        handle.cancel();

        let (_, result) = until_finished(&mut rx).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!orchestrator.is_downloading());
    }
}
