/// The external media provider: yt-dlp, driven as a subprocess.
///
/// LEARNING: tokio::process::Command is the async version of std::process::Command.
/// It spawns a child process without blocking the async runtime, so the
/// control loop keeps running while yt-dlp works.
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{AudioFormat, ProgressEvent};

const PROGRESS_PREFIX: &str = "blacktube:";
const FILEPATH_PREFIX: &str = "blacktube-file:";

/// Subset of yt-dlp's info JSON we care about. Every field may be absent.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawInfo {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<i64>,
    pub webpage_url: Option<String>,
}

/// Everything the provider needs to run one download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// yt-dlp format selector, e.g. `bestvideo+bestaudio/best`.
    pub format: String,
    /// Transcode to this format after download (audio only).
    pub extract_audio: Option<AudioFormat>,
    pub audio_quality: String,
    pub output_dir: PathBuf,
    /// Sanitized title; the provider appends the extension.
    pub file_stem: String,
}

impl DownloadOptions {
    pub fn output_template(&self) -> String {
        self.output_dir
            .join(format!("{}.%(ext)s", self.file_stem))
            .to_string_lossy()
            .into_owned()
    }

    /// Command-line arguments for yt-dlp, without the URL.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_string(), self.format.clone()];

        if let Some(format) = self.extract_audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(format.to_string());
            args.push("--audio-quality".to_string());
            args.push(self.audio_quality.clone());
        }

        args.extend([
            "-o".to_string(),
            self.output_template(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_PREFIX}%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s"
            ),
            "--print".to_string(),
            format!("after_move:{FILEPATH_PREFIX}%(filepath)s"),
        ]);
        args
    }
}

/// Black-box capability to look up and download remote media.
///
/// LEARNING: `#[async_trait]` boxes the returned futures so the trait can be
/// used as `Arc<dyn MediaProvider>`. Tests swap in a fake implementation.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn extract_info(&self, url: &str) -> Result<RawInfo>;

    /// Download `url`, sending progress as it arrives. Returns the final file path.
    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<PathBuf>;
}

pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProvider for YtDlp {
    async fn extract_info(&self, url: &str) -> Result<RawInfo> {
        debug!("Fetching info for {}", url);
        let output = Command::new(&self.program)
            .args(["-J", "--no-warnings", "--no-playlist", url])
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{}", error_message(&stderr, output.status));
        }

        let info: RawInfo =
            serde_json::from_slice(&output.stdout).context("Failed to parse yt-dlp output")?;
        Ok(info)
    }

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<PathBuf> {
        info!("Downloading {} with {}...", url, self.program);

        // kill_on_drop: a cancelled download drops this future, which must
        // take the child process down with it.
        let mut child = Command::new(&self.program)
            .args(options.to_args())
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        let stdout = child.stdout.take().context("Could not capture yt-dlp stdout")?;
        let mut stderr = child.stderr.take().context("Could not capture yt-dlp stderr")?;

        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut printed_path = None;
            while let Some(line) = lines.next_line().await? {
                if let Some(event) = parse_progress_line(&line) {
                    // The receiver may be gone if nobody watches progress.
                    let _ = progress.send(event);
                } else if let Some(path) = line.trim().strip_prefix(FILEPATH_PREFIX) {
                    printed_path = Some(PathBuf::from(path));
                }
            }
            Ok::<_, std::io::Error>(printed_path)
        };
        let read_stderr = async {
            let mut errors = String::new();
            stderr.read_to_string(&mut errors).await.map(|_| errors)
        };

        // LEARNING: both pipes must be drained concurrently, otherwise a full
        // stderr buffer can block yt-dlp while we wait on stdout.
        let (printed_path, errors) = tokio::join!(read_stdout, read_stderr);
        let printed_path = printed_path.context("Failed to read yt-dlp output")?;
        let errors = errors.context("Failed to read yt-dlp errors")?;

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        if !status.success() {
            error!("yt-dlp failed for {}: {}", url, errors.trim());
            anyhow::bail!("{}", error_message(&errors, status));
        }

        match printed_path {
            Some(path) => Ok(path),
            None => find_downloaded_file(&options.output_dir, &options.file_stem),
        }
    }
}

/// Parse one `blacktube:<percent>|<speed>|<eta>` progress line.
/// Returns None for any other output.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut parts = rest.splitn(3, '|');

    let percent = parts
        .next()?
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())?;
    let label = |part: Option<&str>| {
        part.map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("N/A")
            .to_string()
    };

    Some(ProgressEvent {
        percent: percent.clamp(0.0, 100.0),
        transfer_rate_label: label(parts.next()),
        eta_label: label(parts.next()),
    })
}

/// Last `ERROR:` line on stderr, else the last non-empty line, else the exit status.
fn error_message(stderr: &str, status: std::process::ExitStatus) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.to_string())
        .unwrap_or_else(|| format!("yt-dlp exited with {}", status))
}

/// Find the file yt-dlp created when it didn't print the final path
/// (we don't know the extension ahead of time).
///
/// LEARNING: `std::fs::read_dir` returns an iterator of Result<DirEntry>.
/// We use `.filter_map(|e| e.ok())` to skip any errors and unwrap the Ok values.
fn find_downloaded_file(dir: &Path, file_stem: &str) -> Result<PathBuf> {
    let prefix = format!("{}.", file_stem);
    for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with(&prefix) && !name_str.ends_with(".part") {
            return Ok(entry.path());
        }
    }
    anyhow::bail!("Downloaded file not found for {}", file_stem)
}
