/// BlackTube CLI — looks up a YouTube URL with yt-dlp, shows the video
/// info, downloads it as video or audio and prints the download history.
///
/// LEARNING: main() is the "control context". Background tasks (lookup,
/// download) never print or touch state themselves; they send events over a
/// channel and this loop applies them to the Session one at a time.
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use blacktube::{
    AudioFormat, Config, HistoryStore, MediaKind, Notification, Quality, Session, SessionEvent,
    Settings, YtDlp,
};

#[derive(Debug, Parser)]
#[command(name = "blacktube", version, about = "Download YouTube videos and audio with yt-dlp")]
struct Cli {
    /// Video URL
    url: String,

    /// Download audio only
    #[arg(long)]
    audio: bool,

    /// Maximum video height: best, 1080p, 720p, 480p or 360p
    #[arg(long)]
    quality: Option<Quality>,

    /// Audio format when --audio is set: mp3, m4a or opus
    #[arg(long, default_value = "mp3")]
    audio_format: AudioFormat,

    /// Download directory (overrides the settings file for this run)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep the download history in this JSON file
    #[arg(long)]
    history: Option<PathBuf>,
}

/// LEARNING: #[tokio::main] transforms main() into an async function.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::from_env();
    let mut settings = Settings::load_or_default(&config.settings_path);
    if let Some(dir) = cli.output {
        settings.download_path = dir;
    }
    std::fs::create_dir_all(&settings.download_path).with_context(|| {
        format!("Failed to create {}", settings.download_path.display())
    })?;
    info!("Saving downloads to {}", settings.download_path.display());

    let history = match &cli.history {
        Some(path) => HistoryStore::persistent(path)?,
        None => HistoryStore::in_memory(),
    };
    let provider = Arc::new(YtDlp::new(config.ytdlp_path));
    let (mut session, mut events) =
        Session::new(settings, config.settings_path, provider, history);

    println!("Fetching video info...");
    session.resolve(&cli.url)?;
    while session.current().is_none() {
        let event = events.recv().await.context("Event channel closed")?;
        let failed = matches!(&event, SessionEvent::Resolved { result: Err(_), .. });
        show(session.handle_event(event));
        if failed {
            anyhow::bail!("Could not fetch video info");
        }
    }

    if let Some(video) = session.current() {
        println!("{}", video.title);
        println!("  by {}", video.author);
        println!("  Duration: {}", video.duration_label());
        println!("  Views: {}", video.views_label());
    }

    let media_kind = if cli.audio {
        MediaKind::Audio
    } else {
        session.settings().default_format
    };
    let quality = cli.quality.unwrap_or(session.settings().default_quality);
    let handle = session.start_download(media_kind, quality, cli.audio_format)?;
    println!("Preparing download...");

    let mut succeeded = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let done = match &event {
                    SessionEvent::DownloadFinished(result) => {
                        succeeded = result.is_ok();
                        true
                    }
                    _ => false,
                };
                let notification = session.handle_event(event);
                if let Some(p) = session.progress() {
                    print!(
                        "\rDownloading... {:5.1}% - Speed: {} - ETA: {}   ",
                        p.percent, p.transfer_rate_label, p.eta_label
                    );
                    let _ = std::io::stdout().flush();
                }
                if done {
                    println!();
                    show(notification);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling download");
                handle.cancel();
            }
        }
    }

    println!("\nDownloads:");
    if session.history().is_empty() {
        println!("  No downloads yet");
    }
    for record in session.history().list() {
        println!(
            "  {}  {}  [{}]  {}",
            record.date_label(),
            record.title,
            record.summary(),
            record.file_path.display()
        );
    }
    if let Some(playing) = session.now_playing() {
        println!("\nNow playing: {} ({})", playing.title, playing.summary());
    }

    if !succeeded {
        anyhow::bail!("Download did not complete");
    }
    Ok(())
}

fn show(notification: Option<Notification>) {
    match notification {
        Some(Notification { message, is_error: true }) => eprintln!("{message}"),
        Some(Notification { message, .. }) => println!("{message}"),
        None => {}
    }
}
