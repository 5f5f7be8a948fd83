/// Error taxonomy for the downloader.
///
/// LEARNING: `thiserror` derives `std::error::Error` and `Display` from the
/// `#[error(...)]` attributes. The binary still uses `anyhow` — a library
/// exposes typed errors, an application just reports them.
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Metadata resolution failed. Carries the provider message verbatim.
    #[error("{0}")]
    Fetch(String),

    /// A download is already running; the new one was not started.
    #[error("A download is already in progress")]
    AlreadyInProgress,

    /// Download or transcode failed. Carries the provider message verbatim.
    #[error("{0}")]
    Download(String),

    /// The download was cancelled through its handle.
    #[error("Download cancelled")]
    Cancelled,

    #[error("Please enter a URL")]
    EmptyUrl,

    #[error("Fetch a video first")]
    NoVideoSelected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
