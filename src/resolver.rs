/// Metadata lookup: URL → `VideoDescriptor`.
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{Error, Result};
use crate::models::VideoDescriptor;
use crate::provider::{MediaProvider, RawInfo};
use crate::session::SessionEvent;

/// Normalize provider metadata, filling in defaults for missing fields.
pub fn descriptor_from_info(url: &str, info: RawInfo) -> VideoDescriptor {
    let duration_seconds = match info.duration {
        Some(d) if d.is_finite() && d > 0.0 => d as u64,
        _ => 0,
    };

    VideoDescriptor {
        source_url: info.webpage_url.unwrap_or_else(|| url.to_string()),
        title: info.title.unwrap_or_else(|| "untitled".to_string()),
        author: info
            .uploader
            .or(info.channel)
            .unwrap_or_else(|| "unknown".to_string()),
        duration_seconds,
        view_count: info.view_count.unwrap_or(0).max(0) as u64,
    }
}

/// Single attempt, no retry. Provider errors come back verbatim as `Error::Fetch`.
pub async fn resolve(provider: &dyn MediaProvider, url: &str) -> Result<VideoDescriptor> {
    match provider.extract_info(url).await {
        Ok(info) => Ok(descriptor_from_info(url, info)),
        Err(e) => {
            warn!("Failed to fetch info for {}: {:#}", url, e);
            Err(Error::Fetch(format!("{e:#}")))
        }
    }
}

/// Runs lookups on background tasks and numbers them, so the session can
/// tell a stale result from the latest one.
pub struct Resolver {
    provider: Arc<dyn MediaProvider>,
    last_generation: u64,
}

impl Resolver {
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self {
            provider,
            last_generation: 0,
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.last_generation
    }

    /// Start a lookup. The result arrives as `SessionEvent::Resolved`
    /// carrying the returned generation.
    pub fn spawn(&mut self, url: String, events: UnboundedSender<SessionEvent>) -> u64 {
        self.last_generation += 1;
        let generation = self.last_generation;
        let provider = Arc::clone(&self.provider);

        debug!("Resolve #{} started for {}", generation, url);
        tokio::spawn(async move {
            let result = resolve(provider.as_ref(), &url).await;
            // Session gone means nobody is interested any more.
            let _ = events.send(SessionEvent::Resolved { generation, result });
        });
        generation
    }
}
