/// Append-only log of completed downloads.
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Result;
use crate::models::DownloadRecord;

#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Oldest first; `list()` reverses.
    records: Vec<DownloadRecord>,
    file: Option<PathBuf>,
}

impl HistoryStore {
    /// Session-only history, lost on exit.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// History backed by a JSON file. A missing file starts empty.
    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let records: Vec<DownloadRecord> = serde_json::from_str(&content)?;
            info!("Loaded {} history entries from {}", records.len(), path.display());
            records
        } else {
            Vec::new()
        };
        Ok(Self {
            records,
            file: Some(path),
        })
    }

    /// Append a record. For a persistent store the file is rewritten; the
    /// record stays in memory even if that write fails.
    pub fn append(&mut self, record: DownloadRecord) -> Result<()> {
        debug!("History append: {}", record.title);
        self.records.push(record);
        match &self.file {
            Some(path) => write_records(path, &self.records),
            None => Ok(()),
        }
    }

    /// Most recent first.
    pub fn list(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().rev()
    }

    /// Entry at `index` in `list()` order.
    pub fn get(&self, index: usize) -> Option<&DownloadRecord> {
        self.list().nth(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn write_records(path: &Path, records: &[DownloadRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}
