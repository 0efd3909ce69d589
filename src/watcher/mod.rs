//! Watch-folder intake.
//!
//! Polls a directory for `*.url` files, each holding a single story URL, and
//! submits their contents to the dispatcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fanfic::{DispatchError, Dispatcher, SubmitOutcome};

/// Errors that can occur while reading a URL file.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty URL file: {0:?}")]
    EmptyFile(PathBuf),
}

/// Counters for one folder scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub submitted: usize,
    pub disabled: usize,
    pub empty: usize,
    pub errors: usize,
}

pub struct FolderWatcher {
    folder: PathBuf,
    interval: Duration,
    dispatcher: Arc<Dispatcher>,
}

impl FolderWatcher {
    pub fn new(folder: impl Into<PathBuf>, interval: Duration, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            folder: folder.into(),
            interval,
            dispatcher,
        }
    }

    /// Scan every `interval` until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting folder watcher on: {:?}", self.folder);
        info!("Check interval: {} seconds", self.interval.as_secs());

        loop {
            match self.scan_once().await {
                Ok(summary) if summary != ScanSummary::default() => {
                    debug!("Folder scan: {:?}", summary)
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to scan {:?}: {}", self.folder, e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    info!("Folder watcher shutting down");
                    break;
                }
            }
        }
    }

    /// Process the `*.url` files currently in the folder.
    ///
    /// A file is removed once its URL has been accepted by the dispatcher or
    /// when it is empty. Unreadable files and files seen while the dispatcher
    /// is shutting down stay in place for the next run.
    pub async fn scan_once(&self) -> Result<ScanSummary, WatcherError> {
        let mut summary = ScanSummary::default();

        for path in list_url_files(&self.folder).await? {
            let url = match read_url_file(&path).await {
                Ok(url) => url,
                Err(WatcherError::EmptyFile(_)) => {
                    warn!("Removing empty URL file {:?}", path);
                    remove_file(&path).await;
                    summary.empty += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Error processing {:?}: {}", path, e);
                    summary.errors += 1;
                    continue;
                }
            };

            match self.dispatcher.submit(&url, false).await {
                Ok(outcome) => {
                    debug!("Found URL in {:?}: {}", path, url);
                    match outcome {
                        SubmitOutcome::Enqueued { .. } => summary.submitted += 1,
                        SubmitOutcome::SiteDisabled { .. } => summary.disabled += 1,
                    }
                    remove_file(&path).await;
                }
                Err(DispatchError::ShuttingDown) => {
                    info!("Dispatcher shutting down, leaving {:?} for the next run", path);
                    break;
                }
            }
        }

        Ok(summary)
    }
}

/// `*.url` files in `folder`, sorted by name.
async fn list_url_files(folder: &Path) -> Result<Vec<PathBuf>, WatcherError> {
    let mut entries = fs::read_dir(folder).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "url") && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Trimmed contents of a URL file.
pub async fn read_url_file(path: &Path) -> Result<String, WatcherError> {
    let content = fs::read_to_string(path).await?;
    let url = content.trim();
    if url.is_empty() {
        return Err(WatcherError::EmptyFile(path.to_path_buf()));
    }
    Ok(url.to_string())
}

async fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!("Failed to remove {:?}: {}", path, e);
    }
}
