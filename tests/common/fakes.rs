use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use autofanfic::fanfic::{
    CatalogEntry, CatalogUpdater, DownloadOutcome, Downloader, EffectiveMode, LocalArtifact,
    OutcomeStatus, UpdateRequest,
};
use autofanfic::notifications::{NotificationEvent, NotificationKind, Notifier};
use tokio::time::Instant;

/// One recorded downloader invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub started: Instant,
    pub finished: Instant,
    pub url: String,
    pub site_key: String,
    pub mode: EffectiveMode,
    /// 1-based attempt number of the job
    pub attempt: u32,
}

/// Downloader answering from a per-URL script.
///
/// URLs without a script (or whose script ran out) use `fallback`. Every
/// call takes `latency` of (virtual) time.
pub struct ScriptedDownloader {
    scripts: Mutex<HashMap<String, VecDeque<OutcomeStatus>>>,
    fallback: OutcomeStatus,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedDownloader {
    pub fn new(fallback: OutcomeStatus) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_script(self, url: &str, steps: Vec<OutcomeStatus>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.url == url).collect()
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn run_update(&self, request: &UpdateRequest) -> anyhow::Result<DownloadOutcome> {
        let started = Instant::now();
        tokio::time::sleep(self.latency).await;

        let status = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(self.fallback);

        self.calls.lock().unwrap().push(Call {
            started,
            finished: Instant::now(),
            url: request.url.clone(),
            site_key: request.site_key.clone(),
            mode: request.mode,
            attempt: request.attempt,
        });

        Ok(match status {
            OutcomeStatus::Success => DownloadOutcome::success(
                "Successfully updated",
                LocalArtifact::new(
                    PathBuf::from("Some Story-Some Author.epub"),
                    &request.url,
                    &request.site_key,
                ),
            ),
            OutcomeStatus::NeedsForceRetry => {
                DownloadOutcome::needs_force("Chapter difference, force required")
            }
            OutcomeStatus::Failure => DownloadOutcome::failure("Story not found"),
        })
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    pub added: Mutex<Vec<String>>,
}

#[async_trait]
impl CatalogUpdater for MemoryCatalog {
    async fn add_or_update(&self, artifact: &LocalArtifact) -> anyhow::Result<CatalogEntry> {
        self.added.lock().unwrap().push(artifact.url.clone());
        Ok(CatalogEntry {
            calibre_id: Some(self.added.lock().unwrap().len().to_string()),
            title: artifact.title(),
            path: artifact.epub_path.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
