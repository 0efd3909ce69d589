//! Common test infrastructure
//!
//! A `Pipeline` wires a real dispatcher, site workers and retry policy to
//! in-memory fakes for the downloader, the catalog and the notifier. Tests
//! run on a paused tokio clock, so multi-hour retry schedules complete
//! instantly.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{Pipeline, ScriptedDownloader};
//! use autofanfic::fanfic::{OutcomeStatus, UpdateMethod};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_success() {
//!     let pipeline = Pipeline::builder(ScriptedDownloader::new(OutcomeStatus::Success)).build();
//!     pipeline.submit("https://archiveofourown.org/works/1").await;
//!     pipeline.wait_for_notifications(1).await;
//! }
//! ```

#![allow(dead_code)]

mod fakes;

use std::sync::Arc;
use std::time::Duration;

use autofanfic::fanfic::{
    Dispatcher, OutcomeStatus, RetryPolicy, SiteRouter, SubmitOutcome, UpdateMethod, WorkerContext,
};
use tokio_util::sync::CancellationToken;

pub use fakes::{Call, MemoryCatalog, RecordingNotifier, ScriptedDownloader};

pub const MINUTE: Duration = Duration::from_secs(60);
pub const HOUR: Duration = Duration::from_secs(3600);

pub struct PipelineBuilder {
    downloader: ScriptedDownloader,
    update_method: UpdateMethod,
    disabled_sites: Vec<String>,
}

impl PipelineBuilder {
    pub fn update_method(mut self, method: UpdateMethod) -> Self {
        self.update_method = method;
        self
    }

    pub fn disable_site(mut self, site_key: &str) -> Self {
        self.disabled_sites.push(site_key.to_string());
        self
    }

    pub fn build(self) -> Pipeline {
        let downloader = Arc::new(self.downloader);
        let catalog = Arc::new(MemoryCatalog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let context = Arc::new(WorkerContext {
            downloader: downloader.clone(),
            catalog: catalog.clone(),
            notifier: notifier.clone(),
            policy: RetryPolicy::default(),
            update_method: self.update_method,
        });
        let router = SiteRouter::default().with_disabled_sites(self.disabled_sites);
        let shutdown = CancellationToken::new();

        Pipeline {
            dispatcher: Arc::new(Dispatcher::new(router, context, shutdown.clone())),
            downloader,
            catalog,
            notifier,
            shutdown,
        }
    }
}

pub struct Pipeline {
    pub dispatcher: Arc<Dispatcher>,
    pub downloader: Arc<ScriptedDownloader>,
    pub catalog: Arc<MemoryCatalog>,
    pub notifier: Arc<RecordingNotifier>,
    pub shutdown: CancellationToken,
}

impl Pipeline {
    pub fn builder(downloader: ScriptedDownloader) -> PipelineBuilder {
        PipelineBuilder {
            downloader,
            update_method: UpdateMethod::Update,
            disabled_sites: Vec::new(),
        }
    }

    /// Pipeline whose downloader always returns `status`.
    pub fn always(status: OutcomeStatus) -> Pipeline {
        Self::builder(ScriptedDownloader::new(status)).build()
    }

    pub async fn submit(&self, url: &str) -> SubmitOutcome {
        self.dispatcher
            .submit(url, false)
            .await
            .expect("dispatcher should accept submissions")
    }

    pub async fn submit_forced(&self, url: &str) -> SubmitOutcome {
        self.dispatcher
            .submit(url, true)
            .await
            .expect("dispatcher should accept submissions")
    }

    /// Advance virtual time until at least `count` notifications were emitted.
    ///
    /// Panics after a simulated day.
    pub async fn wait_for_notifications(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + 24 * HOUR;
        while self.notifier.kinds().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} notifications, got {:?}",
                count,
                self.notifier.kinds()
            );
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Advance virtual time until the downloader was called `count` times.
    pub async fn wait_for_calls(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + 24 * HOUR;
        while self.downloader.calls().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} downloader calls, got {}",
                count,
                self.downloader.calls().len()
            );
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
