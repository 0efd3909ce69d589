//! Per-site worker.
//!
//! One worker owns the receiving end of a site channel and processes its jobs
//! strictly one at a time. Retries are parked in delay tasks that push the
//! job back onto the same channel, so a waiting retry never holds up the
//! rest of the site's queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::notifications::{NotificationEvent, NotificationKind, Notifier};

use super::catalog::CatalogUpdater;
use super::downloader::{DownloadOutcome, Downloader, LocalArtifact, UpdateRequest};
use super::force_decision::resolve_mode;
use super::models::{Job, UpdateMethod};
use super::retry_policy::{RetryDecision, RetryPolicy};

/// Collaborators shared by every site worker.
pub struct WorkerContext {
    pub downloader: Arc<dyn Downloader>,
    pub catalog: Arc<dyn CatalogUpdater>,
    pub notifier: Arc<dyn Notifier>,
    pub policy: RetryPolicy,
    pub update_method: UpdateMethod,
}

pub struct SiteWorker {
    site_key: String,
    context: Arc<WorkerContext>,
    /// Used by delay tasks to put retried jobs back at the tail of the queue
    sender: mpsc::UnboundedSender<Job>,
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl SiteWorker {
    pub fn new(
        site_key: impl Into<String>,
        context: Arc<WorkerContext>,
        sender: mpsc::UnboundedSender<Job>,
        receiver: mpsc::UnboundedReceiver<Job>,
    ) -> Self {
        Self {
            site_key: site_key.into(),
            context,
            sender,
            receiver,
        }
    }

    /// Main processing loop - call from a spawned task.
    ///
    /// Returns once `shutdown` is cancelled. An attempt that is already
    /// running is completed first.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("({}) Worker starting", self.site_key);
        metrics::worker_started();

        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("({}) Worker shutting down", self.site_key);
                    break;
                }
                job = self.receiver.recv() => match job {
                    Some(job) => job,
                    None => {
                        debug!("({}) Queue closed", self.site_key);
                        break;
                    }
                },
            };

            self.process(job, &shutdown).await;
        }

        metrics::worker_stopped();
        info!("({}) Worker stopped", self.site_key);
    }

    async fn process(&self, mut job: Job, shutdown: &CancellationToken) {
        let decision = resolve_mode(self.context.update_method, job.requested_force);
        if decision.force_ignored && !job.force_ignored {
            warn!(
                "({}) Force requested for {} but update method is update_no_force, updating normally",
                self.site_key, job.url
            );
        }
        job.force_ignored |= decision.force_ignored;
        job.mode_history.push(decision.mode);

        let request = UpdateRequest {
            job_id: job.id.clone(),
            url: job.url.clone(),
            site_key: job.site_key.clone(),
            mode: decision.mode,
            attempt: job.attempt_count + 1,
        };
        info!(
            "({}) Processing {} (attempt {}, mode {})",
            self.site_key,
            job.url,
            request.attempt,
            decision.mode.as_str()
        );

        let outcome = match AssertUnwindSafe(self.context.downloader.run_update(&request))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!("({}) Failed to update {}: {:#}", self.site_key, job.url, e);
                DownloadOutcome::failure(format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("({}) Downloader panicked on {}: {}", self.site_key, job.url, message);
                DownloadOutcome::failure(format!("Downloader panicked: {}", message))
            }
        };
        metrics::record_attempt(
            &self.site_key,
            decision.mode.as_str(),
            outcome.status.as_str(),
        );

        let DownloadOutcome {
            status,
            info: detail,
            artifact,
        } = outcome;

        match self.context.policy.on_outcome(&mut job, status) {
            RetryDecision::Succeeded => self.finish_success(&job, artifact).await,
            RetryDecision::Retry { delay, penultimate } => {
                if penultimate {
                    let at = chrono::Duration::from_std(delay)
                        .map(|d| (chrono::Local::now() + d).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|_| format!("{}s", delay.as_secs()));
                    warn!(
                        "({}) Normal retries exhausted for {}, Hail-Mary attempt at {}",
                        self.site_key, job.url, at
                    );
                    self.notify(&job, NotificationKind::PenultimateFailure, Some(detail));
                } else {
                    info!(
                        "({}) Attempt {} for {} failed ({}), retrying in {}s",
                        self.site_key,
                        job.attempt_count,
                        job.url,
                        detail,
                        delay.as_secs()
                    );
                }
                self.schedule_retry(job, delay, shutdown.clone());
            }
            RetryDecision::Exhausted { force_ignored } => {
                error!(
                    "({}) Giving up on {} after {} attempts: {}",
                    self.site_key, job.url, job.attempt_count, detail
                );
                metrics::record_job_finished(&self.site_key, "exhausted");
                if force_ignored {
                    self.notify(
                        &job,
                        NotificationKind::HailmaryFailureForcedIgnored,
                        Some(detail),
                    );
                }
            }
        }
    }

    async fn finish_success(&self, job: &Job, artifact: Option<LocalArtifact>) {
        let Some(artifact) = artifact else {
            error!(
                "({}) Update of {} reported success without an epub",
                self.site_key, job.url
            );
            metrics::record_job_finished(&self.site_key, "catalog_failed");
            self.notify(
                job,
                NotificationKind::TerminalFailure,
                Some("Downloader produced no epub".to_string()),
            );
            return;
        };

        let result = match AssertUnwindSafe(self.context.catalog.add_or_update(&artifact))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("Catalog update panicked: {}", panic_message(panic.as_ref()))),
        };

        match result {
            Ok(entry) => {
                info!(
                    "({}) Updated {} ({}) after {} attempts",
                    self.site_key, entry.title, job.url, job.attempt_count
                );
                metrics::record_job_finished(&self.site_key, "success");
                self.notify(job, NotificationKind::TerminalSuccess, Some(entry.title));
            }
            Err(e) => {
                error!(
                    "({}) Failed to add {} to the library: {:#}",
                    self.site_key, job.url, e
                );
                metrics::record_job_finished(&self.site_key, "catalog_failed");
                self.notify(
                    job,
                    NotificationKind::TerminalFailure,
                    Some(format!("{:#}", e)),
                );
            }
        }
    }

    fn schedule_retry(&self, job: Job, delay: Duration, shutdown: CancellationToken) {
        let sender = self.sender.clone();
        let site_key = self.site_key.clone();
        metrics::retry_scheduled();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let url = job.url.clone();
                    if sender.send(job).is_err() {
                        warn!("({}) Queue closed, dropping retry of {}", site_key, url);
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(
                        "({}) Shutting down, dropping pending retry of {} (attempt {})",
                        site_key, job.url, job.attempt_count + 1
                    );
                }
            }
            metrics::retry_released();
        });
    }

    fn notify(&self, job: &Job, kind: NotificationKind, detail: Option<String>) {
        let mut event = NotificationEvent::new(kind, &job.url, &job.site_key);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.context.notifier.notify(event);
    }
}

fn panic_message<'a>(panic: &'a (dyn Any + Send + 'static)) -> &'a str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
