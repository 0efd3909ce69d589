//! Routes submitted URLs to per-site workers and owns their lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::notifications::{NotificationEvent, NotificationKind};

use super::models::Job;
use super::site_router::SiteRouter;
use super::worker::{SiteWorker, WorkerContext};

const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued {
        job_id: String,
        site_key: String,
        url: String,
    },
    /// Not enqueued; a `site_disabled` notification was emitted instead.
    SiteDisabled { site_key: String, url: String },
}

struct SiteHandle {
    sender: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

pub struct Dispatcher {
    router: SiteRouter,
    context: Arc<WorkerContext>,
    sites: Mutex<HashMap<String, SiteHandle>>,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    worker_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        router: SiteRouter,
        context: Arc<WorkerContext>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            router,
            context,
            sites: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            shutdown_token,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }

    /// Upper bound on how long `shutdown` waits for each worker.
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Site keys that currently have a worker.
    pub async fn active_sites(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sites.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Route `url` and enqueue a new job on its site queue.
    ///
    /// Returns as soon as the job is queued. Submitting the same URL twice
    /// creates two independent jobs.
    pub async fn submit(
        &self,
        url: &str,
        requested_force: bool,
    ) -> Result<SubmitOutcome, DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }

        let route = self.router.route(url);

        if route.disabled {
            warn!(
                "({}) Site is disabled, skipping {}",
                route.site_key, route.url
            );
            metrics::record_submission(&route.site_key, "disabled");
            self.context.notifier.notify(NotificationEvent::new(
                NotificationKind::SiteDisabled,
                &route.url,
                &route.site_key,
            ));
            return Ok(SubmitOutcome::SiteDisabled {
                site_key: route.site_key,
                url: route.url,
            });
        }

        let mut sites = self.sites.lock().await;
        // Re-checked under the lock so nothing is enqueued after shutdown drained the map
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }

        let job = Job::new(&route.url, &route.site_key, requested_force);
        let job_id = job.id.clone();

        let handle = sites
            .entry(route.site_key.clone())
            .or_insert_with(|| self.spawn_worker(&route.site_key));
        if handle.worker.is_finished() {
            warn!(
                "({}) Worker exited unexpectedly, restarting it",
                route.site_key
            );
            *handle = self.spawn_worker(&route.site_key);
        }
        if let Err(mpsc::error::SendError(job)) = handle.sender.send(job) {
            // Receiver dropped after the liveness check above
            warn!(
                "({}) Worker queue closed, restarting the worker",
                route.site_key
            );
            *handle = self.spawn_worker(&route.site_key);
            if handle.sender.send(job).is_err() {
                return Err(DispatchError::ShuttingDown);
            }
        }

        info!(
            "({}) Queued {} (job {}, force={})",
            route.site_key, route.url, job_id, requested_force
        );
        metrics::record_submission(&route.site_key, "accepted");

        Ok(SubmitOutcome::Enqueued {
            job_id,
            site_key: route.site_key,
            url: route.url,
        })
    }

    fn spawn_worker(&self, site_key: &str) -> SiteHandle {
        debug!("({}) Creating site worker", site_key);
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = SiteWorker::new(
            site_key,
            Arc::clone(&self.context),
            sender.clone(),
            receiver,
        );
        let token = self.shutdown_token.child_token();
        SiteHandle {
            sender,
            worker: tokio::spawn(worker.run(token)),
        }
    }

    /// Stop accepting work, cancel workers and pending retries, and wait for
    /// the workers to finish their in-flight attempt.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher...");
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let handles: Vec<(String, SiteHandle)> = self.sites.lock().await.drain().collect();
        for (site_key, handle) in handles {
            drop(handle.sender);
            if tokio::time::timeout(self.worker_timeout, handle.worker)
                .await
                .is_err()
            {
                warn!("({}) Worker did not stop within {:?}", site_key, self.worker_timeout);
            }
        }

        info!("Dispatcher shutdown complete");
    }
}
