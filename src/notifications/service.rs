//! Notification service fanning events out to the configured transports

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::metrics;

use super::models::NotificationEvent;

const MAX_SEND_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Fire-and-forget notification sink used by the workers and the dispatcher.
pub trait Notifier: Send + Sync {
    /// Queue an event for delivery. Never blocks on the transports.
    fn notify(&self, event: NotificationEvent);

    fn is_enabled(&self) -> bool;
}

/// One delivery channel (Pushbullet, Apprise, ...).
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Delivers every event to all transports concurrently.
///
/// Each transport gets up to three attempts, waiting one and then two retry
/// delays in between. Failures are logged and dropped.
#[derive(Clone)]
pub struct NotificationService {
    transports: Vec<Arc<dyn NotificationTransport>>,
    enabled: bool,
    retry_delay: Duration,
    /// Deliveries spawned by `notify`, shared between clones
    deliveries: TaskTracker,
}

impl NotificationService {
    pub fn new(transports: Vec<Arc<dyn NotificationTransport>>, enabled: bool) -> Self {
        Self {
            transports,
            enabled,
            retry_delay: DEFAULT_RETRY_DELAY,
            deliveries: TaskTracker::new(),
        }
    }

    /// A service that drops every event.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), false)
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.transports.iter().map(|t| t.name().to_string()).collect()
    }

    /// Wait up to `timeout` for deliveries started by `notify`.
    ///
    /// Returns false if some were still running when the timeout hit.
    pub async fn flush(&self, timeout: Duration) -> bool {
        self.deliveries.close();
        if tokio::time::timeout(timeout, self.deliveries.wait())
            .await
            .is_ok()
        {
            return true;
        }
        warn!(
            "Dropping {} notification deliveries still in progress",
            self.deliveries.len()
        );
        false
    }

    /// Send `event` through every transport and wait for all of them.
    pub async fn deliver(&self, event: &NotificationEvent) {
        let title = event.title();
        let body = event.body();
        info!(
            "({}) Sending notification: {} - {}",
            event.site_key, title, body
        );

        let sends = self.transports.iter().map(|transport| {
            let body = body.as_str();
            async move {
                let sent = self.send_with_retry(transport.as_ref(), title, body).await;
                metrics::record_notification(
                    event.kind.as_str(),
                    if sent { "sent" } else { "failed" },
                );
            }
        });
        join_all(sends).await;
    }

    async fn send_with_retry(
        &self,
        transport: &dyn NotificationTransport,
        title: &str,
        body: &str,
    ) -> bool {
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match transport.send(title, body).await {
                Ok(()) => {
                    debug!("{} notification sent", transport.name());
                    return true;
                }
                Err(e) => {
                    warn!(
                        "{} notification attempt {}/{} failed: {:#}",
                        transport.name(),
                        attempt,
                        MAX_SEND_ATTEMPTS,
                        e
                    );
                }
            }
            if attempt < MAX_SEND_ATTEMPTS {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }
        false
    }
}

impl Notifier for NotificationService {
    fn notify(&self, event: NotificationEvent) {
        if !self.is_enabled() {
            debug!(
                "({}) Notifications disabled, dropping {}",
                event.site_key,
                event.kind.as_str()
            );
            return;
        }
        let service = self.clone();
        self.deliveries.spawn(async move {
            service.deliver(&event).await;
        });
    }

    fn is_enabled(&self) -> bool {
        self.enabled && !self.transports.is_empty()
    }
}
