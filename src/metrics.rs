use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;

/// Metric name prefix for all autofanfic metrics
const PREFIX: &str = "autofanfic";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Intake
    pub static ref SUBMISSIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_submissions_total"), "Total URLs submitted to the dispatcher"),
        &["site", "result"]
    ).expect("Failed to create submissions_total metric");

    // Download attempts
    pub static ref ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_attempts_total"), "Total update attempts by outcome"),
        &["site", "mode", "outcome"]
    ).expect("Failed to create attempts_total metric");

    pub static ref JOBS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_finished_total"), "Jobs that reached a terminal state"),
        &["site", "result"]
    ).expect("Failed to create jobs_finished_total metric");

    pub static ref NOTIFICATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_total"), "Notification deliveries by kind"),
        &["kind", "result"]
    ).expect("Failed to create notifications_total metric");

    pub static ref ACTIVE_WORKERS: Gauge = Gauge::new(
        format!("{PREFIX}_active_workers"),
        "Number of running per-site workers"
    ).expect("Failed to create active_workers metric");

    pub static ref PENDING_RETRIES: Gauge = Gauge::new(
        format!("{PREFIX}_pending_retries"),
        "Jobs waiting for a retry delay to elapse"
    ).expect("Failed to create pending_retries metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Already registered is fine (tests call this repeatedly)
    let _ = REGISTRY.register(Box::new(SUBMISSIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FINISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_WORKERS.clone()));
    let _ = REGISTRY.register(Box::new(PENDING_RETRIES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_submission(site: &str, result: &str) {
    SUBMISSIONS_TOTAL.with_label_values(&[site, result]).inc();
}

pub fn record_attempt(site: &str, mode: &str, outcome: &str) {
    ATTEMPTS_TOTAL
        .with_label_values(&[site, mode, outcome])
        .inc();
}

pub fn record_job_finished(site: &str, result: &str) {
    JOBS_FINISHED_TOTAL.with_label_values(&[site, result]).inc();
}

pub fn record_notification(kind: &str, result: &str) {
    NOTIFICATIONS_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn worker_started() {
    ACTIVE_WORKERS.inc();
}

pub fn worker_stopped() {
    ACTIVE_WORKERS.dec();
}

pub fn retry_scheduled() {
    PENDING_RETRIES.inc();
}

pub fn retry_released() {
    PENDING_RETRIES.dec();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serve `/metrics` on localhost until `shutdown` is cancelled.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Metrics available at port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
