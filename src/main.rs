use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autofanfic::config::{AppConfig, CliConfig, FileConfig};
use autofanfic::fanfic::{
    CalibreDb, CalibreLibrary, CatalogUpdater, Dispatcher, FanFicFareDownloader, NoCatalog,
    RetryPolicy, SiteRouter, WorkerContext,
};
use autofanfic::metrics;
use autofanfic::notifications::{
    AppriseTransport, NotificationService, NotificationTransport, PushbulletTransport,
};
use autofanfic::watcher::FolderWatcher;

/// How long shutdown waits for notifications still being delivered.
const NOTIFICATION_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the TOML configuration file.
    #[clap(value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Folder polled for `*.url` files. Overridden by `[folder_watcher] folder_path`.
    #[clap(long, value_parser = parse_path)]
    pub folder_path: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 0)]
    pub metrics_port: u16,
}

fn build_notifier(config: &AppConfig) -> Result<NotificationService> {
    let mut transports: Vec<Arc<dyn NotificationTransport>> = Vec::new();

    if let Some(pushbullet) = &config.notifications.pushbullet {
        transports.push(Arc::new(PushbulletTransport::new(
            pushbullet.api_key.clone(),
            pushbullet.device.clone(),
        )?));
    }
    if !config.notifications.apprise_urls.is_empty() {
        transports.push(Arc::new(AppriseTransport::new(
            config.notifications.apprise_urls.clone(),
        )));
    }

    let service = NotificationService::new(transports, config.notifications.enabled);
    info!(
        "Notifications {} (transports: {:?})",
        if config.notifications.enabled { "enabled" } else { "disabled" },
        service.transport_names()
    );
    Ok(service)
}

fn build_context(config: &AppConfig, notifier: Arc<NotificationService>) -> Result<WorkerContext> {
    let calibre = &config.calibre;

    let library = calibre.path.as_ref().map(|path| {
        Arc::new(CalibreLibrary::new(
            path.clone(),
            calibre.username.clone(),
            calibre.password.clone(),
        ))
    });

    let catalog: Arc<dyn CatalogUpdater> = match &library {
        Some(library) => {
            info!("Using calibre library at {}", library.location());
            Arc::new(CalibreDb::new(library.clone()))
        }
        None => {
            info!(
                "No calibre library configured, keeping downloads in {:?}",
                config.folder_path
            );
            Arc::new(NoCatalog::new(&config.folder_path))
        }
    };

    let downloader = FanFicFareDownloader::new(&calibre.fanficfare_command, library)?
        .with_ini_files(calibre.default_ini.clone(), calibre.personal_ini.clone());

    Ok(WorkerContext {
        downloader: Arc::new(downloader),
        catalog,
        notifier,
        policy: RetryPolicy::new(&config.retry),
        update_method: calibre.update_method,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    info!("autofanfic {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        folder_path: cli_args.folder_path.clone(),
        metrics_port: cli_args.metrics_port,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();

    if app_config.metrics_port != 0 {
        let port = app_config.metrics_port;
        let token = shutdown_token.child_token();
        tokio::spawn(async move {
            if let Err(e) = metrics::run_metrics_server(port, token).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let notifier = Arc::new(build_notifier(&app_config)?);
    let context = Arc::new(build_context(&app_config, notifier.clone())?);
    let router = SiteRouter::default().with_disabled_sites(app_config.disabled_sites());
    let dispatcher = Arc::new(Dispatcher::new(router, context, shutdown_token.clone()));

    let watcher = FolderWatcher::new(
        app_config.folder_path.clone(),
        app_config.sleep_time,
        dispatcher.clone(),
    );
    let watcher_token = shutdown_token.child_token();
    let mut watcher_handle = tokio::spawn(async move { watcher.run(watcher_token).await });

    tokio::select! {
        result = &mut watcher_handle => {
            if let Err(e) = result {
                error!("Folder watcher task failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
    }

    dispatcher.shutdown().await;
    if !watcher_handle.is_finished() {
        let _ = watcher_handle.await;
    }
    if !notifier.flush(NOTIFICATION_FLUSH_TIMEOUT).await {
        warn!("Some notifications were not delivered before exit");
    }
    info!("Shutdown complete");
    Ok(())
}
