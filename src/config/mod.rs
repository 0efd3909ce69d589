mod file_config;

pub use file_config::{
    AppriseConfig, CalibreConfig, FileConfig, FolderWatcherConfig, NotificationsConfig,
    PushbulletConfig, RetryConfig,
};

use crate::fanfic::{UpdateMethod, FFNET_SITE};
use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_FANFICFARE_COMMAND: &str = "python -m fanficfare.cli";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub folder_path: Option<PathBuf>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Folder watcher
    pub folder_path: PathBuf,
    pub sleep_time: Duration,
    pub ffnet_disable: bool,

    pub metrics_port: u16,

    pub calibre: CalibreSettings,
    pub notifications: NotificationSettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone)]
pub struct CalibreSettings {
    /// None disables the library integration; epubs are kept in the watch folder
    pub path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_ini: Option<PathBuf>,
    pub personal_ini: Option<PathBuf>,
    pub update_method: UpdateMethod,
    pub fanficfare_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushbulletSettings {
    pub api_key: String,
    pub device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Set when the `[pushbullet]` section is enabled
    pub pushbullet: Option<PushbulletSettings>,
    pub apprise_urls: Vec<String>,
}

impl NotificationSettings {
    pub fn has_transports(&self) -> bool {
        self.pushbullet.is_some() || !self.apprise_urls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_normal_retries: u32,
    pub retry_unit_secs: u64,
    pub hail_mary_hours: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_normal_retries: 10,
            retry_unit_secs: 60,
            hail_mary_hours: 12,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let watcher = file.folder_watcher.unwrap_or_default();
        let folder_path = watcher
            .folder_path
            .map(PathBuf::from)
            .or_else(|| cli.folder_path.clone())
            .ok_or_else(|| {
                anyhow!("folder_path must be specified via --folder-path or in config file")
            })?;

        if !folder_path.exists() {
            bail!("Watch folder does not exist: {:?}", folder_path);
        }
        if !folder_path.is_dir() {
            bail!("folder_path is not a directory: {:?}", folder_path);
        }

        let sleep_time = watcher.sleep_time.unwrap_or(60);
        if sleep_time == 0 {
            bail!("folder_watcher.sleep_time must be at least 1 second");
        }
        let ffnet_disable = watcher.ffnet_disable.unwrap_or(true);

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let calibre = resolve_calibre(file.calibre.unwrap_or_default())?;
        let notifications = resolve_notifications(
            file.notifications.unwrap_or_default(),
            file.pushbullet.unwrap_or_default(),
            file.apprise.unwrap_or_default(),
        )?;

        // Retry settings - merge file config with defaults
        let retry_file = file.retry.unwrap_or_default();
        let defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_normal_retries: retry_file
                .max_normal_retries
                .unwrap_or(defaults.max_normal_retries),
            retry_unit_secs: retry_file.retry_unit_secs.unwrap_or(defaults.retry_unit_secs),
            hail_mary_hours: retry_file.hail_mary_hours.unwrap_or(defaults.hail_mary_hours),
        };
        validate_retry(&retry)?;

        Ok(Self {
            folder_path,
            sleep_time: Duration::from_secs(sleep_time),
            ffnet_disable,
            metrics_port,
            calibre,
            notifications,
            retry,
        })
    }

    /// Site keys whose URLs are skipped instead of downloaded.
    pub fn disabled_sites(&self) -> Vec<String> {
        if self.ffnet_disable {
            vec![FFNET_SITE.to_string()]
        } else {
            Vec::new()
        }
    }
}

/// Rejects retry settings whose delays do not fit in a `u64` of seconds.
fn validate_retry(retry: &RetrySettings) -> Result<()> {
    if retry.retry_unit_secs == 0 {
        bail!("retry.retry_unit_secs must be at least 1 second");
    }
    // The longest normal delay is (max_normal_retries + 1) retry units
    u64::from(retry.max_normal_retries)
        .checked_add(1)
        .and_then(|n| n.checked_mul(retry.retry_unit_secs))
        .ok_or_else(|| {
            anyhow!(
                "retry.retry_unit_secs ({}) x retry.max_normal_retries ({}) is too large",
                retry.retry_unit_secs,
                retry.max_normal_retries
            )
        })?;
    retry.hail_mary_hours.checked_mul(60 * 60).ok_or_else(|| {
        anyhow!(
            "retry.hail_mary_hours ({}) is too large",
            retry.hail_mary_hours
        )
    })?;
    Ok(())
}

fn resolve_calibre(file: CalibreConfig) -> Result<CalibreSettings> {
    let update_method = match file.update_method.as_deref() {
        None => UpdateMethod::default(),
        Some(s) => UpdateMethod::from_str(s).ok_or_else(|| {
            anyhow!(
                "Invalid calibre.update_method '{}': expected update, update_always, force or update_no_force",
                s
            )
        })?,
    };

    let fanficfare_command = file
        .fanficfare_command
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FANFICFARE_COMMAND.to_string());

    Ok(CalibreSettings {
        path: file.path.filter(|p| !p.is_empty()),
        username: file.username.filter(|u| !u.is_empty()),
        password: file.password.filter(|p| !p.is_empty()),
        default_ini: resolve_ini(file.default_ini.as_deref(), "defaults.ini"),
        personal_ini: resolve_ini(file.personal_ini.as_deref(), "personal.ini"),
        update_method,
        fanficfare_command,
    })
}

/// `path` may name the ini file itself or the directory holding it. A file
/// that does not exist is ignored with a warning.
fn resolve_ini(path: Option<&str>, file_name: &str) -> Option<PathBuf> {
    let path = path.filter(|p| !p.is_empty())?;
    let mut ini = PathBuf::from(path);
    if !path.ends_with(file_name) {
        ini = ini.join(file_name);
    }
    if !Path::new(&ini).is_file() {
        warn!("File {:?} does not exist, ignoring it", ini);
        return None;
    }
    Some(ini)
}

fn resolve_notifications(
    notifications: NotificationsConfig,
    pushbullet: PushbulletConfig,
    apprise: AppriseConfig,
) -> Result<NotificationSettings> {
    let pushbullet = if pushbullet.enabled.unwrap_or(false) {
        let api_key = pushbullet
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("pushbullet.api_key is required when pushbullet is enabled"))?;
        Some(PushbulletSettings {
            api_key,
            device: pushbullet.device.filter(|d| !d.is_empty()),
        })
    } else {
        None
    };

    Ok(NotificationSettings {
        enabled: notifications.enabled.unwrap_or(true),
        pushbullet,
        apprise_urls: apprise.urls.unwrap_or_default(),
    })
}
