use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub metrics_port: Option<u16>,

    // Sections
    pub folder_watcher: Option<FolderWatcherConfig>,
    pub calibre: Option<CalibreConfig>,
    pub pushbullet: Option<PushbulletConfig>,
    pub apprise: Option<AppriseConfig>,
    pub notifications: Option<NotificationsConfig>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FolderWatcherConfig {
    pub folder_path: Option<String>,
    /// Seconds between folder scans
    pub sleep_time: Option<u64>,
    pub ffnet_disable: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CalibreConfig {
    /// Library directory or calibre content server URL
    pub path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_ini: Option<String>,
    pub personal_ini: Option<String>,
    /// "update", "update_always", "force" or "update_no_force"
    pub update_method: Option<String>,
    pub fanficfare_command: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PushbulletConfig {
    pub enabled: Option<bool>,
    pub api_key: Option<String>,
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppriseConfig {
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_normal_retries: Option<u32>,
    pub retry_unit_secs: Option<u64>,
    pub hail_mary_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
