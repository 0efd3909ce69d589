//! Pushbullet transport over the v2 HTTP API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::service::NotificationTransport;

const PUSHBULLET_API: &str = "https://api.pushbullet.com";

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    #[serde(rename = "type")]
    push_type: &'static str,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_iden: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct Device {
    iden: String,
    #[serde(default)]
    nickname: Option<String>,
}

pub struct PushbulletTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Device nickname; pushes go to all devices when unset
    device: Option<String>,
    device_iden: OnceCell<String>,
}

impl PushbulletTransport {
    pub fn new(api_key: String, device: Option<String>) -> Result<Self> {
        Self::with_base_url(PUSHBULLET_API.to_string(), api_key, device)
    }

    pub fn with_base_url(base_url: String, api_key: String, device: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            device: device.filter(|d| !d.is_empty()),
            device_iden: OnceCell::new(),
        })
    }

    async fn resolve_device(&self, nickname: &str) -> Result<String> {
        let url = format!("{}/v2/devices", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Access-Token", &self.api_key)
            .send()
            .await
            .context("Failed to list Pushbullet devices")?;

        if !response.status().is_success() {
            anyhow::bail!("Pushbullet device list failed with status: {}", response.status());
        }

        let list: DeviceList = response
            .json()
            .await
            .context("Failed to parse Pushbullet device list")?;

        list.devices
            .into_iter()
            .find(|d| d.nickname.as_deref() == Some(nickname))
            .map(|d| d.iden)
            .with_context(|| format!("Pushbullet device '{}' not found", nickname))
    }
}

#[async_trait]
impl NotificationTransport for PushbulletTransport {
    fn name(&self) -> &str {
        "pushbullet"
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let device_iden = match &self.device {
            Some(nickname) => Some(
                self.device_iden
                    .get_or_try_init(|| self.resolve_device(nickname))
                    .await?
                    .as_str(),
            ),
            None => None,
        };

        let url = format!("{}/v2/pushes", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Access-Token", &self.api_key)
            .json(&PushRequest {
                push_type: "note",
                title,
                body,
                device_iden,
            })
            .send()
            .await
            .context("Failed to reach Pushbullet")?;

        if !response.status().is_success() {
            anyhow::bail!("Pushbullet push failed with status: {}", response.status());
        }
        Ok(())
    }
}
