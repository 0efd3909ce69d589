//! Calibre library access and the catalog step run after a successful download.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::downloader::LocalArtifact;

const CALIBREDB: &str = "calibredb";

/// Library entry written by the catalog step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Calibre id after the update, None when no library is configured
    pub calibre_id: Option<String>,
    pub title: String,
    pub path: PathBuf,
}

/// Persists a downloaded story.
#[async_trait]
pub trait CatalogUpdater: Send + Sync {
    async fn add_or_update(&self, artifact: &LocalArtifact) -> Result<CatalogEntry>;
}

/// A Calibre library driven through the `calibredb` CLI.
///
/// All invocations are serialised: calibredb does not tolerate concurrent
/// writers on one library.
pub struct CalibreLibrary {
    program: String,
    location: String,
    username: Option<String>,
    password: Option<String>,
    lock: Mutex<()>,
}

impl CalibreLibrary {
    pub fn new(location: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        Self {
            program: CALIBREDB.to_string(),
            location: location.into(),
            username,
            password,
            lock: Mutex::new(()),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn library_args(&self) -> Vec<String> {
        let mut args = vec!["--with-library".to_string(), self.location.clone()];
        if let Some(username) = &self.username {
            args.push("--username".to_string());
            args.push(username.clone());
        }
        if let Some(password) = &self.password {
            args.push("--password".to_string());
            args.push(password.clone());
        }
        args
    }

    async fn exec(&self, args: &[&str]) -> Result<Output> {
        debug!("Calling {} {}", self.program, args.join(" "));
        tokio::process::Command::new(&self.program)
            .args(args)
            .args(self.library_args())
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {} {}", self.program, args[0]))
    }

    async fn search_unlocked(&self, url: &str) -> Result<Option<String>> {
        let query = format!("Identifiers:{}", url);
        let output = self.exec(&["search", &query]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    /// Look a story up by its URL identifier.
    pub async fn find_id(&self, url: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        self.search_unlocked(url).await
    }

    /// Export the epub of `id` into `dir`.
    pub async fn export(&self, id: &str, dir: &Path) -> Result<()> {
        let _guard = self.lock.lock().await;
        let dir = dir.to_string_lossy();
        let output = self
            .exec(&[
                "export",
                "--dont-save-cover",
                "--dont-write-opf",
                "--single-dir",
                "--to-dir",
                &dir,
                id,
            ])
            .await?;
        if !output.status.success() {
            bail!(
                "calibredb export of {} failed: {}",
                id,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Replace (or insert) a story and return its new id.
    pub async fn replace(&self, existing_id: Option<&str>, epub: &Path, url: &str) -> Result<String> {
        let _guard = self.lock.lock().await;

        if let Some(id) = existing_id {
            let output = self.exec(&["remove", id]).await?;
            if !output.status.success() {
                warn!("calibredb remove {} exited with {}", id, output.status);
            }
        }

        let epub_arg = epub.to_string_lossy();
        let output = self.exec(&["add", "-d", &epub_arg]).await?;
        if !output.status.success() {
            bail!(
                "calibredb add of {} failed: {}",
                epub.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        match self.search_unlocked(url).await? {
            Some(id) => Ok(id),
            None => bail!("Story {} not found in Calibre after adding it", url),
        }
    }
}

/// Catalog step backed by a Calibre library.
pub struct CalibreDb {
    library: Arc<CalibreLibrary>,
}

impl CalibreDb {
    pub fn new(library: Arc<CalibreLibrary>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl CatalogUpdater for CalibreDb {
    async fn add_or_update(&self, artifact: &LocalArtifact) -> Result<CatalogEntry> {
        if artifact.existing_id.is_some() {
            info!("({}) Going to remove story from Calibre.", artifact.site_key);
        }
        info!(
            "({}) Adding {} to Calibre",
            artifact.site_key,
            artifact.epub_path.display()
        );

        let id = self
            .library
            .replace(artifact.existing_id.as_deref(), &artifact.epub_path, &artifact.url)
            .await?;

        Ok(CatalogEntry {
            calibre_id: Some(id),
            title: artifact.title(),
            path: artifact.epub_path.clone(),
        })
    }
}

/// Catalog step used when no Calibre library is configured: the epub is
/// copied into `output_dir` and kept there.
pub struct NoCatalog {
    output_dir: PathBuf,
}

impl NoCatalog {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl CatalogUpdater for NoCatalog {
    async fn add_or_update(&self, artifact: &LocalArtifact) -> Result<CatalogEntry> {
        let file_name = artifact
            .epub_path
            .file_name()
            .context("Artifact has no file name")?;
        let target = self.output_dir.join(file_name);

        if artifact.epub_path != target {
            tokio::fs::create_dir_all(&self.output_dir)
                .await
                .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
            tokio::fs::copy(&artifact.epub_path, &target)
                .await
                .with_context(|| {
                    format!(
                        "Failed to copy {} to {}",
                        artifact.epub_path.display(),
                        target.display()
                    )
                })?;
        }

        Ok(CatalogEntry {
            calibre_id: None,
            title: artifact.title(),
            path: target,
        })
    }
}
