//! Downloader seam and the FanFicFare adapter.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::catalog::CalibreLibrary;
use super::models::EffectiveMode;
use super::output_parsing::{classify_output, extract_title, OutputClass};

/// Status reported by a downloader for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    /// The update can only go through with `--force`.
    NeedsForceRetry,
    Failure,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::NeedsForceRetry => "needs_force_retry",
            OutcomeStatus::Failure => "failure",
        }
    }
}

/// One attempt handed to a downloader.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub job_id: String,
    pub url: String,
    pub site_key: String,
    pub mode: EffectiveMode,
    /// 1-based attempt number
    pub attempt: u32,
}

/// A downloaded epub waiting for the catalog step.
#[derive(Debug)]
pub struct LocalArtifact {
    pub epub_path: PathBuf,
    pub url: String,
    pub site_key: String,
    /// Calibre id of the entry this epub replaces
    pub existing_id: Option<String>,
    /// Work directory holding the epub; removed when the artifact is dropped
    pub workdir: Option<TempDir>,
}

impl LocalArtifact {
    pub fn new(epub_path: PathBuf, url: impl Into<String>, site_key: impl Into<String>) -> Self {
        Self {
            epub_path,
            url: url.into(),
            site_key: site_key.into(),
            existing_id: None,
            workdir: None,
        }
    }

    pub fn with_existing_id(mut self, id: Option<String>) -> Self {
        self.existing_id = id;
        self
    }

    pub fn with_workdir(mut self, workdir: TempDir) -> Self {
        self.workdir = Some(workdir);
        self
    }

    pub fn title(&self) -> String {
        extract_title(&self.epub_path)
    }
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub status: OutcomeStatus,
    /// Human readable detail, used in logs and failure notifications
    pub info: String,
    /// Present for `Success`
    pub artifact: Option<LocalArtifact>,
}

impl DownloadOutcome {
    pub fn success(info: impl Into<String>, artifact: LocalArtifact) -> Self {
        Self {
            status: OutcomeStatus::Success,
            info: info.into(),
            artifact: Some(artifact),
        }
    }

    pub fn needs_force(info: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::NeedsForceRetry,
            info: info.into(),
            artifact: None,
        }
    }

    pub fn failure(info: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            info: info.into(),
            artifact: None,
        }
    }
}

/// Runs a single update attempt for a story.
///
/// An `Err` is treated by the worker as a transient failure.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn run_update(&self, request: &UpdateRequest) -> Result<DownloadOutcome>;
}

/// Adapter around the FanFicFare CLI.
pub struct FanFicFareDownloader {
    program: String,
    base_args: Vec<String>,
    default_ini: Option<PathBuf>,
    personal_ini: Option<PathBuf>,
    library: Option<Arc<CalibreLibrary>>,
}

impl FanFicFareDownloader {
    /// `command` is the whitespace separated invocation, e.g. `python -m fanficfare.cli`.
    pub fn new(command: &str, library: Option<Arc<CalibreLibrary>>) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("FanFicFare command is empty");
        };
        Ok(Self {
            program,
            base_args: parts.collect(),
            default_ini: None,
            personal_ini: None,
            library,
        })
    }

    pub fn with_ini_files(mut self, default_ini: Option<PathBuf>, personal_ini: Option<PathBuf>) -> Self {
        self.default_ini = default_ini;
        self.personal_ini = personal_ini;
        self
    }

    /// Arguments following the program name.
    pub fn build_args(&self, mode: EffectiveMode, target: &str) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push(mode.cli_flag().to_string());
        args.push(target.to_string());
        args.push("--update-cover".to_string());
        args.push("--non-interactive".to_string());
        args
    }

    async fn copy_ini_files(&self, workdir: &Path) -> Result<()> {
        for (source, name) in [
            (&self.default_ini, "defaults.ini"),
            (&self.personal_ini, "personal.ini"),
        ] {
            if let Some(source) = source {
                tokio::fs::copy(source, workdir.join(name))
                    .await
                    .with_context(|| format!("Failed to copy {}", source.display()))?;
            }
        }
        Ok(())
    }

    /// The epub exported from the library when the story is already there,
    /// otherwise the URL itself.
    async fn resolve_target(
        &self,
        request: &UpdateRequest,
        workdir: &Path,
    ) -> Result<(String, Option<String>)> {
        let Some(library) = &self.library else {
            return Ok((request.url.clone(), None));
        };

        let Some(id) = library.find_id(&request.url).await? else {
            warn!("({}) Story not in Calibre", request.site_key);
            return Ok((request.url.clone(), None));
        };
        info!("({}) Story is in Calibre with id {}", request.site_key, id);

        library.export(&id, workdir).await?;
        match find_epub(workdir).await? {
            Some(path) => Ok((path.to_string_lossy().into_owned(), Some(id))),
            None => {
                warn!(
                    "({}) Export of {} produced no epub, updating from URL",
                    request.site_key, id
                );
                Ok((request.url.clone(), Some(id)))
            }
        }
    }
}

#[async_trait]
impl Downloader for FanFicFareDownloader {
    async fn run_update(&self, request: &UpdateRequest) -> Result<DownloadOutcome> {
        let workdir = TempDir::new().context("Failed to create work directory")?;
        self.copy_ini_files(workdir.path()).await?;

        let (target, existing_id) = self.resolve_target(request, workdir.path()).await?;
        info!(
            "({}) Updating {} ({})",
            request.site_key,
            target,
            request.mode.as_str()
        );

        let output = tokio::process::Command::new(&self.program)
            .args(self.build_args(request.mode, &target))
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("({}) FanFicFare output: {}", request.site_key, text);

        if !output.status.success() {
            return Ok(DownloadOutcome::failure(format!(
                "FanFicFare exited with {}: {}",
                output.status,
                last_line(&text)
            )));
        }

        match classify_output(&text) {
            OutputClass::Failure(reason) => {
                warn!("({}) {}", request.site_key, reason.message());
                Ok(DownloadOutcome::failure(reason.message()))
            }
            OutputClass::Forceable(reason) => {
                warn!("({}) {}", request.site_key, reason.message());
                Ok(DownloadOutcome::needs_force(reason.message()))
            }
            OutputClass::Clean => match find_epub(workdir.path()).await? {
                Some(epub) => {
                    let artifact = LocalArtifact::new(epub, &request.url, &request.site_key)
                        .with_existing_id(existing_id)
                        .with_workdir(workdir);
                    Ok(DownloadOutcome::success("Updated", artifact))
                }
                None => Ok(DownloadOutcome::failure("FanFicFare produced no epub")),
            },
        }
    }
}

/// First `.epub` file in `dir`, by name.
pub async fn find_epub(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "epub") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}
