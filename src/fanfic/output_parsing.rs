//! Classification of FanFicFare console output.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STORY_NAME: Regex = Regex::new(r"(.*?)-.*").expect("Failed to compile regex");
    static ref FAILURE_PATTERNS: Vec<(FailureReason, Regex)> = [
        (FailureReason::EqualChapters, r".* already contains (\d+) chapters."),
        (
            FailureReason::NoChapters,
            r".* doesn't contain any recognizable chapters, probably from a different source.  Not updating.",
        ),
        (FailureReason::NoUrl, r"No story URL found in epub to update."),
        (
            FailureReason::LoginFailed,
            r".*Login Failed on non-interactive process. Set username and password in personal.ini.",
        ),
        (FailureReason::BadRequest, r".*400 Client Error: Bad Request for url:.*"),
        (FailureReason::Forbidden, r".*403 Client Error: Forbidden for url:.*"),
        (
            FailureReason::Flaresolverr,
            r".*Connection to flaresolverr proxy server failed.*",
        ),
    ]
    .into_iter()
    .map(|(reason, pattern)| (reason, Regex::new(pattern).expect("Failed to compile regex")))
    .collect();
    static ref FORCEABLE_PATTERNS: Vec<(ForceReason, Regex)> = [
        (
            ForceReason::ChapterDifference,
            r".* contains (\d+) chapters, more than source: (\d+).",
        ),
        (
            ForceReason::UpdatedMoreRecently,
            r".*File\(.*\.epub\) Updated\(.*\) more recently than Story\(.*\) - Skipping",
        ),
    ]
    .into_iter()
    .map(|(reason, pattern)| (reason, Regex::new(pattern).expect("Failed to compile regex")))
    .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    EqualChapters,
    NoChapters,
    NoUrl,
    LoginFailed,
    BadRequest,
    Forbidden,
    Flaresolverr,
}

impl FailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::EqualChapters => {
                "Issue with story, site is broken. Story likely hasn't updated on site yet."
            }
            FailureReason::NoChapters => {
                "Something is messed up with the site or the epub. No chapters found."
            }
            FailureReason::NoUrl => "No URL in epub to update from. Fix the metadata.",
            FailureReason::LoginFailed => "Login failed. Check your username and password.",
            FailureReason::BadRequest => "Bad request. Check the URL.",
            FailureReason::Forbidden => {
                "Forbidden client. Check the URL. If this is ff.net, check that Flaresolverr is installed."
            }
            FailureReason::Flaresolverr => {
                "Flaresolverr connection failed. Check your Flaresolverr installation."
            }
        }
    }
}

/// Output patterns that are resolved by retrying with `--force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// Local epub has more chapters than the source
    ChapterDifference,
    /// Local epub is newer than the story metadata
    UpdatedMoreRecently,
}

impl ForceReason {
    pub fn message(&self) -> &'static str {
        match self {
            ForceReason::ChapterDifference => {
                "Chapter difference between source and destination. Forcing update."
            }
            ForceReason::UpdatedMoreRecently => {
                "File has been updated more recently than the story, likely a metadata bug. Forcing update."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClass {
    Clean,
    Failure(FailureReason),
    Forceable(ForceReason),
}

/// Classify the combined stdout/stderr of a FanFicFare run.
///
/// Failure patterns take precedence over forceable ones.
pub fn classify_output(output: &str) -> OutputClass {
    if let Some((reason, _)) = FAILURE_PATTERNS.iter().find(|(_, re)| re.is_match(output)) {
        return OutputClass::Failure(*reason);
    }
    if let Some((reason, _)) = FORCEABLE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(output))
    {
        return OutputClass::Forceable(*reason);
    }
    OutputClass::Clean
}

/// Story title taken from an epub filename (`Title-Author.epub` → `Title`).
pub fn extract_title(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match STORY_NAME.captures(&file_name).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim().to_string(),
        None => file_name.trim().to_string(),
    }
}
