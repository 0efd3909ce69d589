//! Notification data models

use serde::{Deserialize, Serialize};

/// Notification kind enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Normal retries ran out, the Hail-Mary attempt is scheduled
    PenultimateFailure,
    /// Hail-Mary failed on a job whose force request was ignored
    HailmaryFailureForcedIgnored,
    TerminalSuccess,
    TerminalFailure,
    /// URL submitted for a disabled site
    SiteDisabled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PenultimateFailure => "penultimate_failure",
            NotificationKind::HailmaryFailureForcedIgnored => "hailmary_failure_forced_ignored",
            NotificationKind::TerminalSuccess => "terminal_success",
            NotificationKind::TerminalFailure => "terminal_failure",
            NotificationKind::SiteDisabled => "site_disabled",
        }
    }

    /// Title line shown by the transports.
    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::PenultimateFailure => {
                "Fanfiction Download Failed, Hail-Mary attempt scheduled"
            }
            NotificationKind::HailmaryFailureForcedIgnored => {
                "Fanfiction Update Permanently Skipped, force was ignored"
            }
            NotificationKind::TerminalSuccess => "New Fanfiction Download",
            NotificationKind::TerminalFailure => "Fanfiction Download Failed",
            NotificationKind::SiteDisabled => "Fanfiction Download Skipped, site disabled",
        }
    }
}

/// A notification about one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub url: String,
    pub site_key: String,
    /// Story title on success, failure detail otherwise
    pub detail: Option<String>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, url: impl Into<String>, site_key: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            site_key: site_key.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    /// Body text: the detail (if any) followed by the URL and site.
    pub fn body(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}\n{} ({})", detail, self.url, self.site_key),
            None => format!("{} ({})", self.url, self.site_key),
        }
    }
}
