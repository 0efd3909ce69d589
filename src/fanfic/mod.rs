//! Fanfic update pipeline
//!
//! URLs are routed to per-site queues, each drained by a sequential worker
//! that runs FanFicFare, retries failures with a linear backoff and a final
//! Hail-Mary attempt, and hands successful downloads to the catalog.

mod catalog;
mod dispatcher;
mod downloader;
mod force_decision;
mod models;
mod output_parsing;
mod retry_policy;
mod site_router;
mod worker;

pub use catalog::{CalibreDb, CalibreLibrary, CatalogEntry, CatalogUpdater, NoCatalog};
pub use dispatcher::{DispatchError, Dispatcher, SubmitOutcome};
pub use downloader::{
    find_epub, DownloadOutcome, Downloader, FanFicFareDownloader, LocalArtifact, OutcomeStatus,
    UpdateRequest,
};
pub use force_decision::{resolve_mode, ModeDecision};
pub use models::*;
pub use output_parsing::{classify_output, extract_title, FailureReason, ForceReason, OutputClass};
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use site_router::{Route, SiteRouter, SiteRule, FFNET_SITE, OTHER_SITE};
pub use worker::{SiteWorker, WorkerContext};
