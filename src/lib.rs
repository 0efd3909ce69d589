//! autofanfic library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod fanfic;
pub mod metrics;
pub mod notifications;
pub mod watcher;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use fanfic::{Dispatcher, SiteRouter, WorkerContext};
pub use notifications::{NotificationService, Notifier};
pub use watcher::FolderWatcher;
