//! Outbound notifications

mod apprise;
mod models;
mod pushbullet;
mod service;

pub use apprise::AppriseTransport;
pub use models::{NotificationEvent, NotificationKind};
pub use pushbullet::PushbulletTransport;
pub use service::{NotificationService, NotificationTransport, Notifier};
