//! Notification channels fanned out to when an alert fires.
//!
//! Each channel is a capability behind one trait so the dispatcher can
//! treat alarm, email, and SMS uniformly and tests can substitute mocks.

mod alarm;
mod email;
mod sms;

pub use alarm::AlarmChannel;
pub use email::EmailChannel;
pub use sms::SmsChannel;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::log::TIMESTAMP_FORMAT;
use crate::profile::IdentityProfile;

/// A notification ready to fan out, captured at dispatch time.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// Correlation id carried through delivery logs.
    pub alert_id: Uuid,
    pub profile: IdentityProfile,
    /// Similarity percentage of the observation that triggered the alert.
    pub similarity: i32,
    pub detected_at: NaiveDateTime,
    /// Snapshot filename, used as the attachment name.
    pub image_name: String,
    /// Snapshot location on disk.
    pub image_path: PathBuf,
}

impl AlertEvent {
    /// Detection time rendered the way it appears in the log.
    pub fn timestamp_text(&self) -> String {
        self.detected_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Delivery failure for a single channel. Never propagates past the
/// dispatcher; the recognition loop does not see these.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel is missing configuration (usually credentials) and is
    /// degraded for this run.
    #[error("channel not configured: missing {0}")]
    Unavailable(&'static str),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// One side-effect channel (alarm, email, SMS, or a test double).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable name used in logs and as the rate-limiter key.
    fn name(&self) -> &'static str;

    /// Minimum interval between deliveries, for rate-limited channels.
    fn cooldown(&self) -> Option<Duration> {
        None
    }

    /// Deliver one alert. Implementations must not panic; all failure
    /// modes are reported through the error.
    async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelError>;
}
