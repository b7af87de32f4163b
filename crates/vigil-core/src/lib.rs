//! vigil-core — the face-watch alerting pipeline.
//!
//! Takes identified-face observations from an external recognizer, filters
//! them by confidence, de-duplicates per identity, and fans alerts out to
//! the configured notification channels while keeping a durable CSV
//! detection log with snapshot images.

pub mod channels;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod engine;
pub mod log;
pub mod profile;
pub mod tracker;
pub mod types;

pub use channels::{AlertEvent, ChannelError, NotificationChannel};
pub use config::WatchConfig;
pub use dispatch::AlertDispatcher;
pub use engine::WatchEngine;
pub use log::{CaptureKind, DetectionLog, LogEntry, LogError};
pub use profile::{IdentityDirectory, IdentityProfile};
pub use tracker::AlertTracker;
pub use types::{FaceObservation, IdentityId, SourceEvent};
