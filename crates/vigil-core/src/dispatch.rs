use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::channels::{AlertEvent, ChannelError, NotificationChannel};
use crate::cooldown::CooldownGate;

/// Fans one alert event out to every configured channel.
///
/// Deliveries run as detached tasks; the frame loop never waits on them
/// and a failing channel only produces a log line. The cooldown gate is
/// consulted on the calling task, before anything is spawned, so the
/// rate-limit state needs no locking.
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    gate: CooldownGate,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels, gate: CooldownGate::new() }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Dispatch `event` now. Returns the number of deliveries spawned.
    pub fn dispatch(&mut self, event: &AlertEvent) -> usize {
        self.dispatch_at(event, Instant::now())
    }

    /// Dispatch with an explicit clock reading, for deterministic tests.
    pub fn dispatch_at(&mut self, event: &AlertEvent, now: Instant) -> usize {
        let mut spawned = 0;
        for channel in &self.channels {
            if let Some(cooldown) = channel.cooldown() {
                if !self.gate.try_fire(channel.name(), cooldown, now) {
                    debug!(
                        channel = channel.name(),
                        alert = %event.alert_id,
                        "delivery suppressed by cooldown"
                    );
                    continue;
                }
            }
            let channel = Arc::clone(channel);
            let event = event.clone();
            tokio::spawn(async move {
                match channel.deliver(&event).await {
                    Ok(()) => {
                        info!(channel = channel.name(), alert = %event.alert_id, "notification delivered")
                    }
                    Err(ChannelError::Unavailable(missing)) => {
                        warn!(
                            channel = channel.name(),
                            alert = %event.alert_id,
                            missing,
                            "channel not configured; delivery skipped"
                        )
                    }
                    Err(err) => {
                        warn!(
                            channel = channel.name(),
                            alert = %event.alert_id,
                            error = %err,
                            "notification delivery failed"
                        )
                    }
                }
            });
            spawned += 1;
        }
        spawned
    }
}
