use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum-interval gate for rate-limited notification channels.
///
/// Tracks the last successful fire per channel name. Suppression is
/// silent apart from a debug line at the call site; suppressed deliveries
/// are dropped, not queued.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fire: HashMap<String, Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the fire when `channel` is outside its
    /// cooldown window at `now`; `false` when still inside it.
    ///
    /// A delivery exactly at the window boundary is allowed.
    pub fn try_fire(&mut self, channel: &str, cooldown: Duration, now: Instant) -> bool {
        if let Some(last) = self.last_fire.get(channel) {
            if now.saturating_duration_since(*last) < cooldown {
                return false;
            }
        }
        self.last_fire.insert(channel.to_string(), now);
        true
    }
}
