use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AlertEvent, ChannelError, NotificationChannel};

/// Plays a local audio clip by spawning the configured player command.
///
/// Playback is bounded: if the player has not finished after `max_play`
/// it is killed, which counts as a successful delivery since the alarm
/// did sound.
pub struct AlarmChannel {
    player: Vec<String>,
    clip: PathBuf,
    max_play: Duration,
}

impl AlarmChannel {
    pub fn new(player: Vec<String>, clip: impl Into<PathBuf>, max_play: Duration) -> Self {
        Self { player, clip: clip.into(), max_play }
    }
}

#[async_trait]
impl NotificationChannel for AlarmChannel {
    fn name(&self) -> &'static str {
        "alarm"
    }

    async fn deliver(&self, _event: &AlertEvent) -> Result<(), ChannelError> {
        let Some((program, args)) = self.player.split_first() else {
            return Err(ChannelError::Unavailable("alarm player command"));
        };
        if !self.clip.exists() {
            return Err(ChannelError::Delivery(format!(
                "alarm clip not found: {}",
                self.clip.display()
            )));
        }

        let mut child = Command::new(program)
            .args(args)
            .arg(&self.clip)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ChannelError::Delivery(format!("failed to spawn {program}: {err}")))?;

        match tokio::time::timeout(self.max_play, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(ChannelError::Delivery(format!("player exited with {status}"))),
            Ok(Err(err)) => Err(ChannelError::Delivery(format!("player wait failed: {err}"))),
            Err(_) => {
                debug!(bound = ?self.max_play, "alarm playback bound reached; stopping player");
                let _ = child.kill().await;
                Ok(())
            }
        }
    }
}
