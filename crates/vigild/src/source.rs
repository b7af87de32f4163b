use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};
use vigil_core::SourceEvent;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("detector_command is empty; configure it or pass --replay")]
    EmptyCommand,
    #[error("failed to spawn detector: {0}")]
    Spawn(std::io::Error),
    #[error("failed to open replay file: {0}")]
    Open(std::io::Error),
}

/// Stream of observation events, either from the detector child process
/// or from a recorded replay file.
///
/// Events arrive as newline-delimited JSON; lines that do not parse are
/// skipped with a warning so a glitching detector cannot stall the run.
#[derive(Debug)]
pub struct ObservationSource {
    rx: mpsc::Receiver<SourceEvent>,
}

impl ObservationSource {
    /// Spawn the detector and stream events from its stdout. The child is
    /// killed if the consumer goes away first.
    pub fn spawn_detector(command: &[String]) -> Result<Self, SourceError> {
        let (program, args) = command.split_first().ok_or(SourceError::EmptyCommand)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SourceError::Spawn(std::io::Error::other("detector stdout was not captured"))
        })?;
        info!(detector = %program, "detector spawned");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            read_events(stdout, &tx).await;
            let _ = child.kill().await;
            match child.wait().await {
                Ok(status) => info!(%status, "detector exited"),
                Err(err) => warn!(error = %err, "failed to reap detector"),
            }
        });
        Ok(Self { rx })
    }

    /// Stream events from a recorded file, one JSON object per line.
    pub async fn replay(path: &Path) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await.map_err(SourceError::Open)?;
        info!(path = %path.display(), "replaying recorded observations");
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            read_events(file, &tx).await;
        });
        Ok(Self { rx })
    }

    /// Next event; `None` when the stream has ended.
    pub async fn recv(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }
}

/// Forward newline-delimited JSON events until EOF or the consumer hangs up.
async fn read_events<R: AsyncRead + Unpin>(reader: R, tx: &mpsc::Sender<SourceEvent>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<SourceEvent>(line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => warn!(error = %err, "skipping unparseable observation line"),
                }
            }
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "observation stream read failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let err = ObservationSource::spawn_detector(&[]).unwrap_err();
        assert!(matches!(err, SourceError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_replay_skips_junk_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"kind":"frame","faces":[{{"id":1,"distance":40.0}}]}}"#).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"kind":"manual"}}"#).unwrap();
        file.flush().unwrap();

        let mut source = ObservationSource::replay(file.path()).await.unwrap();
        assert!(matches!(source.recv().await, Some(SourceEvent::Frame { .. })));
        assert!(matches!(source.recv().await, Some(SourceEvent::Manual)));
        assert!(source.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_detector_stdout_is_streamed() {
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"printf '{"kind":"manual"}\n'"#.to_string(),
        ];
        let mut source = ObservationSource::spawn_detector(&command).unwrap();
        assert!(matches!(source.recv().await, Some(SourceEvent::Manual)));
        assert!(source.recv().await.is_none());
    }
}
