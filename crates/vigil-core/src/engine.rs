use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Local;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::AlertEvent;
use crate::dispatch::AlertDispatcher;
use crate::log::{CaptureKind, DetectionLog, LogEntry};
use crate::profile::{IdentityDirectory, IdentityProfile};
use crate::tracker::AlertTracker;
use crate::types::{FaceObservation, IdentityId, SourceEvent};

/// Per-event alerting pipeline: confidence filter, classification,
/// de-duplication, snapshot + log persistence, channel fan-out.
///
/// Side-effect failures are logged and never stop event processing; the
/// only thing that ends a run is the observation stream closing.
pub struct WatchEngine {
    directory: IdentityDirectory,
    log: DetectionLog,
    dispatcher: AlertDispatcher,
    tracker: AlertTracker,
    confidence_threshold: i32,
    /// Most recent decoded frame, used for alert and manual snapshots.
    last_frame: Option<Vec<u8>>,
    /// Most recent accepted observation, used to attribute manual captures.
    last_accepted: Option<(IdentityId, String)>,
    frames: u64,
}

impl WatchEngine {
    pub fn new(
        directory: IdentityDirectory,
        log: DetectionLog,
        dispatcher: AlertDispatcher,
        confidence_threshold: i32,
    ) -> Self {
        Self {
            directory,
            log,
            dispatcher,
            tracker: AlertTracker::new(),
            confidence_threshold,
            last_frame: None,
            last_accepted: None,
            frames: 0,
        }
    }

    /// Process one event from the observation source.
    pub fn process(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Frame { faces, jpeg } => self.process_frame(faces, jpeg),
            SourceEvent::Manual => self.manual_capture(),
        }
    }

    fn process_frame(&mut self, faces: Vec<FaceObservation>, jpeg: Option<String>) {
        if let Some(encoded) = jpeg {
            match BASE64.decode(encoded.as_bytes()) {
                Ok(bytes) => self.last_frame = Some(bytes),
                Err(err) => warn!(error = %err, "frame jpeg failed to decode; keeping previous frame"),
            }
        }
        for face in faces {
            self.process_observation(face);
        }
        self.frames += 1;
    }

    fn process_observation(&mut self, face: FaceObservation) {
        let similarity = face.similarity();
        if similarity <= self.confidence_threshold {
            debug!(id = %face.id, similarity, "below confidence threshold; treated as unknown");
            return;
        }
        // Fail soft on ids with no enrolled profile
        let Some(profile) = self.directory.get(face.id).cloned() else {
            debug!(id = %face.id, similarity, "no profile enrolled for id; treated as unknown");
            return;
        };

        if self.tracker.mark_seen(face.id) {
            announce(&profile, similarity);
        }
        self.last_accepted = Some((face.id, profile.category.clone()));

        if self.directory.is_alert(&profile) && self.tracker.mark_alerted(face.id) {
            self.raise_alert(&profile, similarity);
        }
    }

    /// Persist the snapshot and log row, then fan out notifications.
    ///
    /// The identity is already marked alerted at this point; failures here
    /// are logged once and not retried on later frames.
    fn raise_alert(&mut self, profile: &IdentityProfile, similarity: i32) {
        let alert_id = Uuid::new_v4();
        let detected_at = Local::now().naive_local();

        let Some(jpeg) = self.last_frame.clone() else {
            warn!(alert = %alert_id, id = %profile.id, "no frame available for a snapshot; notifications skipped");
            return;
        };
        let saved = match self.log.save_snapshot_at(&jpeg, CaptureKind::Auto, detected_at) {
            Ok(saved) => saved,
            Err(err) => {
                error!(alert = %alert_id, error = %err, "failed to save alert snapshot; notifications skipped");
                return;
            }
        };

        let entry = LogEntry::at(
            detected_at,
            profile.id,
            profile.category.clone(),
            saved.relative_path.clone(),
        );
        if let Err(err) = self.log.append(&entry) {
            error!(alert = %alert_id, error = %err, "failed to append detection entry");
        }

        let event = AlertEvent {
            alert_id,
            profile: profile.clone(),
            similarity,
            detected_at,
            image_name: saved.file_name,
            image_path: saved.disk_path,
        };
        let spawned = self.dispatcher.dispatch(&event);
        info!(
            alert = %alert_id,
            id = %profile.id,
            name = %profile.name,
            similarity,
            channels = spawned,
            "alert raised"
        );
    }

    /// Save the current frame on operator request and log it against the
    /// most recent accepted identity (id 0, no category, when none).
    fn manual_capture(&mut self) {
        let Some(jpeg) = self.last_frame.clone() else {
            warn!("manual capture requested before any frame was received");
            return;
        };
        let (id, category) = self
            .last_accepted
            .clone()
            .unwrap_or((IdentityId(0), String::new()));
        let stamp = Local::now().naive_local();
        match self.log.save_snapshot_at(&jpeg, CaptureKind::Manual, stamp) {
            Ok(saved) => {
                let entry = LogEntry::at(stamp, id, category, saved.relative_path);
                match self.log.append(&entry) {
                    Ok(()) => info!(id = %id, file = %saved.file_name, "manual capture saved"),
                    Err(err) => error!(error = %err, "failed to append manual capture entry"),
                }
            }
            Err(err) => error!(error = %err, "failed to save manual capture"),
        }
    }

    pub fn tracker(&self) -> &AlertTracker {
        &self.tracker
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}

/// One-time summary printed when an enrolled individual is first accepted.
fn announce(profile: &IdentityProfile, similarity: i32) {
    info!(
        id = %profile.id,
        name = %profile.name,
        category = %profile.category,
        similarity,
        "individual recognized"
    );
    for attr in &profile.attributes {
        info!(label = %attr.label, value = %attr.value, "profile detail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelError, NotificationChannel};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Recorder {
        tx: mpsc::UnboundedSender<AlertEvent>,
    }

    #[async_trait]
    impl NotificationChannel for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn deliver(&self, event: &AlertEvent) -> Result<(), ChannelError> {
            self.tx.send(event.clone()).unwrap();
            Ok(())
        }
    }

    fn profile(id: u32, name: &str, category: &str) -> IdentityProfile {
        IdentityProfile { id: IdentityId(id), name: name.into(), category: category.into(), attributes: vec![] }
    }

    fn engine(dir: &TempDir) -> (WatchEngine, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let directory = IdentityDirectory::new(
            vec![profile(1, "John Doe", "Flagged"), profile(2, "Jane Roe", "Staff")],
            "flagged",
        );
        let log = DetectionLog::new(
            dir.path().join("detection_log.csv"),
            dir.path().join("captured_faces/alerts"),
            "captured_faces/alerts",
        );
        let dispatcher = AlertDispatcher::new(vec![Arc::new(Recorder { tx })]);
        (WatchEngine::new(directory, log, dispatcher, 30), rx)
    }

    fn frame(faces: Vec<(u32, f32)>, with_jpeg: bool) -> SourceEvent {
        SourceEvent::Frame {
            faces: faces
                .into_iter()
                .map(|(id, distance)| FaceObservation { id: IdentityId(id), distance, bbox: None })
                .collect(),
            jpeg: with_jpeg.then(|| BASE64.encode(b"jpegdata")),
        }
    }

    async fn expect_alert(rx: &mut mpsc::UnboundedReceiver<AlertEvent>) -> AlertEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("alert timed out")
            .expect("channel closed")
    }

    fn log_of(dir: &TempDir) -> DetectionLog {
        DetectionLog::new(
            dir.path().join("detection_log.csv"),
            dir.path().join("captured_faces/alerts"),
            "captured_faces/alerts",
        )
    }

    #[tokio::test]
    async fn test_alert_fires_once_per_identity() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        for _ in 0..3 {
            engine.process(frame(vec![(1, 40.0)], true));
        }

        let event = expect_alert(&mut rx).await;
        assert_eq!(event.profile.name, "John Doe");
        assert_eq!(event.similarity, 60);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        let entries = log_of(&dir).read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity, IdentityId(1));
        assert_eq!(entries[0].category, "Flagged");
        assert!(entries[0].image_path.starts_with("captured_faces/alerts/auto_capture_"));
        assert!(dir.path().join("captured_faces/alerts").join(&event.image_name).exists());
    }

    #[tokio::test]
    async fn test_below_threshold_is_ignored() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        // distance 70 gives similarity exactly 30: not strictly above the threshold
        engine.process(frame(vec![(1, 70.0)], true));

        assert_eq!(engine.tracker().seen_count(), 0);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(log_of(&dir).read_all(), Err(crate::log::LogError::NotFound)));

        // distance 69 gives similarity 31, the first accepted value
        engine.process(frame(vec![(1, 69.0)], true));
        assert_eq!(engine.tracker().seen_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_fails_soft() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        engine.process(frame(vec![(99, 10.0)], true));

        assert_eq!(engine.tracker().seen_count(), 0);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_benign_category_never_alerts() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        engine.process(frame(vec![(2, 20.0)], true));
        engine.process(frame(vec![(2, 20.0)], true));

        assert!(engine.tracker().is_seen(IdentityId(2)));
        assert!(!engine.tracker().is_alerted(IdentityId(2)));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(log_of(&dir).read_all(), Err(crate::log::LogError::NotFound)));
    }

    #[tokio::test]
    async fn test_manual_capture_uses_last_accepted_identity() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        engine.process(frame(vec![(1, 40.0)], true));
        expect_alert(&mut rx).await;
        engine.process(SourceEvent::Manual);

        let entries = log_of(&dir).read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].identity, IdentityId(1));
        assert_eq!(entries[1].category, "Flagged");
        assert!(entries[1].image_path.contains("manual_capture_"));
    }

    #[tokio::test]
    async fn test_manual_capture_without_observation_logs_id_zero() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _rx) = engine(&dir);

        engine.process(frame(vec![], true));
        engine.process(SourceEvent::Manual);

        let entries = log_of(&dir).read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity, IdentityId(0));
        assert_eq!(entries[0].category, "");
    }

    #[tokio::test]
    async fn test_manual_capture_before_any_frame_is_noop() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _rx) = engine(&dir);

        engine.process(SourceEvent::Manual);

        assert!(!dir.path().join("detection_log.csv").exists());
    }

    #[tokio::test]
    async fn test_alert_without_frame_skips_side_effects() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut rx) = engine(&dir);

        engine.process(frame(vec![(1, 40.0)], false));

        // the id stays alerted: side effects are not retried on later frames
        assert!(engine.tracker().is_alerted(IdentityId(1)));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(!dir.path().join("detection_log.csv").exists());
    }

    #[tokio::test]
    async fn test_frame_counter_advances() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _rx) = engine(&dir);

        engine.process(frame(vec![], false));
        engine.process(frame(vec![], true));
        engine.process(SourceEvent::Manual);

        assert_eq!(engine.frames_processed(), 2);
    }
}
