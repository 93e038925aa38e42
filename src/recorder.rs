use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::Result,
    frame::{decode, TreadmillSample},
    raw_log::{RawLog, RawLogEntry, RawLogSink},
    session::{SavedWorkout, SessionAggregator, WorkoutSession},
    storage::JsonStore,
    types::RecorderConfig,
};

/// Turns incoming notifications into session state and raw log entries
///
/// Every frame is logged, including frames that fail to decode. A bad frame
/// is skipped and never affects the session or later frames.
#[derive(Debug, Default)]
pub struct Recorder<S = RawLog> {
    aggregator: SessionAggregator,
    raw_log: S,
}

impl Recorder<RawLog> {
    /// Create a recorder with an in-memory raw log
    #[must_use]
    pub fn with_config(config: &RecorderConfig) -> Self {
        Self::new(RawLog::with_capacity(config.raw_log_capacity))
    }
}

impl<S: RawLogSink> Recorder<S> {
    /// Create a recorder writing raw frames to `raw_log`
    pub fn new(raw_log: S) -> Self {
        Self {
            aggregator: SessionAggregator::new(),
            raw_log,
        }
    }

    /// Begin a fresh session, discarding anything unsaved
    pub fn start_session(&mut self) {
        self.aggregator.reset();
    }

    /// Decode one notification, log it and fold it into the session
    ///
    /// # Errors
    ///
    /// Returns the decode error for malformed frames. The frame is still
    /// logged, with no parsed payload.
    pub fn handle_notification(
        &mut self,
        characteristic: Uuid,
        frame: &[u8],
    ) -> Result<TreadmillSample> {
        let decoded = decode(frame);
        if let Err(e) = &decoded {
            warn!("Skipping frame from {}: {}", characteristic, e);
        }

        let entry = RawLogEntry::new(characteristic, frame, decoded.as_ref().ok().copied());
        if let Err(e) = self.raw_log.append(entry) {
            warn!("Failed to store raw frame: {}", e);
        }

        let sample = decoded?;
        self.aggregator.observe(&sample);
        Ok(sample)
    }

    /// Current session state
    #[must_use]
    pub fn session(&self) -> WorkoutSession {
        self.aggregator.snapshot()
    }

    /// Finalize the session, persist it, then start a new session
    ///
    /// The session is kept if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FtmsError::NoData`] if there is nothing to save, or a
    /// storage error if the workout could not be written.
    pub fn save_workout(&mut self, store: &JsonStore) -> Result<SavedWorkout> {
        let workout = self.aggregator.finalize()?;
        store.save_workout(&workout)?;
        self.aggregator.reset();

        info!("Session saved as workout {}", workout.id);
        Ok(workout)
    }

    /// Raw frame sink
    pub const fn raw_log(&self) -> &S {
        &self.raw_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ble::TREADMILL_DATA_UUID, error::FtmsError, frame::FrameFlags};

    fn frame(speed: u16, distance: u32, elapsed: u16) -> Vec<u8> {
        let flags = FrameFlags::TOTAL_DISTANCE | FrameFlags::ELAPSED_TIME;
        let mut data = Vec::new();
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&speed.to_le_bytes());
        data.extend_from_slice(&distance.to_le_bytes()[..3]);
        data.extend_from_slice(&elapsed.to_le_bytes());
        data
    }

    #[test]
    fn test_valid_frames_update_session() {
        let mut recorder = Recorder::new(RawLog::default());
        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(500, 10, 5))
            .unwrap();
        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(700, 20, 10))
            .unwrap();

        let session = recorder.session();
        assert_eq!(session.distance, 20);
        assert_eq!(session.elapsed_time, 10);
        assert_eq!(session.max_speed.to_string(), "7.00");
        assert_eq!(recorder.raw_log().len(), 2);
    }

    #[test]
    fn test_malformed_frame_is_logged_and_skipped() {
        let mut recorder = Recorder::new(RawLog::default());
        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(500, 10, 5))
            .unwrap();

        let full = frame(900, 99, 99);
        let truncated = &full[..8];
        let err = recorder
            .handle_notification(TREADMILL_DATA_UUID, truncated)
            .unwrap_err();
        assert!(matches!(err, FtmsError::TruncatedFrame { .. }));

        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(600, 30, 15))
            .unwrap();

        let session = recorder.session();
        assert_eq!(session.distance, 30);
        assert_eq!(session.speed_readings.len(), 2);
        assert_eq!(session.max_speed.to_string(), "6.00");

        let entries = recorder.raw_log().entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].parsed.is_some());
        assert!(entries[1].parsed.is_none());
        assert_eq!(entries[1].bytes, truncated);
        assert!(entries[2].parsed.is_some());
    }

    #[test]
    fn test_raw_log_capacity_from_config() {
        let mut recorder = Recorder::with_config(&RecorderConfig {
            raw_log_capacity: 2,
        });
        for speed in [100, 200, 300] {
            recorder
                .handle_notification(TREADMILL_DATA_UUID, &frame(speed, 1, 1))
                .unwrap();
        }

        let entries = recorder.raw_log().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].parsed.map(|p| p.speed.hundredths()), Some(200));
        // the session still saw every frame
        assert_eq!(recorder.session().speed_readings.len(), 3);
    }

    #[test]
    fn test_start_session_discards_state() {
        let mut recorder = Recorder::new(RawLog::default());
        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(500, 10, 5))
            .unwrap();
        recorder.start_session();

        assert_eq!(recorder.session(), WorkoutSession::default());
        // the raw log survives session boundaries
        assert_eq!(recorder.raw_log().len(), 1);
    }

    #[test]
    fn test_save_workout_resets_session() {
        let dir = std::env::temp_dir().join(format!("treadlog-recorder-{}", Uuid::new_v4()));
        let store = JsonStore::new(&dir).unwrap();
        let mut recorder = Recorder::new(RawLog::default());

        assert!(matches!(
            recorder.save_workout(&store),
            Err(FtmsError::NoData)
        ));
        assert!(store.workouts().unwrap().is_empty());

        recorder
            .handle_notification(TREADMILL_DATA_UUID, &frame(500, 1000, 300))
            .unwrap();
        let saved = recorder.save_workout(&store).unwrap();

        assert_eq!(saved.distance, 1000);
        assert_eq!(saved.avg_speed.map(|s| s.to_string()), Some("5.00".to_string()));
        assert_eq!(store.workouts().unwrap(), vec![saved]);
        assert_eq!(recorder.session(), WorkoutSession::default());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_persistent_raw_log() {
        let dir = std::env::temp_dir().join(format!("treadlog-recorder-{}", Uuid::new_v4()));
        let mut recorder = Recorder::new(JsonStore::with_capacity(&dir, 2).unwrap());

        for speed in [100, 200, 300] {
            recorder
                .handle_notification(TREADMILL_DATA_UUID, &frame(speed, 1, 1))
                .unwrap();
        }
        let _ = recorder.handle_notification(TREADMILL_DATA_UUID, &[0x00]);

        let entries = recorder.raw_log().raw_log().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].parsed.map(|p| p.speed.hundredths()), Some(300));
        assert_eq!(entries[1].hex, "00");
        assert!(entries[1].parsed.is_none());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
