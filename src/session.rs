use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{FtmsError, Result},
    frame::TreadmillSample,
    types::Speed,
};

/// Running state of one workout between resets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSession {
    /// Latest total distance reported by the machine (meters)
    pub distance: u32,
    /// Latest elapsed time reported by the machine (seconds)
    pub elapsed_time: u32,
    /// Highest instantaneous speed seen
    pub max_speed: Speed,
    /// Every speed reading, in arrival order
    pub speed_readings: Vec<Speed>,
}

impl WorkoutSession {
    /// Whether anything worth saving has been observed
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.distance != 0 || self.elapsed_time != 0
    }

    /// Arithmetic mean of all speed readings, `None` if there are none
    ///
    /// The mean is rounded half-to-even at the hundredth of a km/h.
    #[must_use]
    pub fn average_speed(&self) -> Option<Speed> {
        let count = u64::try_from(self.speed_readings.len()).ok()?;
        if count == 0 {
            return None;
        }

        let sum: u64 = self
            .speed_readings
            .iter()
            .map(|speed| u64::from(speed.hundredths()))
            .sum();
        let (quotient, remainder) = (sum / count, sum % count);
        let mean = match (remainder * 2).cmp(&count) {
            std::cmp::Ordering::Less => quotient,
            std::cmp::Ordering::Greater => quotient + 1,
            std::cmp::Ordering::Equal => quotient + (quotient % 2),
        };

        // the mean of u16 values always fits in a u16
        u16::try_from(mean).ok().map(Speed::from_hundredths)
    }
}

/// A saved, immutable workout summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedWorkout {
    /// Unique identifier
    pub id: Uuid,
    /// When the workout was saved
    pub date: DateTime<Utc>,
    /// Total distance (meters)
    pub distance: u32,
    /// Elapsed time (seconds)
    pub elapsed_time: u32,
    /// Highest speed (km/h)
    pub max_speed: Speed,
    /// Mean speed (km/h), absent if no readings were taken
    pub avg_speed: Option<Speed>,
}

impl SavedWorkout {
    /// Snapshot a session into a new saved workout
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::NoData`] if neither distance nor elapsed time was observed.
    pub fn from_session(session: &WorkoutSession, date: DateTime<Utc>) -> Result<Self> {
        if !session.has_data() {
            return Err(FtmsError::NoData);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            date,
            distance: session.distance,
            elapsed_time: session.elapsed_time,
            max_speed: session.max_speed,
            avg_speed: session.average_speed(),
        })
    }
}

/// Accumulates decoded samples into a [`WorkoutSession`]
///
/// One aggregator belongs to one active connection. It never resets on its
/// own; call [`SessionAggregator::reset`] when a connection starts and after
/// each successful save.
#[derive(Debug, Default)]
pub struct SessionAggregator {
    session: WorkoutSession,
}

impl SessionAggregator {
    /// Create an aggregator with an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded sample into the session
    ///
    /// Distance and elapsed time are cumulative on the machine, so present
    /// values replace the stored ones. Absent fields leave the session untouched.
    pub fn observe(&mut self, sample: &TreadmillSample) {
        let session = &mut self.session;

        session.speed_readings.push(sample.speed);
        session.max_speed = session.max_speed.max(sample.speed);

        if let Some(distance) = sample.distance {
            session.distance = distance;
        }
        if let Some(elapsed) = sample.elapsed_time {
            session.elapsed_time = u32::from(elapsed);
        }

        debug!(
            "Session: distance={}m elapsed={}s max={} readings={}",
            session.distance,
            session.elapsed_time,
            session.max_speed,
            session.speed_readings.len()
        );
    }

    /// Clear the session back to its empty state
    pub fn reset(&mut self) {
        self.session = WorkoutSession::default();
    }

    /// Borrow the current session
    #[must_use]
    pub const fn session(&self) -> &WorkoutSession {
        &self.session
    }

    /// Copy of the current session for display
    #[must_use]
    pub fn snapshot(&self) -> WorkoutSession {
        self.session.clone()
    }

    /// Build a [`SavedWorkout`] from the current session
    ///
    /// The session is left as is; the caller resets it once the workout is stored.
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::NoData`] if distance and elapsed time are both zero.
    pub fn finalize(&self) -> Result<SavedWorkout> {
        SavedWorkout::from_session(&self.session, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Incline;

    fn sample(speed: u16, distance: Option<u32>, elapsed_time: Option<u16>) -> TreadmillSample {
        TreadmillSample {
            speed: Speed::from_hundredths(speed),
            distance,
            incline: None,
            elapsed_time,
        }
    }

    #[test]
    fn test_observe_tracks_speed() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, None, None));
        aggregator.observe(&sample(700, None, None));
        aggregator.observe(&sample(600, None, None));

        let session = aggregator.snapshot();
        assert_eq!(session.max_speed, Speed::from_hundredths(700));
        assert_eq!(session.speed_readings.len(), 3);
        assert_eq!(session.speed_readings[2], Speed::from_hundredths(600));
    }

    #[test]
    fn test_absent_fields_never_overwrite() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, Some(1500), Some(600)));
        aggregator.observe(&sample(500, None, None));

        assert_eq!(aggregator.session().distance, 1500);
        assert_eq!(aggregator.session().elapsed_time, 600);
    }

    #[test]
    fn test_present_fields_overwrite_not_sum() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, Some(100), Some(10)));
        aggregator.observe(&sample(500, Some(250), Some(25)));

        assert_eq!(aggregator.session().distance, 250);
        assert_eq!(aggregator.session().elapsed_time, 25);
    }

    #[test]
    fn test_incline_does_not_affect_session() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&TreadmillSample {
            incline: Some(Incline::from_tenths(30)),
            ..sample(400, None, None)
        });

        assert_eq!(aggregator.session().distance, 0);
        assert_eq!(aggregator.session().speed_readings.len(), 1);
    }

    #[test]
    fn test_average_speed() {
        let session = WorkoutSession {
            speed_readings: vec![
                Speed::from_hundredths(500),
                Speed::from_hundredths(600),
                Speed::from_hundredths(700),
            ],
            ..WorkoutSession::default()
        };
        assert_eq!(session.average_speed().unwrap().to_string(), "6.00");

        assert_eq!(WorkoutSession::default().average_speed(), None);
    }

    #[test]
    fn test_average_speed_rounds_half_to_even() {
        let readings = |raw: &[u16]| WorkoutSession {
            speed_readings: raw.iter().copied().map(Speed::from_hundredths).collect(),
            ..WorkoutSession::default()
        };

        // 500.5 -> 500, 501.5 -> 502
        assert_eq!(readings(&[500, 501]).average_speed().unwrap().hundredths(), 500);
        assert_eq!(readings(&[501, 502]).average_speed().unwrap().hundredths(), 502);
        // 100.33 -> 100, 100.67 -> 101
        assert_eq!(readings(&[100, 100, 101]).average_speed().unwrap().hundredths(), 100);
        assert_eq!(readings(&[100, 101, 101]).average_speed().unwrap().hundredths(), 101);
    }

    #[test]
    fn test_finalize_without_data() {
        let aggregator = SessionAggregator::new();
        assert!(matches!(aggregator.finalize(), Err(FtmsError::NoData)));

        // speed readings alone are not enough
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, None, None));
        assert!(matches!(aggregator.finalize(), Err(FtmsError::NoData)));
    }

    #[test]
    fn test_finalize_with_distance_or_time() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(0, Some(1), None));
        assert!(aggregator.finalize().is_ok());

        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(0, None, Some(1)));
        assert!(aggregator.finalize().is_ok());
    }

    #[test]
    fn test_finalize_summary() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, Some(100), Some(20)));
        aggregator.observe(&sample(600, Some(200), Some(40)));
        aggregator.observe(&sample(700, Some(300), Some(60)));

        let workout = aggregator.finalize().unwrap();
        assert_eq!(workout.distance, 300);
        assert_eq!(workout.elapsed_time, 60);
        assert_eq!(workout.max_speed.to_string(), "7.00");
        assert_eq!(workout.avg_speed.map(|s| s.to_string()), Some("6.00".to_string()));

        // finalize does not reset
        assert_eq!(aggregator.session().distance, 300);

        let other = aggregator.finalize().unwrap();
        assert_ne!(workout.id, other.id);
    }

    #[test]
    fn test_reset() {
        let mut aggregator = SessionAggregator::new();
        aggregator.observe(&sample(500, Some(100), Some(20)));
        aggregator.reset();

        assert_eq!(aggregator.snapshot(), WorkoutSession::default());
        assert!(!aggregator.session().has_data());
    }

    #[test]
    fn test_saved_workout_serialization() {
        let session = WorkoutSession {
            distance: 1000,
            elapsed_time: 300,
            max_speed: Speed::from_hundredths(812),
            speed_readings: vec![],
        };
        let workout = SavedWorkout::from_session(&session, Utc::now()).unwrap();
        let json = serde_json::to_value(&workout).unwrap();

        assert_eq!(json["distance"], 1000);
        assert_eq!(json["elapsedTime"], 300);
        assert_eq!(json["maxSpeed"], "8.12");
        assert!(json["avgSpeed"].is_null());

        let back: SavedWorkout = serde_json::from_value(json).unwrap();
        assert_eq!(back, workout);
    }
}
