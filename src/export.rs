use chrono::NaiveDate;

use crate::{error::Result, raw_log::RawLogEntry, session::SavedWorkout};

/// Header row of the workouts CSV export
///
/// Column names carry no padding; the row reads
/// `Date,Distance(m),Time(s),MaxSpeed(km/h),AvgSpeed(km/h)`.
pub const CSV_HEADER: [&str; 5] = [
    "Date",
    "Distance(m)",
    "Time(s)",
    "MaxSpeed(km/h)",
    "AvgSpeed(km/h)",
];

/// Render saved workouts as CSV, one row per workout
///
/// Returns an empty string when there is nothing to export.
///
/// # Errors
///
/// Returns [`crate::FtmsError::Export`] if a row cannot be written.
pub fn workouts_csv(workouts: &[SavedWorkout]) -> Result<String> {
    if workouts.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for workout in workouts {
        writer.write_record([
            workout.date.format("%Y-%m-%d").to_string(),
            workout.distance.to_string(),
            workout.elapsed_time.to_string(),
            workout.max_speed.to_string(),
            workout
                .avg_speed
                .map(|speed| speed.to_string())
                .unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| crate::FtmsError::Export(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render the raw frame log as a pretty-printed JSON array
///
/// # Errors
///
/// Returns [`crate::FtmsError::Serialization`] if serialization fails.
pub fn raw_log_json(entries: &[RawLogEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Suggested file name for a workouts CSV export made on `date`
#[must_use]
pub fn workouts_file_name(date: NaiveDate) -> String {
    format!("workouts_{}.csv", date.format("%Y-%m-%d"))
}

/// Suggested file name for a raw log export made on `date`
#[must_use]
pub fn raw_log_file_name(date: NaiveDate) -> String {
    format!("ftms_raw_{}.json", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ble::TREADMILL_DATA_UUID, frame::decode, types::Speed};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn workout(avg_speed: Option<Speed>) -> SavedWorkout {
        SavedWorkout {
            id: Uuid::new_v4(),
            date: Utc.with_ymd_and_hms(2026, 10, 16, 7, 30, 0).unwrap(),
            distance: 2500,
            elapsed_time: 1200,
            max_speed: Speed::from_hundredths(750),
            avg_speed,
        }
    }

    #[test]
    fn test_workouts_csv() {
        let csv = workouts_csv(&[workout(Some(Speed::from_hundredths(612))), workout(None)])
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "Date,Distance(m),Time(s),MaxSpeed(km/h),AvgSpeed(km/h)"
        );
        assert_eq!(lines[1], "2026-10-16,2500,1200,7.50,6.12");
        assert_eq!(lines[2], "2026-10-16,2500,1200,7.50,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_csv() {
        assert_eq!(workouts_csv(&[]).unwrap(), "");
    }

    #[test]
    fn test_raw_log_json() {
        let good = [0x04, 0x00, 0xF4, 0x01, 0x34, 0x12, 0x01];
        let bad = [0x04, 0x00, 0xF4];
        let entries = vec![
            RawLogEntry::new(TREADMILL_DATA_UUID, &good, decode(&good).ok()),
            RawLogEntry::new(TREADMILL_DATA_UUID, &bad, decode(&bad).ok()),
        ];

        let json = raw_log_json(&entries).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["hex"], "04 00 f4 01 34 12 01");
        assert_eq!(value[0]["parsed"]["distance"], 70196);
        assert_eq!(value[0]["parsed"]["speed"], "5.00");
        assert_eq!(value[1]["bytes"], serde_json::json!([4, 0, 244]));
        assert!(value[1]["parsed"].is_null());

        let back: Vec<RawLogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn test_file_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(workouts_file_name(date), "workouts_2026-10-16.csv");
        assert_eq!(raw_log_file_name(date), "ftms_raw_2026-10-16.json");
    }
}
