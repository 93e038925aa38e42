use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{FtmsError, Result},
    raw_log::{trim, RawLogEntry, RawLogSink},
    session::SavedWorkout,
    types::DEFAULT_RAW_LOG_CAPACITY,
};

/// File holding the list of saved workouts
pub const WORKOUTS_FILE: &str = "workouts.json";

/// File holding the raw frame log
pub const RAW_LOG_FILE: &str = "raw_log.json";

/// Append-only record store keeping each list as one JSON document
///
/// Missing files read as empty lists.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
    raw_log_capacity: usize,
}

impl JsonStore {
    /// Open a store in `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns [`crate::FtmsError::Storage`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_capacity(dir, DEFAULT_RAW_LOG_CAPACITY)
    }

    /// Open a store with a custom raw log capacity
    ///
    /// # Errors
    ///
    /// Returns [`crate::FtmsError::Storage`] if the directory cannot be created.
    pub fn with_capacity(dir: impl Into<PathBuf>, raw_log_capacity: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            raw_log_capacity,
        })
    }

    /// Directory backing this store
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All saved workouts, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the workouts file exists but cannot be read or parsed.
    pub fn workouts(&self) -> Result<Vec<SavedWorkout>> {
        self.read_list(WORKOUTS_FILE)
    }

    /// Append a workout
    ///
    /// # Errors
    ///
    /// Returns an error if the workouts file cannot be read or written.
    pub fn save_workout(&self, workout: &SavedWorkout) -> Result<()> {
        let mut workouts = self.workouts()?;
        workouts.push(workout.clone());
        self.write_list(WORKOUTS_FILE, &workouts)?;

        info!(
            "Workout {} saved: {}m in {}s, max {} km/h",
            workout.id, workout.distance, workout.elapsed_time, workout.max_speed
        );
        Ok(())
    }

    /// Delete a workout by identifier
    ///
    /// Returns `false` if no workout had that identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the workouts file cannot be read or written.
    pub fn delete_workout(&self, id: Uuid) -> Result<bool> {
        let mut workouts = self.workouts()?;
        let before = workouts.len();
        workouts.retain(|w| w.id != id);

        if workouts.len() == before {
            debug!("Workout {} not found, nothing deleted", id);
            return Ok(false);
        }

        self.write_list(WORKOUTS_FILE, &workouts)?;
        info!("Workout {} deleted", id);
        Ok(true)
    }

    /// Raw frame log, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the raw log file exists but cannot be read or parsed.
    pub fn raw_log(&self) -> Result<Vec<RawLogEntry>> {
        self.read_list(RAW_LOG_FILE)
    }

    /// Append a raw frame entry, keeping only the most recent entries
    ///
    /// An unreadable raw log is discarded and started over; workouts are
    /// never treated this way.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw log file cannot be read or written.
    pub fn append_raw(&self, entry: RawLogEntry) -> Result<()> {
        let mut entries = match self.raw_log() {
            Ok(entries) => entries,
            Err(FtmsError::Serialization(e)) => {
                warn!("Discarding corrupt raw log: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        entries.push(entry);
        self.write_list(RAW_LOG_FILE, &trim(entries, self.raw_log_capacity))
    }

    /// Remove the raw frame log
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear_raw_log(&self) -> Result<()> {
        match fs::remove_file(self.dir.join(RAW_LOG_FILE)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn read_list<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_list<T: Serialize>(&self, name: &str, items: &[T]) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec(items)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl RawLogSink for JsonStore {
    fn append(&mut self, entry: RawLogEntry) -> Result<()> {
        self.append_raw(entry)
    }
}
