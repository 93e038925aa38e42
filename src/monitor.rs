use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    ble::{BleManager, FtmsConnection},
    error::{FtmsError, Result},
    frame::TreadmillSample,
    recorder::Recorder,
    session::{SavedWorkout, WorkoutSession},
    storage::JsonStore,
    types::{ConnectionParams, DeviceInfo},
};

/// Live workout recording from one FTMS treadmill
///
/// `TreadmillMonitor` owns the connection and the single active session.
/// Notifications are handled one at a time, in arrival order.
///
/// # Examples
///
/// ```no_run
/// use treadlog::{JsonStore, TreadmillMonitor};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = JsonStore::new("workouts")?;
///     let monitor = TreadmillMonitor::connect_first(store).await?;
///
///     for _ in 0..60 {
///         match monitor.next_sample(5_000).await {
///             Ok(sample) => println!("{} km/h", sample.speed),
///             Err(e) if e.is_recoverable() => continue,
///             Err(e) => return Err(e.into()),
///         }
///     }
///
///     let workout = monitor.save_workout().await?;
///     println!("Saved {} m", workout.distance);
///     monitor.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct TreadmillMonitor {
    connection: Mutex<Option<FtmsConnection>>,
    device_info: DeviceInfo,
    recorder: Mutex<Recorder<JsonStore>>,
    store: JsonStore,
    #[allow(dead_code)]
    ble_manager: BleManager,
}

impl TreadmillMonitor {
    /// Connect to the first FTMS device found, with default parameters
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::DeviceNotFound`] if no device is found during the
    /// scan, or any error from connecting.
    pub async fn connect_first(store: JsonStore) -> Result<Self> {
        Self::connect_first_with_params(ConnectionParams::default(), store).await
    }

    /// Connect to the first FTMS device found
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::DeviceNotFound`] if no device is found during the
    /// scan, or any error from connecting.
    pub async fn connect_first_with_params(
        params: ConnectionParams,
        store: JsonStore,
    ) -> Result<Self> {
        let ble_manager = BleManager::new().await?;
        let devices = ble_manager.scan_for_devices(&params).await?;
        let device_info = devices
            .into_iter()
            .next()
            .ok_or(FtmsError::DeviceNotFound)?;

        let connection = ble_manager.connect_to_device(&device_info, &params).await?;

        let mut recorder = Recorder::new(store.clone());
        recorder.start_session();

        info!("Recording session from {}", device_info.name);

        Ok(Self {
            connection: Mutex::new(Some(connection)),
            device_info,
            recorder: Mutex::new(recorder),
            store,
            ble_manager,
        })
    }

    /// Information about the connected device
    #[must_use]
    pub const fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Wait for the next notification and record it
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::TruncatedFrame`] for a malformed frame (recording
    /// continues with the next one), [`FtmsError::Timeout`] if nothing arrives
    /// in time, or [`FtmsError::Disconnected`] once the connection is gone.
    pub async fn next_sample(&self, timeout_ms: u64) -> Result<TreadmillSample> {
        let notification = {
            let mut connection = self.connection.lock().await;
            let connection = connection.as_mut().ok_or(FtmsError::Disconnected)?;
            connection.receive_notification(timeout_ms).await?
        };

        self.recorder
            .lock()
            .await
            .handle_notification(notification.characteristic, &notification.value)
    }

    /// Current session state for live display
    pub async fn session(&self) -> WorkoutSession {
        self.recorder.lock().await.session()
    }

    /// Save the current session and start a new one
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::NoData`] if nothing has been recorded yet, or a
    /// storage error.
    pub async fn save_workout(&self) -> Result<SavedWorkout> {
        self.recorder.lock().await.save_workout(&self.store)
    }

    /// Record store used by this monitor
    #[must_use]
    pub const fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Remove all stored raw frames
    ///
    /// # Errors
    ///
    /// Returns a storage error if the raw log cannot be removed.
    pub fn clear_raw_log(&self) -> Result<()> {
        self.store.clear_raw_log()
    }

    /// Check whether the device is still connected
    pub async fn is_connected(&self) -> bool {
        match self.connection.lock().await.as_ref() {
            Some(connection) => connection.is_connected().await,
            None => false,
        }
    }

    /// Disconnect, discarding any unsaved session data
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::Ble`] if the disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.device_info.name);

        let session = {
            let mut recorder = self.recorder.lock().await;
            let session = recorder.session();
            recorder.start_session();
            session
        };
        if session.has_data() {
            warn!(
                "Discarding unsaved session: {}m in {}s",
                session.distance, session.elapsed_time
            );
        }

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.disconnect().await?;
        }

        Ok(())
    }
}
