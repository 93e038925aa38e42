use btleplug::{
    api::{
        BDAddr, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        ValueNotification,
    },
    platform::{Manager, Peripheral},
};
use bytes::{Buf, Bytes};
use futures::stream::{Stream, StreamExt};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{FtmsError, Result},
    types::{ConnectionParams, DeviceInfo, MachineType},
};

/// Fitness Machine Service (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5F9B_34FB);
/// Treadmill Data characteristic (0x2ACD)
pub const TREADMILL_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ACD_0000_1000_8000_0080_5F9B_34FB);
/// Rower Data characteristic (0x2AD1)
pub const ROWER_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2AD1_0000_1000_8000_0080_5F9B_34FB);
/// Indoor Bike Data characteristic (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid =
    Uuid::from_u128(0x0000_2AD2_0000_1000_8000_0080_5F9B_34FB);
/// Cross Trainer Data characteristic (0x2AD3)
pub const CROSS_TRAINER_DATA_UUID: Uuid =
    Uuid::from_u128(0x0000_2AD3_0000_1000_8000_0080_5F9B_34FB);
/// Step Climber Data characteristic (0x2AD4)
pub const STEP_CLIMBER_DATA_UUID: Uuid =
    Uuid::from_u128(0x0000_2AD4_0000_1000_8000_0080_5F9B_34FB);
/// Stair Climber Data characteristic (0x2AD5)
pub const STAIR_CLIMBER_DATA_UUID: Uuid =
    Uuid::from_u128(0x0000_2AD5_0000_1000_8000_0080_5F9B_34FB);
/// Fitness Machine Control Point characteristic (0x2AD9), never written by this crate
pub const CONTROL_POINT_UUID: Uuid = Uuid::from_u128(0x0000_2AD9_0000_1000_8000_0080_5F9B_34FB);
/// Fitness Machine Status characteristic (0x2ADA)
pub const MACHINE_STATUS_UUID: Uuid = Uuid::from_u128(0x0000_2ADA_0000_1000_8000_0080_5F9B_34FB);
/// Fitness Machine Feature characteristic (0x2ACC)
pub const MACHINE_FEATURE_UUID: Uuid =
    Uuid::from_u128(0x0000_2ACC_0000_1000_8000_0080_5F9B_34FB);

const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180D_0000_1000_8000_0080_5F9B_34FB);
const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180F_0000_1000_8000_0080_5F9B_34FB);
const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180A_0000_1000_8000_0080_5F9B_34FB);
const GENERIC_ACCESS_UUID: Uuid = Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5F9B_34FB);
const GENERIC_ATTRIBUTE_UUID: Uuid = Uuid::from_u128(0x0000_1801_0000_1000_8000_0080_5F9B_34FB);

/// Human-readable name of a known GATT service
#[must_use]
pub fn service_name(uuid: Uuid) -> Option<&'static str> {
    match uuid {
        u if u == FTMS_SERVICE_UUID => Some("FTMS (Fitness Machine)"),
        u if u == HEART_RATE_SERVICE_UUID => Some("Heart Rate"),
        u if u == BATTERY_SERVICE_UUID => Some("Battery"),
        u if u == DEVICE_INFO_SERVICE_UUID => Some("Device Info"),
        u if u == GENERIC_ACCESS_UUID => Some("Generic Access"),
        u if u == GENERIC_ATTRIBUTE_UUID => Some("Generic Attribute"),
        _ => None,
    }
}

/// One notification received from the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Characteristic the value was received on
    pub characteristic: Uuid,
    /// Raw value
    pub value: Bytes,
}

/// BLE manager for fitness machine discovery
pub struct BleManager {
    manager: Manager,
    peripherals: Arc<Mutex<HashMap<BDAddr, Peripheral>>>,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::Ble`] if the Bluetooth adapter cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        Ok(Self {
            manager,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Scan for devices advertising the Fitness Machine Service
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::DeviceNotFound`] if no Bluetooth adapters are available,
    /// or [`FtmsError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_for_devices(&self, params: &ConnectionParams) -> Result<Vec<DeviceInfo>> {
        info!("Starting scan for FTMS devices...");

        let adapters = self.manager.adapters().await?;
        let central = adapters.first().ok_or(FtmsError::DeviceNotFound)?;

        let scan_filter = ScanFilter {
            services: vec![FTMS_SERVICE_UUID],
        };

        central.start_scan(scan_filter).await?;

        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;

        central.stop_scan().await?;

        let peripherals = central.peripherals().await?;
        let mut devices = Vec::new();
        for peripheral in peripherals {
            if let Some(device_info) = Self::ftms_device_info(&peripheral).await {
                info!("Found FTMS device: {}", device_info.name);
                devices.push(device_info);

                self.peripherals
                    .lock()
                    .await
                    .insert(peripheral.address(), peripheral);
            }
        }

        info!("Scan completed. Found {} FTMS device(s)", devices.len());
        Ok(devices)
    }

    /// Connect to a scanned device and subscribe to treadmill data
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::DeviceNotFound`] if the device was not seen during the scan,
    /// [`FtmsError::Timeout`] if connection times out,
    /// [`FtmsError::ConnectionFailed`] if connection fails,
    /// or [`FtmsError::Protocol`] if the device lacks the treadmill data characteristic.
    pub async fn connect_to_device(
        &self,
        device_info: &DeviceInfo,
        params: &ConnectionParams,
    ) -> Result<FtmsConnection> {
        info!("Connecting to device: {}", device_info.name);

        let peripheral = self
            .peripherals
            .lock()
            .await
            .iter()
            .find(|(address, _)| {
                device_info.mac_address.as_deref() == Some(address.to_string().as_str())
            })
            .map(|(_, peripheral)| peripheral.clone())
            .ok_or(FtmsError::DeviceNotFound)?;

        timeout(Duration::from_millis(params.timeout_ms), peripheral.connect())
            .await
            .map_err(|_| FtmsError::Timeout {
                timeout_ms: params.timeout_ms,
            })?
            .map_err(|e| FtmsError::ConnectionFailed(e.to_string()))?;

        let connection = release_on_error(Self::setup_connection(&peripheral).await, || {
            peripheral.disconnect()
        })
        .await?;

        info!("Successfully connected to {}", device_info.name);
        Ok(connection)
    }

    /// Discover services, read features and subscribe on a connected peripheral
    async fn setup_connection(peripheral: &Peripheral) -> Result<FtmsConnection> {
        peripheral.discover_services().await?;

        let services = peripheral.services();
        for service in &services {
            match service_name(service.uuid) {
                Some(name) => debug!("Service {} ({})", name, service.uuid),
                None => debug!("Unknown service {}", service.uuid),
            }
        }

        let service = services
            .iter()
            .find(|s| s.uuid == FTMS_SERVICE_UUID)
            .ok_or_else(|| FtmsError::Protocol("FTMS service not found".to_string()))?;

        for characteristic in &service.characteristics {
            if let Some(machine) = MachineType::from_characteristic(characteristic.uuid) {
                info!("Machine data characteristic: {}", machine);
            } else if characteristic.uuid == CONTROL_POINT_UUID {
                debug!("Control point present, not used");
            }
        }

        let data_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == TREADMILL_DATA_UUID)
            .ok_or_else(|| {
                FtmsError::Protocol("Treadmill data characteristic not found".to_string())
            })?
            .clone();

        if !data_char.properties.contains(CharPropFlags::NOTIFY) {
            return Err(FtmsError::Protocol(
                "Treadmill data characteristic does not support notifications".to_string(),
            ));
        }

        let features = match service
            .characteristics
            .iter()
            .find(|c| c.uuid == MACHINE_FEATURE_UUID && c.properties.contains(CharPropFlags::READ))
        {
            Some(feature_char) => read_machine_features(peripheral, feature_char).await,
            None => None,
        };

        let (notification_tx, notification_rx) = mpsc::unbounded_channel();

        // open the stream first so nothing sent right after subscribing is lost
        let notification_stream = peripheral.notifications().await?;
        peripheral.subscribe(&data_char).await?;
        let forwarder = tokio::spawn(forward_notifications(
            notification_stream,
            data_char.uuid,
            notification_tx,
        ));

        Ok(FtmsConnection {
            peripheral: peripheral.clone(),
            data_char,
            features,
            notification_receiver: notification_rx,
            forwarder,
        })
    }

    /// Build device info if the peripheral advertises FTMS
    async fn ftms_device_info(peripheral: &Peripheral) -> Option<DeviceInfo> {
        let properties = peripheral.properties().await.ok().flatten()?;
        if !properties.services.contains(&FTMS_SERVICE_UUID) {
            return None;
        }

        Some(DeviceInfo {
            name: properties
                .local_name
                .unwrap_or_else(|| "Unnamed FTMS device".to_string()),
            mac_address: Some(properties.address.to_string()),
            rssi: properties.rssi.unwrap_or(0),
        })
    }
}

/// Read the Fitness Machine Feature bitmask (u32 little-endian)
async fn read_machine_features(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
) -> Option<u32> {
    match peripheral.read(characteristic).await {
        Ok(value) if value.len() >= 4 => {
            let mut buf = &value[..];
            let features = buf.get_u32_le();
            info!("Machine features: {:#x}", features);
            Some(features)
        }
        Ok(value) => {
            warn!("Machine feature value too short: {} bytes", value.len());
            None
        }
        Err(e) => {
            warn!("Failed to read machine features: {}", e);
            None
        }
    }
}

/// Tear down a half-established connection when setup fails
///
/// The setup error is returned either way; a failed release is only logged.
async fn release_on_error<T, R, F>(result: Result<T>, release: R) -> Result<T>
where
    R: FnOnce() -> F,
    F: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    if let Err(e) = &result {
        warn!("Connection setup failed, disconnecting: {}", e);
        if let Err(release_err) = release().await {
            warn!("Failed to disconnect after setup error: {}", release_err);
        }
    }
    result
}

/// Forward notifications from one characteristic until the receiver goes away
async fn forward_notifications<S>(
    mut notification_stream: S,
    characteristic: Uuid,
    sender: mpsc::UnboundedSender<Notification>,
) where
    S: Stream<Item = ValueNotification> + Unpin,
{
    while let Some(data) = notification_stream.next().await {
        if data.uuid != characteristic {
            continue;
        }

        let notification = Notification {
            characteristic: data.uuid,
            value: Bytes::from(data.value),
        };
        if sender.send(notification).is_err() {
            break;
        }
    }

    debug!("Notification stream closed");
}

/// Active connection to a fitness machine
pub struct FtmsConnection {
    peripheral: Peripheral,
    data_char: Characteristic,
    features: Option<u32>,
    notification_receiver: mpsc::UnboundedReceiver<Notification>,
    forwarder: JoinHandle<()>,
}

impl FtmsConnection {
    /// Wait for the next treadmill data notification
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::Timeout`] if no notification is received within the timeout,
    /// or [`FtmsError::Disconnected`] if the notification stream ended.
    pub async fn receive_notification(&mut self, timeout_ms: u64) -> Result<Notification> {
        timeout(
            Duration::from_millis(timeout_ms),
            self.notification_receiver.recv(),
        )
        .await
        .map_err(|_| FtmsError::Timeout { timeout_ms })?
        .ok_or(FtmsError::Disconnected)
    }

    /// Fitness Machine Feature bitmask, if the machine exposed it
    #[must_use]
    pub const fn machine_features(&self) -> Option<u32> {
        self.features
    }

    /// Check if the device is still connected
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Unsubscribe and disconnect from the device
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::Ble`] if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        if let Err(e) = self.peripheral.unsubscribe(&self.data_char).await {
            warn!("Failed to unsubscribe from treadmill data: {}", e);
        }
        self.forwarder.abort();
        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// Get device address
    #[must_use]
    pub fn address(&self) -> BDAddr {
        self.peripheral.address()
    }
}
