use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::error::FtmsError;

/// Default number of raw frames kept in the diagnostic log
pub const DEFAULT_RAW_LOG_CAPACITY: usize = 500;

/// Treadmill speed in hundredths of a km/h
///
/// Stored as the raw protocol integer so decoding is exact and formatting
/// always yields two decimals (`500` renders as `"5.00"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed(u16);

impl Speed {
    /// Create a speed from its raw value (0.01 km/h resolution)
    #[must_use]
    pub const fn from_hundredths(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw value in hundredths of a km/h
    #[must_use]
    pub const fn hundredths(self) -> u16 {
        self.0
    }

    /// Speed in km/h
    #[must_use]
    pub fn kmh(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Speed {
    type Err = FtmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 2)
            .and_then(|raw| u16::try_from(raw).ok())
            .map(Self)
            .ok_or_else(|| FtmsError::Protocol(format!("Invalid speed value: {s:?}")))
    }
}

/// Treadmill inclination in tenths of a degree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Incline(i16);

impl Incline {
    /// Create an incline from its raw value (0.1 resolution)
    #[must_use]
    pub const fn from_tenths(raw: i16) -> Self {
        Self(raw)
    }

    /// Raw value in tenths of a degree
    #[must_use]
    pub const fn tenths(self) -> i16 {
        self.0
    }

    /// Incline in degrees
    #[must_use]
    pub fn degrees(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for Incline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = i32::from(self.0);
        let sign = if raw < 0 { "-" } else { "" };
        let abs = raw.abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}

impl FromStr for Incline {
    type Err = FtmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, 1)
            .and_then(|raw| i16::try_from(raw).ok())
            .map(Self)
            .ok_or_else(|| FtmsError::Protocol(format!("Invalid incline value: {s:?}")))
    }
}

/// Parse a decimal string with at most `decimals` fraction digits into a scaled integer
fn parse_fixed(s: &str, decimals: u32) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || fraction.len() > decimals as usize {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let scale = 10_i64.pow(decimals);
    let mut value = whole.parse::<i64>().ok()?.checked_mul(scale)?;
    if !fraction.is_empty() {
        let padding = 10_i64.pow(decimals - u32::try_from(fraction.len()).ok()?);
        value = value.checked_add(fraction.parse::<i64>().ok()? * padding)?;
    }

    Some(if negative { -value } else { value })
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(Speed);
string_serde!(Incline);

/// Fitness machine type, identified by its FTMS data characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineType {
    /// Treadmill Data (0x2ACD)
    Treadmill,
    /// Rower Data (0x2AD1)
    Rower,
    /// Indoor Bike Data (0x2AD2)
    IndoorBike,
    /// Cross Trainer Data (0x2AD3)
    CrossTrainer,
    /// Step Climber Data (0x2AD4)
    StepClimber,
    /// Stair Climber Data (0x2AD5)
    StairClimber,
}

impl MachineType {
    /// Identify the machine type from a data characteristic UUID
    #[must_use]
    pub fn from_characteristic(uuid: Uuid) -> Option<Self> {
        use crate::ble::{
            CROSS_TRAINER_DATA_UUID, INDOOR_BIKE_DATA_UUID, ROWER_DATA_UUID,
            STAIR_CLIMBER_DATA_UUID, STEP_CLIMBER_DATA_UUID, TREADMILL_DATA_UUID,
        };

        match uuid {
            u if u == TREADMILL_DATA_UUID => Some(Self::Treadmill),
            u if u == ROWER_DATA_UUID => Some(Self::Rower),
            u if u == INDOOR_BIKE_DATA_UUID => Some(Self::IndoorBike),
            u if u == CROSS_TRAINER_DATA_UUID => Some(Self::CrossTrainer),
            u if u == STEP_CLIMBER_DATA_UUID => Some(Self::StepClimber),
            u if u == STAIR_CLIMBER_DATA_UUID => Some(Self::StairClimber),
            _ => None,
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Treadmill => write!(f, "Treadmill"),
            Self::Rower => write!(f, "Rower"),
            Self::IndoorBike => write!(f, "Indoor Bike"),
            Self::CrossTrainer => write!(f, "Cross Trainer"),
            Self::StepClimber => write!(f, "Step Climber"),
            Self::StairClimber => write!(f, "Stair Climber"),
        }
    }
}

/// Device information gathered while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Device MAC address
    pub mac_address: Option<String>,
    /// Signal strength (RSSI)
    pub rssi: i16,
}

impl DeviceInfo {
    /// Create new device info
    #[must_use]
    pub const fn new(name: String, rssi: i16) -> Self {
        Self {
            name,
            mac_address: None,
            rssi,
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
    /// Scan timeout in milliseconds
    pub scan_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            scan_timeout_ms: 10_000,
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Maximum number of raw frames kept in the diagnostic log
    pub raw_log_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            raw_log_capacity: DEFAULT_RAW_LOG_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_display() {
        assert_eq!(Speed::from_hundredths(500).to_string(), "5.00");
        assert_eq!(Speed::from_hundredths(0).to_string(), "0.00");
        assert_eq!(Speed::from_hundredths(1234).to_string(), "12.34");
        assert_eq!(Speed::from_hundredths(7).to_string(), "0.07");
    }

    #[test]
    fn test_incline_display() {
        assert_eq!(Incline::from_tenths(25).to_string(), "2.5");
        assert_eq!(Incline::from_tenths(-5).to_string(), "-0.5");
        assert_eq!(Incline::from_tenths(-30).to_string(), "-3.0");
        assert_eq!(Incline::from_tenths(0).to_string(), "0.0");
    }

    #[test]
    fn test_speed_parsing() {
        assert_eq!("5.00".parse::<Speed>().unwrap(), Speed::from_hundredths(500));
        assert_eq!("5.5".parse::<Speed>().unwrap(), Speed::from_hundredths(550));
        assert_eq!("12".parse::<Speed>().unwrap(), Speed::from_hundredths(1200));
        assert!("5.001".parse::<Speed>().is_err());
        assert!("-1.00".parse::<Speed>().is_err());
        assert!("abc".parse::<Speed>().is_err());
        assert!(".5".parse::<Speed>().is_err());
    }

    #[test]
    fn test_incline_parsing() {
        assert_eq!("-0.5".parse::<Incline>().unwrap(), Incline::from_tenths(-5));
        assert_eq!("2.5".parse::<Incline>().unwrap(), Incline::from_tenths(25));
        assert!("2.55".parse::<Incline>().is_err());
    }

    #[test]
    fn test_speed_serializes_as_string() {
        let json = serde_json::to_string(&Speed::from_hundredths(650)).unwrap();
        assert_eq!(json, "\"6.50\"");

        let speed: Speed = serde_json::from_str("\"6.50\"").unwrap();
        assert_eq!(speed.hundredths(), 650);
    }

    #[test]
    fn test_speed_ordering_and_conversion() {
        assert!(Speed::from_hundredths(600) > Speed::from_hundredths(599));
        assert!((Speed::from_hundredths(550).kmh() - 5.5).abs() < f64::EPSILON);
        assert!((Incline::from_tenths(-15).degrees() + 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_machine_type_from_characteristic() {
        assert_eq!(
            MachineType::from_characteristic(crate::ble::TREADMILL_DATA_UUID),
            Some(MachineType::Treadmill)
        );
        assert_eq!(
            MachineType::from_characteristic(crate::ble::INDOOR_BIKE_DATA_UUID),
            Some(MachineType::IndoorBike)
        );
        assert_eq!(
            MachineType::from_characteristic(crate::ble::CONTROL_POINT_UUID),
            None
        );
    }

    #[test]
    fn test_defaults() {
        let params = ConnectionParams::default();
        assert_eq!(params.timeout_ms, 30_000);
        assert_eq!(params.scan_timeout_ms, 10_000);

        assert_eq!(RecorderConfig::default().raw_log_capacity, 500);
    }
}
