use crate::{
    error::{FtmsError, Result},
    types::{Incline, Speed},
};
use bytes::Buf;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Size of the mandatory header: 2-byte flags followed by 2-byte instantaneous speed
pub const HEADER_SIZE: usize = 4;

/// Flags field of an FTMS Treadmill Data frame
///
/// Each bit declares the presence of one optional field. Present fields are
/// packed without padding in ascending bit order, so the position of a field
/// depends on every present field before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// Average speed present (bit 1)
    pub const AVERAGE_SPEED: u16 = 1 << 1;
    /// Total distance present (bit 2)
    pub const TOTAL_DISTANCE: u16 = 1 << 2;
    /// Inclination and ramp angle present (bit 3)
    pub const INCLINATION: u16 = 1 << 3;
    /// Elevation gain present (bit 4)
    pub const ELEVATION_GAIN: u16 = 1 << 4;
    /// Instantaneous pace present (bit 5)
    pub const INSTANTANEOUS_PACE: u16 = 1 << 5;
    /// Average pace present (bit 6)
    pub const AVERAGE_PACE: u16 = 1 << 6;
    /// Expended energy present (bit 7)
    pub const EXPENDED_ENERGY: u16 = 1 << 7;
    /// Heart rate present (bit 8)
    pub const HEART_RATE: u16 = 1 << 8;
    /// Metabolic equivalent present (bit 9)
    pub const METABOLIC_EQUIVALENT: u16 = 1 << 9;
    /// Elapsed time present (bit 10)
    pub const ELAPSED_TIME: u16 = 1 << 10;

    /// Wrap a raw flags value
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw flags value
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Check whether the given flag bit is set
    #[must_use]
    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// Total frame length required by these flags, header included
    #[must_use]
    pub fn required_len(self) -> usize {
        Field::ORDER
            .iter()
            .filter(|field| self.contains(field.flag()))
            .fold(HEADER_SIZE, |len, field| len + field.width())
    }
}

impl fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X} [speed", self.0)?;
        for field in Field::ORDER.iter().filter(|field| self.contains(field.flag())) {
            write!(f, ", {}", field.name())?;
        }
        write!(f, "]")
    }
}

/// Optional fields of a Treadmill Data frame, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AverageSpeed,
    TotalDistance,
    Inclination,
    ElevationGain,
    InstantaneousPace,
    AveragePace,
    ExpendedEnergy,
    HeartRate,
    MetabolicEquivalent,
    ElapsedTime,
}

impl Field {
    /// Protocol order; must never be reordered
    const ORDER: [Self; 10] = [
        Self::AverageSpeed,
        Self::TotalDistance,
        Self::Inclination,
        Self::ElevationGain,
        Self::InstantaneousPace,
        Self::AveragePace,
        Self::ExpendedEnergy,
        Self::HeartRate,
        Self::MetabolicEquivalent,
        Self::ElapsedTime,
    ];

    const fn flag(self) -> u16 {
        match self {
            Self::AverageSpeed => FrameFlags::AVERAGE_SPEED,
            Self::TotalDistance => FrameFlags::TOTAL_DISTANCE,
            Self::Inclination => FrameFlags::INCLINATION,
            Self::ElevationGain => FrameFlags::ELEVATION_GAIN,
            Self::InstantaneousPace => FrameFlags::INSTANTANEOUS_PACE,
            Self::AveragePace => FrameFlags::AVERAGE_PACE,
            Self::ExpendedEnergy => FrameFlags::EXPENDED_ENERGY,
            Self::HeartRate => FrameFlags::HEART_RATE,
            Self::MetabolicEquivalent => FrameFlags::METABOLIC_EQUIVALENT,
            Self::ElapsedTime => FrameFlags::ELAPSED_TIME,
        }
    }

    /// Width of the field in bytes
    const fn width(self) -> usize {
        match self {
            Self::AverageSpeed | Self::ElapsedTime => 2,
            Self::TotalDistance => 3,
            // inclination (2) + ramp angle (2)
            Self::Inclination | Self::ElevationGain => 4,
            Self::InstantaneousPace
            | Self::AveragePace
            | Self::HeartRate
            | Self::MetabolicEquivalent => 1,
            // total (2) + per hour (2) + per minute (1)
            Self::ExpendedEnergy => 5,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::AverageSpeed => "average speed",
            Self::TotalDistance => "total distance",
            Self::Inclination => "inclination",
            Self::ElevationGain => "elevation gain",
            Self::InstantaneousPace => "instantaneous pace",
            Self::AveragePace => "average pace",
            Self::ExpendedEnergy => "expended energy",
            Self::HeartRate => "heart rate",
            Self::MetabolicEquivalent => "metabolic equivalent",
            Self::ElapsedTime => "elapsed time",
        }
    }

    /// Read this field from exactly `width()` bytes into the sample.
    ///
    /// Fields the sample does not expose are consumed and dropped.
    fn read(self, mut buf: &[u8], sample: &mut TreadmillSample) {
        match self {
            Self::TotalDistance => {
                let low = u32::from(buf.get_u16_le());
                let high = u32::from(buf.get_u8());
                sample.distance = Some(low | (high << 16));
            }
            Self::Inclination => {
                sample.incline = Some(Incline::from_tenths(buf.get_i16_le()));
                let _ramp_angle = buf.get_i16_le();
            }
            Self::ElapsedTime => {
                sample.elapsed_time = Some(buf.get_u16_le());
            }
            Self::AverageSpeed
            | Self::ElevationGain
            | Self::InstantaneousPace
            | Self::AveragePace
            | Self::ExpendedEnergy
            | Self::HeartRate
            | Self::MetabolicEquivalent => buf.advance(self.width()),
        }
    }
}

/// One decoded Treadmill Data notification
///
/// Optional fields are `None` when the frame's flags do not declare them,
/// which is distinct from a reported zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreadmillSample {
    /// Instantaneous speed (km/h)
    pub speed: Speed,
    /// Total distance (meters)
    pub distance: Option<u32>,
    /// Inclination (degrees)
    pub incline: Option<Incline>,
    /// Elapsed time (seconds)
    pub elapsed_time: Option<u16>,
}

impl TreadmillSample {
    /// Decode a raw Treadmill Data frame
    ///
    /// # Errors
    ///
    /// Returns [`FtmsError::TruncatedFrame`] if the frame is shorter than the
    /// mandatory header or than the fields declared by its flags.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        decode(frame)
    }
}

/// Decode a raw FTMS Treadmill Data frame
///
/// Frame layout:
/// - Bytes 0-1: Flags (u16 little-endian)
/// - Bytes 2-3: Instantaneous speed (u16 little-endian, 0.01 km/h)
/// - Bytes 4..: Optional fields in flag bit order, see [`FrameFlags`]
///
/// Bytes past the last declared field are ignored.
///
/// # Errors
///
/// Returns [`FtmsError::TruncatedFrame`] if the frame is too short for its header
/// or for the fields its flags declare. No partially decoded sample is returned.
pub fn decode(frame: &[u8]) -> Result<TreadmillSample> {
    if frame.len() < HEADER_SIZE {
        return Err(FtmsError::TruncatedFrame {
            required: HEADER_SIZE,
            actual: frame.len(),
        });
    }

    let mut header = &frame[..HEADER_SIZE];
    let flags = FrameFlags::from_bits(header.get_u16_le());
    let mut sample = TreadmillSample {
        speed: Speed::from_hundredths(header.get_u16_le()),
        ..TreadmillSample::default()
    };

    let mut offset = HEADER_SIZE;
    for field in Field::ORDER {
        if !flags.contains(field.flag()) {
            continue;
        }

        let end = offset + field.width();
        let bytes = frame.get(offset..end).ok_or_else(|| FtmsError::TruncatedFrame {
            required: flags.required_len(),
            actual: frame.len(),
        })?;
        field.read(bytes, &mut sample);
        offset = end;
    }

    debug!("Decoded frame flags={} -> {:?}", flags, sample);
    Ok(sample)
}
