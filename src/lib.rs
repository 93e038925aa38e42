#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Treadlog
//!
//! Decode Bluetooth Fitness Machine Service (FTMS) treadmill telemetry and
//! record it as workout sessions.
//!
//! A treadmill streams "Treadmill Data" notifications (characteristic `0x2ACD`).
//! Each frame starts with a 16-bit flags field that declares which optional
//! fields follow, packed back to back in a fixed order. This crate provides:
//!
//! - **Frame decoding**: [`decode`] walks the declared fields in protocol order
//!   and fails with [`FtmsError::TruncatedFrame`] instead of returning partial data
//! - **Session aggregation**: [`SessionAggregator`] tracks distance, elapsed
//!   time, maximum and average speed
//! - **Diagnostics**: every received frame goes to a bounded raw log
//!   ([`RawLog`], 500 entries by default), even when it fails to decode
//! - **Storage and export**: [`JsonStore`] keeps saved workouts and the raw log,
//!   [`export`] renders CSV and JSON
//! - **BLE transport**: [`TreadmillMonitor`] connects to a treadmill with
//!   `btleplug` and feeds notifications through the [`Recorder`]
//!
//! Only the notification path is supported; the control point is never written.
//!
//! ## Quick Start
//!
//! ```
//! use treadlog::{decode, SessionAggregator};
//!
//! // flags = total distance, speed = 5.00 km/h, distance = 70196 m
//! let frame = [0x04, 0x00, 0xF4, 0x01, 0x34, 0x12, 0x01];
//! let sample = decode(&frame).unwrap();
//! assert_eq!(sample.speed.to_string(), "5.00");
//! assert_eq!(sample.distance, Some(70196));
//!
//! let mut session = SessionAggregator::new();
//! session.observe(&sample);
//! let workout = session.finalize().unwrap();
//! assert_eq!(workout.distance, 70196);
//! ```

/// Bluetooth Low Energy transport and FTMS identifiers
pub mod ble;
/// Error types and handling
pub mod error;
/// CSV and JSON exports of stored data
pub mod export;
/// Treadmill Data frame decoding
pub mod frame;
/// Live recording from a connected treadmill
pub mod monitor;
/// Bounded log of raw frames
pub mod raw_log;
/// Notification handling pipeline
pub mod recorder;
/// Workout session aggregation
pub mod session;
/// JSON record store
pub mod storage;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use error::{FtmsError, Result};
pub use frame::{decode, FrameFlags, TreadmillSample};
pub use monitor::TreadmillMonitor;
pub use raw_log::{trim, RawLog, RawLogEntry, RawLogSink};
pub use recorder::Recorder;
pub use session::{SavedWorkout, SessionAggregator, WorkoutSession};
pub use storage::JsonStore;
pub use types::{ConnectionParams, DeviceInfo, Incline, MachineType, RecorderConfig, Speed};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
