//! Shared data types for the Verdant plant monitoring client.
//!
//! This crate provides the canonical data shapes exchanged between the
//! connection core, the derivation layer, and any presentation surface:
//!
//! - [`SensorReading`]: one normalized telemetry record
//! - [`DeviceId`] / [`PlantProfile`]: the device/plant binding
//! - [`OptimalRange`]: per-dimension healthy bounds
//! - [`ReservoirLevels`]: merged tank fill levels
//!
//! The types are plain data: no I/O, no async, no device-specific quirks.
//! Device firmware skew is absorbed before these types are constructed
//! (see the normalizer in `verdant-core`).

pub mod types;

pub use types::{DeviceId, OptimalRange, PlantProfile, ReservoirLevels, SensorReading};
