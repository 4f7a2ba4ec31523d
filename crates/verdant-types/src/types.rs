//! Core types for normalized plant telemetry.

use core::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a telemetry device.
///
/// The deployed system ships with exactly two devices, but nothing in the
/// core assumes that count: devices are always resolved through the
/// registry, keyed by this identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Healthy operating bounds for one measured dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalRange {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
    /// Display unit, e.g. `"%"`, `"°C"`, `"lux"`.
    pub unit: String,
}

impl OptimalRange {
    /// Create a range with the given bounds and unit.
    pub fn new(min: f64, max: f64, unit: impl Into<String>) -> Self {
        Self {
            min,
            max,
            unit: unit.into(),
        }
    }

    /// Whether a value falls inside the range (inclusive).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Width of the range.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Optimal-range configuration for one plant.
///
/// Profiles are managed externally (profile CRUD is not part of the core)
/// and consumed read-only by the health derivation and alert generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantProfile {
    /// Display name, also used as the selection key.
    pub name: String,
    /// Reference to a display image (path or URL).
    pub image: String,
    /// Soil moisture bounds (%).
    pub moisture: OptimalRange,
    /// Water reservoir bounds (%).
    pub water_level: OptimalRange,
    /// Sunlight bounds (lux).
    pub sunlight: OptimalRange,
    /// Air temperature bounds (°C).
    pub temperature: OptimalRange,
    /// Air humidity bounds (%).
    pub humidity: OptimalRange,
    /// Average NPK nutrient bounds (mg/kg).
    pub nutrients: OptimalRange,
}

/// One normalized telemetry record.
///
/// Constructed exclusively by the normalizer; every numeric field is a
/// finite number (raw non-numeric or missing inputs are substituted with
/// documented defaults, never propagated as NaN). A reading is immutable
/// once built and is superseded, not mutated, by the next reading for the
/// same device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Air temperature in °C.
    pub temperature: f64,
    /// Relative air humidity in %.
    pub humidity: f64,
    /// Soil moisture in %.
    pub moisture: f64,
    /// Sunlight in lux.
    pub sunlight: f64,
    /// Nitrogen in mg/kg.
    pub nitrogen: f64,
    /// Phosphorus in mg/kg.
    pub phosphorus: f64,
    /// Potassium in mg/kg.
    pub potassium: f64,
    /// Water reservoir level in %.
    pub water_level: f64,
    /// Fertilizer reservoir level in %.
    pub fertilizer_level: f64,
    /// When the reading was captured (RFC 3339 on the wire).
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The device that produced the reading.
    pub device: DeviceId,
}

impl SensorReading {
    /// Average of the three NPK nutrient values.
    pub fn nutrient_average(&self) -> f64 {
        (self.nitrogen + self.phosphorus + self.potassium) / 3.0
    }
}

/// Merged fill levels of the water and fertilizer reservoirs.
///
/// One device is authoritative for the water tank, the other for the
/// fertilizer tank; the merge is a passthrough of each device's last-known
/// level fields with no smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReservoirLevels {
    /// Water tank fill level in %.
    pub water_pct: f64,
    /// Water tank fill level in centimeters.
    pub water_cm: f64,
    /// Fertilizer tank fill level in %.
    pub fertilizer_pct: f64,
    /// Fertilizer tank fill level in centimeters.
    pub fertilizer_cm: f64,
}
