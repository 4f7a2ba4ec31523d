//! Reservoir merge and plant health scoring.
//!
//! Pure functions over canonical readings and a plant's optimal-range
//! configuration.
//!
//! # Weighting
//!
//! Two incompatible weighting schemes exist in the project's history; the
//! canonical one implemented here is the later revision with water level
//! phased out of the score: moisture 30 %, temperature 25 %, sunlight
//! 25 %, humidity 20 %. Reservoir state surfaces through alerts instead.
//!
//! # Per-dimension score
//!
//! 100 inside `[min, max]`. Outside, with `tol = 20 %` of the range width
//! and `excess` the distance beyond the nearer bound: the score falls
//! linearly from 100 to 80 across the tolerance band, then linearly from
//! 80 to 0 across one further range width.

use serde::{Deserialize, Serialize};

use verdant_types::{OptimalRange, PlantProfile, ReservoirLevels, SensorReading};

/// Weight of soil moisture in the health score.
pub const WEIGHT_MOISTURE: f64 = 0.30;
/// Weight of air temperature in the health score.
pub const WEIGHT_TEMPERATURE: f64 = 0.25;
/// Weight of sunlight in the health score.
pub const WEIGHT_SUNLIGHT: f64 = 0.25;
/// Weight of air humidity in the health score.
pub const WEIGHT_HUMIDITY: f64 = 0.20;

/// Fraction of the range width forming the tolerance band.
pub const TOLERANCE_FRACTION: f64 = 0.2;

/// Assumed water tank depth used to express percentages in centimeters.
pub const WATER_TANK_DEPTH_CM: f64 = 30.0;
/// Assumed fertilizer tank depth used to express percentages in centimeters.
pub const FERTILIZER_TANK_DEPTH_CM: f64 = 20.0;

/// Categorical plant status derived from the numeric health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthStatus {
    /// Map a 0–100 score to a status via fixed thresholds
    /// (≥90 / ≥75 / ≥60 / ≥40 / else).
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 75.0 {
            HealthStatus::Good
        } else if score >= 60.0 {
            HealthStatus::Fair
        } else if score >= 40.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Excellent => "Excellent",
            HealthStatus::Good => "Good",
            HealthStatus::Fair => "Fair",
            HealthStatus::Poor => "Poor",
            HealthStatus::Critical => "Critical",
        };
        f.write_str(label)
    }
}

/// Score one dimension against its optimal range (0–100).
pub fn dimension_score(value: f64, range: &OptimalRange) -> f64 {
    if range.contains(value) {
        return 100.0;
    }
    let width = range.width();
    let tolerance = TOLERANCE_FRACTION * width;
    let excess = if value < range.min {
        range.min - value
    } else {
        value - range.max
    };
    if excess <= tolerance {
        100.0 - 20.0 * (excess / tolerance)
    } else {
        (80.0 * (1.0 - (excess - tolerance) / width)).max(0.0)
    }
}

/// Weighted plant health score for one reading (0–100).
pub fn health_score(reading: &SensorReading, profile: &PlantProfile) -> f64 {
    WEIGHT_MOISTURE * dimension_score(reading.moisture, &profile.moisture)
        + WEIGHT_TEMPERATURE * dimension_score(reading.temperature, &profile.temperature)
        + WEIGHT_SUNLIGHT * dimension_score(reading.sunlight, &profile.sunlight)
        + WEIGHT_HUMIDITY * dimension_score(reading.humidity, &profile.humidity)
}

/// Health status for one reading.
pub fn health_status(reading: &SensorReading, profile: &PlantProfile) -> HealthStatus {
    HealthStatus::from_score(health_score(reading, profile))
}

/// Merge the authoritative devices' last-known level fields into one
/// reservoir structure. Passthrough, no smoothing; a missing source
/// reads as empty.
pub fn merge_reservoir(
    water_source: Option<&SensorReading>,
    fertilizer_source: Option<&SensorReading>,
) -> ReservoirLevels {
    levels_from_pcts(
        water_source.map(|r| r.water_level).unwrap_or(0.0),
        fertilizer_source.map(|r| r.fertilizer_level).unwrap_or(0.0),
    )
}

/// Express fill percentages as full reservoir levels, deriving the
/// centimeter depths from the fixed tank dimensions.
pub fn levels_from_pcts(water_pct: f64, fertilizer_pct: f64) -> ReservoirLevels {
    ReservoirLevels {
        water_pct,
        water_cm: water_pct / 100.0 * WATER_TANK_DEPTH_CM,
        fertilizer_pct,
        fertilizer_cm: fertilizer_pct / 100.0 * FERTILIZER_TANK_DEPTH_CM,
    }
}
