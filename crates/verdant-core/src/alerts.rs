//! User-facing alerts.
//!
//! Alerts come from three producers: the alert generator (threshold
//! breaches), the connection manager (transport errors), and the command
//! dispatcher (command outcomes). They land in a bounded ring buffer
//! holding the 10 most recent; the only permitted mutation afterwards is
//! flipping the `read` flag. Repeated breaches each produce a fresh alert
//! with no deduplication; the bounded buffer keeps that harmless.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use verdant_types::{PlantProfile, ReservoirLevels, SensorReading};

/// Reservoir fill percentage below which an error alert is raised.
pub const RESERVOIR_FLOOR_PCT: f64 = 20.0;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Info,
    Warning,
    Error,
    Success,
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier.
    pub id: Uuid,
    /// Severity.
    pub kind: AlertKind,
    /// Human-readable message.
    pub message: String,
    /// When the alert was raised.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether the user has seen the alert.
    pub read: bool,
}

impl Alert {
    /// Create an unread alert timestamped now.
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
            read: false,
        }
    }

    /// Shorthand for an info alert.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(AlertKind::Info, message)
    }

    /// Shorthand for a warning alert.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(AlertKind::Warning, message)
    }

    /// Shorthand for an error alert.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(AlertKind::Error, message)
    }

    /// Shorthand for a success alert.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(AlertKind::Success, message)
    }
}

/// Bounded, append-only alert buffer. Oldest entries are evicted on
/// overflow; iteration is most-recent-first.
#[derive(Debug)]
pub struct AlertLog {
    inner: Mutex<VecDeque<Alert>>,
    capacity: usize,
}

impl AlertLog {
    /// Create a log with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an alert, evicting the oldest if the buffer is full.
    pub fn push(&self, alert: Alert) {
        let mut inner = self.inner.lock().expect("alert log lock poisoned");
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(alert);
    }

    /// All retained alerts, most recent first.
    pub fn recent(&self) -> Vec<Alert> {
        let inner = self.inner.lock().expect("alert log lock poisoned");
        inner.iter().rev().cloned().collect()
    }

    /// Mark one alert as read. Returns false if the id is unknown
    /// (possibly already evicted).
    pub fn mark_read(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("alert log lock poisoned");
        match inner.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.read = true;
                true
            }
            None => false,
        }
    }

    /// Number of unread alerts currently retained.
    pub fn unread_count(&self) -> usize {
        let inner = self.inner.lock().expect("alert log lock poisoned");
        inner.iter().filter(|a| !a.read).count()
    }

    /// Number of retained alerts.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("alert log lock poisoned").len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Threshold-based rule evaluator producing alerts from fresh readings
/// and reservoir updates.
#[derive(Debug, Clone)]
pub struct AlertGenerator {
    reservoir_floor_pct: f64,
}

impl Default for AlertGenerator {
    fn default() -> Self {
        Self {
            reservoir_floor_pct: RESERVOIR_FLOOR_PCT,
        }
    }
}

impl AlertGenerator {
    /// Create a generator with the default reservoir floor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one fresh reading against its plant's optimal ranges.
    ///
    /// Below-minimum moisture, sunlight, or NPK average each produce a
    /// warning.
    pub fn evaluate_reading(&self, reading: &SensorReading, profile: &PlantProfile) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if reading.moisture < profile.moisture.min {
            alerts.push(Alert::warning(format!(
                "{}: soil moisture low ({:.0}{}, optimal {:.0}–{:.0})",
                profile.name,
                reading.moisture,
                profile.moisture.unit,
                profile.moisture.min,
                profile.moisture.max,
            )));
        }
        if reading.sunlight < profile.sunlight.min {
            alerts.push(Alert::warning(format!(
                "{}: sunlight low ({:.0} {}, optimal {:.0}–{:.0})",
                profile.name,
                reading.sunlight,
                profile.sunlight.unit,
                profile.sunlight.min,
                profile.sunlight.max,
            )));
        }
        let nutrients = reading.nutrient_average();
        if nutrients < profile.nutrients.min {
            alerts.push(Alert::warning(format!(
                "{}: nutrient level low ({:.0} {}, optimal {:.0}–{:.0})",
                profile.name,
                nutrients,
                profile.nutrients.unit,
                profile.nutrients.min,
                profile.nutrients.max,
            )));
        }
        alerts
    }

    /// Evaluate a reservoir-levels update against the fixed floor.
    pub fn evaluate_reservoir(&self, levels: &ReservoirLevels) -> Vec<Alert> {
        [
            self.water_floor_alert(levels.water_pct),
            self.fertilizer_floor_alert(levels.fertilizer_pct),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Floor check for the water tank alone.
    pub fn water_floor_alert(&self, pct: f64) -> Option<Alert> {
        (pct < self.reservoir_floor_pct).then(|| {
            Alert::error(format!("Water reservoir low ({:.0}%), refill required", pct))
        })
    }

    /// Floor check for the fertilizer tank alone.
    pub fn fertilizer_floor_alert(&self, pct: f64) -> Option<Alert> {
        (pct < self.reservoir_floor_pct).then(|| {
            Alert::error(format!(
                "Fertilizer reservoir low ({:.0}%), refill required",
                pct
            ))
        })
    }
}
