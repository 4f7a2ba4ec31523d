//! Telemetry normalization.
//!
//! Device payloads are loosely typed and inconsistently shaped across the
//! two firmware lines: field names differ, NPK arrives either as a nested
//! group or as three flat fields, and values show up as numbers, strings,
//! or not at all. [`normalize`] absorbs all of that into one canonical
//! [`SensorReading`] so the rest of the core never branches on device
//! type.
//!
//! Each logical field resolves through an ordered preference list; a field
//! that is null, missing, an empty string, or fails numeric coercion falls
//! back to its documented default (temperature 20 °C, humidity 50 %,
//! everything else 0). Malformed input never fails the record.

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::trace;

use verdant_types::{DeviceId, SensorReading};

/// Default substituted for an unresolvable temperature (°C).
pub const DEFAULT_TEMPERATURE: f64 = 20.0;
/// Default substituted for an unresolvable humidity (%).
pub const DEFAULT_HUMIDITY: f64 = 50.0;
/// Default substituted for every other unresolvable field.
pub const DEFAULT_ZERO: f64 = 0.0;

const WATER_LEVEL_KEYS: &[&str] = &["water_level_pct", "water_level", "water"];
const FERTILIZER_LEVEL_KEYS: &[&str] = &["fertilizer_level_pct", "fertilizer_level", "fert_level"];

/// Build one canonical reading from a raw device payload.
///
/// Pure transform: no I/O, no shared state. The timestamp defaults to
/// `now` when the payload omits one or carries an unparsable value.
pub fn normalize(device: &DeviceId, payload: &Value, now: OffsetDateTime) -> SensorReading {
    let (nitrogen, phosphorus, potassium) = resolve_npk(payload);

    SensorReading {
        temperature: resolve(payload, &["temperature", "temp", "air_temp"], DEFAULT_TEMPERATURE),
        humidity: resolve(payload, &["humidity", "air_humidity", "hum"], DEFAULT_HUMIDITY),
        moisture: resolve(
            payload,
            &["moisture_pct", "soil_moisture_pct", "moisture", "soil_moisture"],
            DEFAULT_ZERO,
        ),
        sunlight: resolve(payload, &["sunlight", "lux", "light"], DEFAULT_ZERO),
        nitrogen,
        phosphorus,
        potassium,
        water_level: resolve(payload, WATER_LEVEL_KEYS, DEFAULT_ZERO),
        fertilizer_level: resolve(payload, FERTILIZER_LEVEL_KEYS, DEFAULT_ZERO),
        timestamp: resolve_timestamp(payload, now),
        device: device.clone(),
    }
}

/// Water level explicitly carried by the payload, if any. Distinguishes
/// a reported level from the defaulted 0 a normalized reading would show
/// for an omitted field.
pub fn reported_water_level(payload: &Value) -> Option<f64> {
    lookup(payload, WATER_LEVEL_KEYS)
}

/// Fertilizer level explicitly carried by the payload, if any.
pub fn reported_fertilizer_level(payload: &Value) -> Option<f64> {
    lookup(payload, FERTILIZER_LEVEL_KEYS)
}

/// Resolve one logical field through its preference list.
fn resolve(payload: &Value, keys: &[&str], default: f64) -> f64 {
    lookup(payload, keys).unwrap_or_else(|| {
        trace!(keys = ?keys, default, "field unresolvable, substituting default");
        default
    })
}

/// First coercible value among the candidate keys.
fn lookup(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| payload.get(key).and_then(coerce))
}

/// NPK arrives either nested (`"npk": {"n": .., "p": .., "k": ..}`, long
/// key names accepted too) or as three flat fields. The nested group wins
/// when both forms are present.
fn resolve_npk(payload: &Value) -> (f64, f64, f64) {
    if let Some(group) = payload.get("npk").filter(|v| v.is_object()) {
        return (
            resolve(group, &["n", "nitrogen"], DEFAULT_ZERO),
            resolve(group, &["p", "phosphorus"], DEFAULT_ZERO),
            resolve(group, &["k", "potassium"], DEFAULT_ZERO),
        );
    }
    (
        resolve(payload, &["nitrogen", "n"], DEFAULT_ZERO),
        resolve(payload, &["phosphorus", "p"], DEFAULT_ZERO),
        resolve(payload, &["potassium", "k"], DEFAULT_ZERO),
    )
}

fn resolve_timestamp(payload: &Value, now: OffsetDateTime) -> OffsetDateTime {
    payload
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
        .unwrap_or(now)
}

/// Coerce a JSON value to a finite number, or reject it.
///
/// Accepts numbers and numeric strings; empty strings, booleans, nulls,
/// non-numeric strings and non-finite numbers all resolve to `None`.
fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}
