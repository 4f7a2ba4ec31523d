//! Device ↔ plant registry.
//!
//! The deployment binds exactly two fixed devices 1:1 to plant profiles,
//! but the binding is kept general: a validated map keyed by [`DeviceId`],
//! usable at any N. Each entry may additionally claim authority over one
//! physical reservoir (water or fertilizer) for the level merge.

use serde::{Deserialize, Serialize};

use verdant_types::{DeviceId, OptimalRange, PlantProfile};

use crate::error::{Error, Result};

/// Which physical reservoir a device reports authoritatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservoirRole {
    /// Authoritative for the water tank level.
    Water,
    /// Authoritative for the fertilizer tank level.
    Fertilizer,
}

/// One registered device with its bound plant profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Device identifier.
    pub device: DeviceId,
    /// The plant profile bound to the device.
    pub profile: PlantProfile,
    /// Reservoir this device is authoritative for, if any.
    pub reservoir_role: Option<ReservoirRole>,
}

/// Validated registry of devices and their plant bindings.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Vec<RegistryEntry>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shipped with the deployed system: two planters, one
    /// authoritative for each reservoir.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .insert(RegistryEntry {
                device: DeviceId::new("planter-a"),
                profile: monstera_profile(),
                reservoir_role: Some(ReservoirRole::Water),
            })
            .expect("default registry entry is valid");
        registry
            .insert(RegistryEntry {
                device: DeviceId::new("planter-b"),
                profile: ficus_profile(),
                reservoir_role: Some(ReservoirRole::Fertilizer),
            })
            .expect("default registry entry is valid");
        registry
    }

    /// Add an entry, validating identifier uniqueness, plant-name
    /// uniqueness, range sanity, and reservoir-role uniqueness.
    pub fn insert(&mut self, entry: RegistryEntry) -> Result<()> {
        if entry.device.as_str().trim().is_empty() {
            return Err(Error::invalid_config("device id must not be empty"));
        }
        if self.contains(&entry.device) {
            return Err(Error::invalid_config(format!(
                "duplicate device id '{}'",
                entry.device
            )));
        }
        if self
            .entries
            .iter()
            .any(|e| e.profile.name == entry.profile.name)
        {
            return Err(Error::invalid_config(format!(
                "duplicate plant name '{}'",
                entry.profile.name
            )));
        }
        if let Some(role) = entry.reservoir_role
            && self.entries.iter().any(|e| e.reservoir_role == Some(role))
        {
            return Err(Error::invalid_config(format!(
                "reservoir role {:?} already claimed",
                role
            )));
        }
        validate_profile(&entry.profile)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Whether a device is registered.
    pub fn contains(&self, device: &DeviceId) -> bool {
        self.entries.iter().any(|e| &e.device == device)
    }

    /// Profile bound to a device.
    pub fn profile(&self, device: &DeviceId) -> Result<&PlantProfile> {
        self.entries
            .iter()
            .find(|e| &e.device == device)
            .map(|e| &e.profile)
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))
    }

    /// Device bound to a plant name.
    pub fn device_for_plant(&self, plant: &str) -> Result<&DeviceId> {
        self.entries
            .iter()
            .find(|e| e.profile.name == plant)
            .map(|e| &e.device)
            .ok_or_else(|| Error::UnknownPlant(plant.to_string()))
    }

    /// All registered device identifiers, in registration order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.entries.iter().map(|e| e.device.clone()).collect()
    }

    /// The device authoritative for the given reservoir, if any.
    pub fn reservoir_authority(&self, role: ReservoirRole) -> Option<&DeviceId> {
        self.entries
            .iter()
            .find(|e| e.reservoir_role == Some(role))
            .map(|e| &e.device)
    }

    /// All entries, in registration order.
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_profile(profile: &PlantProfile) -> Result<()> {
    if profile.name.trim().is_empty() {
        return Err(Error::invalid_config("plant name must not be empty"));
    }
    let ranges = [
        ("moisture", &profile.moisture),
        ("water_level", &profile.water_level),
        ("sunlight", &profile.sunlight),
        ("temperature", &profile.temperature),
        ("humidity", &profile.humidity),
        ("nutrients", &profile.nutrients),
    ];
    for (name, range) in ranges {
        if !range.min.is_finite() || !range.max.is_finite() {
            return Err(Error::invalid_config(format!(
                "{}: range bounds must be finite",
                name
            )));
        }
        if range.min >= range.max {
            return Err(Error::invalid_config(format!(
                "{}: min must be < max (got [{}, {}])",
                name, range.min, range.max
            )));
        }
    }
    Ok(())
}

fn monstera_profile() -> PlantProfile {
    PlantProfile {
        name: "Monstera".to_string(),
        image: "plants/monstera.png".to_string(),
        moisture: OptimalRange::new(65.0, 85.0, "%"),
        water_level: OptimalRange::new(40.0, 100.0, "%"),
        sunlight: OptimalRange::new(10_000.0, 20_000.0, "lux"),
        temperature: OptimalRange::new(18.0, 27.0, "°C"),
        humidity: OptimalRange::new(50.0, 70.0, "%"),
        nutrients: OptimalRange::new(20.0, 60.0, "mg/kg"),
    }
}

fn ficus_profile() -> PlantProfile {
    PlantProfile {
        name: "Ficus".to_string(),
        image: "plants/ficus.png".to_string(),
        moisture: OptimalRange::new(50.0, 70.0, "%"),
        water_level: OptimalRange::new(40.0, 100.0, "%"),
        sunlight: OptimalRange::new(15_000.0, 30_000.0, "lux"),
        temperature: OptimalRange::new(16.0, 24.0, "°C"),
        humidity: OptimalRange::new(40.0, 60.0, "%"),
        nutrients: OptimalRange::new(15.0, 50.0, "mg/kg"),
    }
}
