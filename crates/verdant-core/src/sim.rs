//! Simulated backend transport.
//!
//! Drives the full client pipeline without hardware or a server: a worker
//! task emits jittered readings centered on each plant's optimal ranges,
//! reservoir levels drain slowly over time, and queued commands are
//! acknowledged after a short delay. Everything flows through the same
//! [`Transport`] seam production uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use verdant_types::{DeviceId, PlantProfile};

use crate::error::{Error, Result};
use crate::registry::{DeviceRegistry, ReservoirRole};
use crate::transport::{PushEvent, Request, Response, SnapshotEntry, Transport};

/// Interval between simulated readings.
const TICK: Duration = Duration::from_secs(3);
/// Delay before a queued command is acknowledged.
const ACK_DELAY: Duration = Duration::from_millis(400);
/// Explicit reservoir updates are pushed every Nth tick.
const RESERVOIR_EVERY: u32 = 5;
/// Water drained per tick, percent of tank.
const WATER_DRAIN_PCT: f64 = 0.05;
/// Fertilizer drained per tick, percent of tank.
const FERTILIZER_DRAIN_PCT: f64 = 0.03;

#[derive(Debug, Clone, Copy)]
struct SimDevice {
    water_on: bool,
    light_on: bool,
}

struct SimState {
    devices: HashMap<DeviceId, SimDevice>,
    water_pct: f64,
    fertilizer_pct: f64,
}

/// In-process [`Transport`] producing synthetic telemetry.
pub struct SimTransport {
    registry: Arc<DeviceRegistry>,
    live: Arc<AtomicBool>,
    state: Arc<Mutex<SimState>>,
    push_tx: broadcast::Sender<PushEvent>,
    worker: Mutex<Option<CancellationToken>>,
}

impl SimTransport {
    /// Create a simulator for the given registry.
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        let (push_tx, _) = broadcast::channel(256);
        let devices = registry
            .device_ids()
            .into_iter()
            .map(|d| {
                (
                    d,
                    SimDevice {
                        water_on: false,
                        light_on: false,
                    },
                )
            })
            .collect();
        Self {
            registry,
            live: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SimState {
                devices,
                water_pct: 85.0,
                fertilizer_pct: 60.0,
            })),
            push_tx,
            worker: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state lock poisoned")
    }

    fn snapshot_entries(&self) -> Vec<SnapshotEntry> {
        let state = self.lock_state();
        self.registry
            .entries()
            .iter()
            .map(|entry| {
                let device = state
                    .devices
                    .get(&entry.device)
                    .copied()
                    .unwrap_or(SimDevice {
                        water_on: false,
                        light_on: false,
                    });
                SnapshotEntry {
                    device: entry.device.clone(),
                    reading: payload_for(
                        &entry.profile,
                        entry.reservoir_role,
                        state.water_pct,
                        state.fertilizer_pct,
                    ),
                    water_on: device.water_on,
                    light_on: device.light_on,
                }
            })
            .collect()
    }

    fn spawn_worker(&self) {
        let cancel = CancellationToken::new();
        *self.worker.lock().expect("sim worker lock poisoned") = Some(cancel.clone());

        let registry = Arc::clone(&self.registry);
        let state = Arc::clone(&self.state);
        let live = Arc::clone(&self.live);
        let push_tx = self.push_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            let mut tick = 0u32;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if !live.load(Ordering::SeqCst) {
                    break;
                }
                tick = tick.wrapping_add(1);

                let (readings, levels) = {
                    let mut state = state.lock().expect("sim state lock poisoned");
                    state.water_pct = (state.water_pct - WATER_DRAIN_PCT).max(0.0);
                    state.fertilizer_pct =
                        (state.fertilizer_pct - FERTILIZER_DRAIN_PCT).max(0.0);
                    let readings: Vec<(DeviceId, serde_json::Value)> = registry
                        .entries()
                        .iter()
                        .map(|entry| {
                            (
                                entry.device.clone(),
                                payload_for(
                                    &entry.profile,
                                    entry.reservoir_role,
                                    state.water_pct,
                                    state.fertilizer_pct,
                                ),
                            )
                        })
                        .collect();
                    (readings, (state.water_pct, state.fertilizer_pct))
                };

                for (device, payload) in readings {
                    let _ = push_tx.send(PushEvent::Reading { device, payload });
                }
                if tick % RESERVOIR_EVERY == 0 {
                    let _ = push_tx.send(PushEvent::Reservoir(
                        crate::health::levels_from_pcts(levels.0, levels.1),
                    ));
                }
            }
            debug!("simulator worker stopped");
        });
    }
}

/// Build one raw reading payload with jitter around the profile midpoints.
/// Only the reservoir-authoritative device reports the matching level
/// field, mirroring the deployed hardware.
fn payload_for(
    profile: &PlantProfile,
    role: Option<ReservoirRole>,
    water_pct: f64,
    fertilizer_pct: f64,
) -> serde_json::Value {
    let mut rng = rand::rng();
    let mut jittered = |mid: f64, spread: f64| mid + rng.random_range(-spread..spread);

    let npk_mid = profile.nutrients.midpoint();
    let npk_spread = profile.nutrients.width() * 0.15;
    let mut payload = json!({
        "moisture_pct": jittered(profile.moisture.midpoint(), profile.moisture.width() * 0.3),
        "temperature": jittered(profile.temperature.midpoint(), profile.temperature.width() * 0.3),
        "humidity": jittered(profile.humidity.midpoint(), profile.humidity.width() * 0.3),
        "sunlight": jittered(profile.sunlight.midpoint(), profile.sunlight.width() * 0.3),
        "npk": {
            "n": jittered(npk_mid, npk_spread),
            "p": jittered(npk_mid, npk_spread),
            "k": jittered(npk_mid, npk_spread),
        },
    });
    match role {
        Some(ReservoirRole::Water) => {
            payload["water_level_pct"] = json!(water_pct);
        }
        Some(ReservoirRole::Fertilizer) => {
            payload["fertilizer_level_pct"] = json!(fertilizer_pct);
        }
        None => {}
    }
    payload
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(&self) -> Result<()> {
        if self.live.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.spawn_worker();
        let _ = self.push_tx.send(PushEvent::ConnectionEstablished);
        debug!("simulator started");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.live.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.worker.lock().expect("sim worker lock poisoned").take() {
            cancel.cancel();
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn request(&self, request: Request) -> Result<Response> {
        if !self.is_live() {
            return Err(Error::NotConnected);
        }
        match request {
            Request::Snapshot { .. } => {
                let _ = self.push_tx.send(PushEvent::Snapshot {
                    entries: self.snapshot_entries(),
                });
                Ok(Response::Queued)
            }
            Request::SetActivePlant { plant } => {
                debug!(%plant, "simulator noted active plant");
                Ok(Response::Queued)
            }
            Request::Command {
                id,
                device,
                token,
                value,
                ..
            } => {
                if !self.registry.contains(&device) {
                    return Ok(Response::Rejected {
                        reason: format!("unknown device '{}'", device),
                    });
                }
                {
                    let mut state = self.lock_state();
                    if let Some(sim) = state.devices.get_mut(&device) {
                        match token {
                            crate::transport::CommandToken::WaterPump => sim.water_on = value,
                            crate::transport::CommandToken::Led => sim.light_on = value,
                            crate::transport::CommandToken::FertPump => {}
                        }
                    }
                    // A dose draws down the fertilizer reservoir.
                    if token == crate::transport::CommandToken::FertPump {
                        state.fertilizer_pct = (state.fertilizer_pct - 1.0).max(0.0);
                    }
                }
                let push_tx = self.push_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(ACK_DELAY).await;
                    let _ = push_tx.send(PushEvent::CommandAck { id });
                });
                Ok(Response::Queued)
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<PushEvent> {
        self.push_tx.subscribe()
    }
}
