//! Transport seam between the client core and the backend.
//!
//! The backend's actual HTTP/WebSocket plumbing is outside the core; the
//! core only assumes a request/response call plus a push stream, captured
//! by the [`Transport`] trait. Production wires a real session behind it,
//! tests use [`crate::mock::MockTransport`], and the demo binary uses
//! [`crate::sim::SimTransport`]; synthetic telemetry enters through the
//! exact same seam as real hardware.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use verdant_types::{DeviceId, ReservoirLevels};

use crate::error::Result;

/// Wire token for a device actuator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandToken {
    /// Run or stop the watering pump.
    WaterPump,
    /// Switch the grow light.
    Led,
    /// Run the fertilizer dosing pump.
    FertPump,
}

impl std::fmt::Display for CommandToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            CommandToken::WaterPump => "WATER_PUMP",
            CommandToken::Led => "LED",
            CommandToken::FertPump => "FERT_PUMP",
        };
        f.write_str(token)
    }
}

/// One device's slice of the initial snapshot: last-known raw reading
/// plus device-reported actuator states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub device: DeviceId,
    /// Raw reading payload, same loose shape as a live update.
    pub reading: Value,
    pub water_on: bool,
    pub light_on: bool,
}

/// Inbound push events (server → client).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PushEvent {
    /// Per-device last-known readings and device states, sent in response
    /// to a snapshot request.
    Snapshot { entries: Vec<SnapshotEntry> },
    /// One raw reading from one device.
    Reading { device: DeviceId, payload: Value },
    /// Server-computed reservoir levels.
    Reservoir(ReservoirLevels),
    /// Device-level acknowledgement that a queued command executed.
    CommandAck { id: Uuid },
    /// Server-side notice that a queued command timed out.
    CommandTimedOut { id: Uuid },
    /// Informational marker after the session handshake completes.
    ConnectionEstablished,
    /// The server dropped the session.
    ConnectionLost { reason: String },
}

/// Outbound requests (client → server) on the request/response channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ask for the initial snapshot for the listed devices.
    Snapshot { devices: Vec<DeviceId> },
    /// Tell the backend which plant the viewer is focused on.
    SetActivePlant { plant: String },
    /// Queue an actuator command on a device.
    Command {
        id: Uuid,
        device: DeviceId,
        token: CommandToken,
        /// Desired actuator state (toggles) or `true` for one-shot doses.
        value: bool,
        duration_ms: u64,
    },
}

/// Immediate reply to a [`Request`]. Confirms queueing only; execution
/// is acknowledged later through [`PushEvent::CommandAck`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The request was accepted and queued.
    Queued,
    /// The request was refused outright.
    Rejected { reason: String },
}

/// Session transport assumed by the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the session. Resolves once the handshake completes.
    async fn connect(&self) -> Result<()>;

    /// Tear the session down.
    async fn close(&self) -> Result<()>;

    /// Whether the transport currently reports itself live. This can
    /// transiently disagree with the connection state machine, which is
    /// why both are consulted by `ConnectionManager::is_connected`.
    fn is_live(&self) -> bool;

    /// Issue a request and await its immediate reply. Distinct from the
    /// push stream, so command queueing never depends on the subscription.
    async fn request(&self, request: Request) -> Result<Response>;

    /// Subscribe to the inbound push stream.
    fn events(&self) -> broadcast::Receiver<PushEvent>;
}
