//! Actuator command dispatch and acknowledgement tracking.
//!
//! Commands are queued on the backend and acknowledged asynchronously by
//! the device, so every dispatched command lives in a pending table until
//! exactly one of three resolutions claims it: a device acknowledgement, a
//! server-side timeout notice, or the local acknowledgement window
//! expiring. Whichever arrives first wins; the others become no-ops.
//!
//! Disconnection does not cancel pending windows. A device can execute a
//! queued command while the client is offline, and the local timer keeps
//! the table from leaking either way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use verdant_types::DeviceId;

use crate::alerts::{Alert, AlertLog};
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, EventBus, SubscriptionId};
use crate::registry::DeviceRegistry;
use crate::transport::{CommandToken, Request, Response, Transport};

/// User-level actuator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Toggle the watering pump.
    Water,
    /// Toggle the grow light.
    Light,
    /// One-shot fertilizer dose.
    Nutrients,
}

impl Action {
    /// Wire token this action maps to.
    pub fn token(self) -> CommandToken {
        match self {
            Action::Water => CommandToken::WaterPump,
            Action::Light => CommandToken::Led,
            Action::Nutrients => CommandToken::FertPump,
        }
    }

    /// Actuation duration sent with the command.
    pub fn duration_ms(self) -> u64 {
        match self {
            Action::Water | Action::Light => 5_000,
            Action::Nutrients => 3_000,
        }
    }

    /// Toggles flip device state; one-shots always send `true`.
    pub fn is_toggle(self) -> bool {
        !matches!(self, Action::Nutrients)
    }

    /// Human-readable label for alert messages.
    pub fn label(self) -> &'static str {
        match self {
            Action::Water => "Watering",
            Action::Light => "Lighting",
            Action::Nutrients => "Nutrient dose",
        }
    }
}

/// Final outcome of one command lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The device acknowledged execution.
    Succeeded,
    /// The backend refused the command or the transport failed.
    Failed { reason: String },
    /// No acknowledgement arrived within the window.
    TimedOut,
}

/// One command awaiting acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: Uuid,
    pub action: Action,
    pub device: DeviceId,
    /// Actuator state the command asked for.
    pub desired: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

struct PendingEntry {
    command: PendingCommand,
    timer: AbortHandle,
}

/// Dispatches actuator commands for the active plant and tracks their
/// acknowledgements.
pub struct CommandDispatcher {
    connection: Arc<ConnectionManager>,
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    alerts: Arc<AlertLog>,
    ack_window: Duration,
    active_plant: Mutex<String>,
    /// Local view of toggle actuator states, keyed by device and action.
    actuators: Mutex<HashMap<(DeviceId, Action), bool>>,
    pending: Mutex<HashMap<Uuid, PendingEntry>>,
    subscription: OnceLock<SubscriptionId>,
}

impl CommandDispatcher {
    /// Create a dispatcher wired to the manager's transport and bus.
    ///
    /// The active plant starts as the first registry entry. The returned
    /// `Arc` is required because resolution handlers hold weak
    /// back-references.
    pub fn new(
        connection: Arc<ConnectionManager>,
        registry: Arc<DeviceRegistry>,
        alerts: Arc<AlertLog>,
        ack_window: Duration,
    ) -> Arc<Self> {
        let initial_plant = registry
            .entries()
            .first()
            .map(|e| e.profile.name.clone())
            .unwrap_or_default();
        let dispatcher = Arc::new(Self {
            transport: connection.transport(),
            bus: connection.bus(),
            connection,
            registry,
            alerts,
            ack_window,
            active_plant: Mutex::new(initial_plant),
            actuators: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            subscription: OnceLock::new(),
        });

        let weak = Arc::downgrade(&dispatcher);
        let id = dispatcher.bus.subscribe(move |event| {
            let Some(dispatcher) = weak.upgrade() else {
                return;
            };
            match event {
                ClientEvent::CommandAcknowledged { id } => dispatcher.resolve_success(*id),
                ClientEvent::CommandTimedOut { id } => dispatcher.resolve_timeout(*id, "backend"),
                ClientEvent::ActuatorState {
                    device,
                    water_on,
                    light_on,
                } => dispatcher.apply_actuator_state(device, *water_on, *light_on),
                _ => {}
            }
        });
        let _ = dispatcher.subscription.set(id);
        dispatcher
    }

    /// Plant currently targeted by commands.
    pub fn active_plant(&self) -> String {
        self.lock_plant().clone()
    }

    /// Switch the command target and inform the backend (best effort when
    /// connected). Fails if the plant is not registered.
    pub async fn set_active_plant(&self, plant: &str) -> Result<()> {
        self.registry.device_for_plant(plant)?;
        *self.lock_plant() = plant.to_string();
        info!(plant, "active plant changed");

        if self.connection.is_connected() {
            let request = Request::SetActivePlant {
                plant: plant.to_string(),
            };
            if let Err(e) = self.transport.request(request).await {
                warn!(error = %e, "active-plant notification failed");
            }
        }
        Ok(())
    }

    /// Local view of a toggle actuator's state.
    pub fn actuator_state(&self, device: &DeviceId, action: Action) -> bool {
        self.lock_actuators()
            .get(&(device.clone(), action))
            .copied()
            .unwrap_or(false)
    }

    /// Commands currently awaiting acknowledgement.
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.lock_pending()
            .values()
            .map(|e| e.command.clone())
            .collect()
    }

    /// Dispatch an action against the active plant's device.
    ///
    /// Resolves `true` once the backend confirms queueing; the execution
    /// outcome arrives later as a `CommandResolved` event. Resolves
    /// `false` immediately, without any transport traffic, when
    /// disconnected, and on rejection or transport failure (both of which
    /// also raise an error alert).
    pub async fn send_command(self: &Arc<Self>, action: Action) -> bool {
        if !self.connection.is_connected() {
            warn!(?action, "command dropped, not connected");
            self.raise_alert(Alert::warning(format!(
                "{} command not sent: not connected",
                action.label()
            )));
            return false;
        }

        let plant = self.active_plant();
        let device = match self.registry.device_for_plant(&plant) {
            Ok(device) => device.clone(),
            Err(e) => {
                warn!(%plant, error = %e, "active plant has no device");
                return false;
            }
        };

        let desired = if action.is_toggle() {
            !self.actuator_state(&device, action)
        } else {
            true
        };
        let id = Uuid::new_v4();
        let request = Request::Command {
            id,
            device: device.clone(),
            token: action.token(),
            value: desired,
            duration_ms: action.duration_ms(),
        };

        debug!(%id, ?action, device = %device, desired, "dispatching command");
        let queued = match self.transport.request(request).await {
            Ok(Response::Queued) => Ok(()),
            Ok(Response::Rejected { reason }) => Err(Error::rejected(reason)),
            Err(e) => Err(e),
        };
        match queued {
            Ok(()) => {
                self.register_pending(id, action, device, desired);
                true
            }
            Err(error) => {
                warn!(%id, %error, "command not queued");
                self.raise_alert(Alert::error(format!(
                    "{} command failed: {}",
                    action.label(),
                    error
                )));
                self.bus.emit(&ClientEvent::CommandResolved {
                    id,
                    action,
                    device,
                    outcome: CommandOutcome::Failed {
                        reason: error.to_string(),
                    },
                });
                false
            }
        }
    }

    fn register_pending(self: &Arc<Self>, id: Uuid, action: Action, device: DeviceId, desired: bool) {
        let weak = Arc::downgrade(self);
        let window = self.ack_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.resolve_timeout(id, "local window");
            }
        });
        self.lock_pending().insert(
            id,
            PendingEntry {
                command: PendingCommand {
                    id,
                    action,
                    device,
                    desired,
                    issued_at: OffsetDateTime::now_utc(),
                },
                timer: timer.abort_handle(),
            },
        );
    }

    /// Device acknowledgement path. First resolution wins; a duplicate or
    /// late acknowledgement finds no pending entry and is ignored.
    fn resolve_success(&self, id: Uuid) {
        let Some(entry) = self.lock_pending().remove(&id) else {
            trace!(%id, "acknowledgement for unknown or resolved command");
            return;
        };
        entry.timer.abort();
        let command = entry.command;

        if command.action.is_toggle() {
            self.lock_actuators()
                .insert((command.device.clone(), command.action), command.desired);
        }

        info!(%id, action = ?command.action, "command acknowledged");
        self.raise_alert(Alert::success(format!(
            "{} command completed",
            command.action.label()
        )));
        self.bus.emit(&ClientEvent::CommandResolved {
            id,
            action: command.action,
            device: command.device,
            outcome: CommandOutcome::Succeeded,
        });
    }

    /// Timeout path, shared by the local window and the backend notice.
    fn resolve_timeout(&self, id: Uuid, source: &str) {
        let Some(entry) = self.lock_pending().remove(&id) else {
            trace!(%id, source, "timeout for unknown or resolved command");
            return;
        };
        entry.timer.abort();
        let command = entry.command;

        warn!(%id, action = ?command.action, source, "command timed out");
        self.raise_alert(Alert::error(format!(
            "{} command timed out, no acknowledgement from device",
            command.action.label()
        )));
        self.bus.emit(&ClientEvent::CommandResolved {
            id,
            action: command.action,
            device: command.device,
            outcome: CommandOutcome::TimedOut,
        });
    }

    fn apply_actuator_state(&self, device: &DeviceId, water_on: bool, light_on: bool) {
        let mut actuators = self.lock_actuators();
        actuators.insert((device.clone(), Action::Water), water_on);
        actuators.insert((device.clone(), Action::Light), light_on);
    }

    fn raise_alert(&self, alert: Alert) {
        self.alerts.push(alert.clone());
        self.bus.emit(&ClientEvent::Alert(alert));
    }

    fn lock_plant(&self) -> std::sync::MutexGuard<'_, String> {
        self.active_plant.lock().expect("active plant lock poisoned")
    }

    fn lock_actuators(&self) -> std::sync::MutexGuard<'_, HashMap<(DeviceId, Action), bool>> {
        self.actuators.lock().expect("actuator map lock poisoned")
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingEntry>> {
        self.pending.lock().expect("pending table lock poisoned")
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get() {
            self.bus.unsubscribe(*id);
        }
        for entry in self.lock_pending().values() {
            entry.timer.abort();
        }
    }
}
