//! Typed client event bus.
//!
//! A single fan-out primitive decoupling the connection manager's inbound
//! stream from its consumers. Events carry their payload in the
//! [`ClientEvent`] tagged union; the bus is an explicit object injected
//! into components, never a module-level singleton.
//!
//! Delivery semantics:
//!
//! - handlers run synchronously, in subscription order
//! - a handler unsubscribed during emission is not invoked if the
//!   removal lands before its turn
//! - no retroactive delivery: late subscribers see nothing from the past
//!   (the connection manager compensates by re-requesting a snapshot on
//!   every (re)connect)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use verdant_types::{DeviceId, ReservoirLevels, SensorReading};

use crate::alerts::Alert;
use crate::commands::{Action, CommandOutcome};
use crate::connection::ConnectionState;

/// Events emitted by the client core.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ClientEvent {
    /// The connection state machine transitioned.
    ConnectionChanged {
        state: ConnectionState,
        /// Reconnection attempts consumed so far.
        attempts: u32,
    },
    /// Initial per-device snapshot received after (re)connect.
    Snapshot { readings: Vec<SensorReading> },
    /// One normalized reading arrived.
    Reading(SensorReading),
    /// Reservoir levels were updated.
    Reservoir(ReservoirLevels),
    /// Device-reported actuator states (from a snapshot).
    ActuatorState {
        device: DeviceId,
        water_on: bool,
        light_on: bool,
    },
    /// Raw device-level acknowledgement for a queued command.
    CommandAcknowledged { id: Uuid },
    /// Backend signalled that a queued command timed out device-side.
    CommandTimedOut { id: Uuid },
    /// Final, exactly-once outcome of a command lifecycle.
    CommandResolved {
        id: Uuid,
        action: Action,
        device: DeviceId,
        outcome: CommandOutcome,
    },
    /// A user-facing alert was raised.
    Alert(Alert),
}

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    handlers: Vec<(SubscriptionId, Handler)>,
}

/// Typed publish/subscribe registry for [`ClientEvent`]s.
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; returns a handle for later removal.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        inner.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns false if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let before = inner.handlers.len();
        inner.handlers.retain(|(sid, _)| *sid != id);
        inner.handlers.len() != before
    }

    /// Deliver an event to all current subscribers, in subscription order.
    ///
    /// The subscriber list is snapshotted up front, so handlers added
    /// during emission are not invoked for this event; each snapshotted
    /// handler is re-checked against the live list just before its turn,
    /// so a handler removed mid-emission is skipped. The lock is not held
    /// while a handler runs, which makes it safe for handlers to
    /// subscribe or unsubscribe.
    pub fn emit(&self, event: &ClientEvent) {
        let snapshot: Vec<(SubscriptionId, Handler)> = {
            let inner = self.inner.lock().expect("event bus lock poisoned");
            inner.handlers.clone()
        };

        for (id, handler) in snapshot {
            let still_subscribed = {
                let inner = self.inner.lock().expect("event bus lock poisoned");
                inner.handlers.iter().any(|(sid, _)| *sid == id)
            };
            if still_subscribed {
                handler(event);
            }
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("event bus lock poisoned").handlers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn reading_event() -> ClientEvent {
        ClientEvent::ConnectionChanged {
            state: ConnectionState::Connected,
            attempts: 0,
        }
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push(tag));
        }

        bus.emit(&reading_event());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));

        let id = {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.emit(&reading_event());
        assert!(bus.unsubscribe(id));
        bus.emit(&reading_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_handler_removed_during_emission_is_skipped() {
        let bus = EventBus::new();
        let fired = Arc::new(AtomicU64::new(0));

        // The first handler removes the second before its turn comes up.
        let second_id = Arc::new(StdMutex::new(None::<SubscriptionId>));
        {
            let bus = bus.clone();
            let second_id = Arc::clone(&second_id);
            bus.clone().subscribe(move |_| {
                if let Some(id) = *second_id.lock().unwrap() {
                    bus.unsubscribe(id);
                }
            });
        }
        let id = {
            let fired = Arc::clone(&fired);
            bus.subscribe(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        *second_id.lock().unwrap() = Some(id);

        bus.emit(&reading_event());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_retroactive_delivery() {
        let bus = EventBus::new();
        bus.emit(&reading_event());

        let count = Arc::new(AtomicU64::new(0));
        {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_serde_tagging() {
        let json = serde_json::to_string(&reading_event()).unwrap();
        assert!(json.contains("\"type\":\"connection_changed\""));
    }
}
