//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns the transport session: handshake, failure
//! detection, bounded exponential-backoff reconnection, and the inbound
//! pump that turns raw push events into typed [`ClientEvent`]s. The
//! connection state is owned exclusively here; every other component
//! observes it through emitted events.
//!
//! Retry policy: after each transport failure, attempt `k` is scheduled
//! after `min(base * multiplier^(k-1), ceiling)`. When the attempt budget
//! is exhausted the manager parks in `Failed` with a terminal alert and
//! waits for an explicit caller-triggered retry (`disconnect()` then
//! `connect()` starts a fresh session).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use verdant_types::{DeviceId, ReservoirLevels, SensorReading};

use crate::alerts::{Alert, AlertGenerator, AlertLog};
use crate::config::CoreConfig;
use crate::error::Error;
use crate::events::{ClientEvent, EventBus};
use crate::health;
use crate::normalizer;
use crate::registry::{DeviceRegistry, ReservoirRole};
use crate::transport::{PushEvent, Request, Transport};

/// State of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; fresh boundary, attempt counter is zero.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Session established and presumed live.
    Connected,
    /// Session lost or handshake failed; a backoff timer is pending.
    Reconnecting,
    /// Retry budget exhausted; awaiting explicit caller retry.
    Failed,
}

struct ManagerState {
    state: ConnectionState,
    attempts: u32,
    last_connected: Option<OffsetDateTime>,
    last_error: Option<String>,
    retry_timer: Option<AbortHandle>,
    /// Whether this session has connected at least once, which makes the
    /// next successful connect a reconnection (alert-worthy).
    ever_connected: bool,
}

/// Owns the transport session lifecycle and the inbound event pump.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    config: CoreConfig,
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    alerts: Arc<AlertLog>,
    generator: AlertGenerator,
    state: Mutex<ManagerState>,
    /// Last-known reading per device, merged for reservoir derivation.
    latest: Mutex<HashMap<DeviceId, SensorReading>>,
    pump_cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager and start its inbound pump.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: CoreConfig,
        registry: Arc<DeviceRegistry>,
        bus: EventBus,
        alerts: Arc<AlertLog>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            transport,
            config,
            registry,
            bus,
            alerts,
            generator: AlertGenerator::new(),
            state: Mutex::new(ManagerState {
                state: ConnectionState::Disconnected,
                attempts: 0,
                last_connected: None,
                last_error: None,
                retry_timer: None,
                ever_connected: false,
            }),
            latest: Mutex::new(HashMap::new()),
            pump_cancel: CancellationToken::new(),
        });
        manager.spawn_pump();
        manager
    }

    /// The transport behind this manager.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// The event bus shared with this manager.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Current state machine state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Reconnection attempts consumed in the current session.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Last transport error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// When the session last reached `Connected`.
    pub fn last_connected(&self) -> Option<OffsetDateTime> {
        self.lock().last_connected
    }

    /// True only when the state machine reports `Connected` AND the
    /// transport concurrently reports itself live. The two can
    /// desynchronize transiently, so both are required.
    pub fn is_connected(&self) -> bool {
        self.lock().state == ConnectionState::Connected && self.transport.is_live()
    }

    /// Last-known reading for a device, if any has arrived.
    pub fn latest_reading(&self, device: &DeviceId) -> Option<SensorReading> {
        self.latest
            .lock()
            .expect("latest-readings lock poisoned")
            .get(device)
            .cloned()
    }

    /// Reservoir levels merged from the authoritative devices'
    /// last-known readings.
    pub fn reservoir_levels(&self) -> ReservoirLevels {
        let latest = self.latest.lock().expect("latest-readings lock poisoned");
        let water = self
            .registry
            .reservoir_authority(ReservoirRole::Water)
            .and_then(|d| latest.get(d));
        let fertilizer = self
            .registry
            .reservoir_authority(ReservoirRole::Fertilizer)
            .and_then(|d| latest.get(d));
        health::merge_reservoir(water, fertilizer)
    }

    /// Attempt to establish the session.
    ///
    /// Resolves `true` once connected. Resolves `false` without touching
    /// the transport when the retry budget is already exhausted (a
    /// connection-state notification is still emitted so observers learn
    /// why nothing happened); `disconnect()` starts a fresh budget.
    pub async fn connect(self: &Arc<Self>) -> bool {
        {
            let mut st = self.lock();
            match st.state {
                ConnectionState::Connected => return true,
                ConnectionState::Connecting => {
                    debug!("connect already in flight");
                    return false;
                }
                _ => {}
            }
            if st.attempts >= self.config.max_reconnect_attempts {
                let attempts = st.attempts;
                drop(st);
                warn!(attempts, "retry budget exhausted, refusing to connect");
                self.emit_state(ConnectionState::Failed, attempts);
                return false;
            }
            // A fresh attempt supersedes any pending backoff timer.
            if let Some(timer) = st.retry_timer.take() {
                timer.abort();
            }
            st.state = ConnectionState::Connecting;
            let attempts = st.attempts;
            drop(st);
            self.emit_state(ConnectionState::Connecting, attempts);
        }

        info!(endpoint = %self.config.endpoint, "connecting");
        let attempt = tokio::time::timeout(self.config.connect_timeout, self.transport.connect());
        match attempt.await {
            Ok(Ok(())) => {
                self.on_connected().await;
                true
            }
            Ok(Err(e)) => {
                self.on_connect_failure(e.to_string());
                false
            }
            // Watchdog: the transport neither confirmed nor errored.
            Err(_) => {
                self.on_connect_failure(
                    Error::timeout("connect", self.config.connect_timeout).to_string(),
                );
                false
            }
        }
    }

    /// Tear the session down. A fresh session boundary: the attempt
    /// counter resets, pending reconnect timers are cancelled, and no
    /// backoff is entered. Outstanding command timeouts are unaffected.
    pub async fn disconnect(&self) {
        {
            let mut st = self.lock();
            st.attempts = 0;
            st.ever_connected = false;
            st.state = ConnectionState::Disconnected;
            st.last_error = None;
            if let Some(timer) = st.retry_timer.take() {
                timer.abort();
            }
        }
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "transport close failed");
        }
        info!("disconnected");
        self.emit_state(ConnectionState::Disconnected, 0);
    }

    /// Stop the inbound pump. Called implicitly on drop.
    pub fn shutdown(&self) {
        self.pump_cancel.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().expect("connection state lock poisoned")
    }

    fn emit_state(&self, state: ConnectionState, attempts: u32) {
        self.bus
            .emit(&ClientEvent::ConnectionChanged { state, attempts });
    }

    fn raise_alert(&self, alert: Alert) {
        self.alerts.push(alert.clone());
        self.bus.emit(&ClientEvent::Alert(alert));
    }

    async fn on_connected(self: &Arc<Self>) {
        let was_reconnection = {
            let mut st = self.lock();
            if let Some(timer) = st.retry_timer.take() {
                timer.abort();
            }
            let was_reconnection = st.ever_connected;
            st.state = ConnectionState::Connected;
            st.attempts = 0;
            st.last_connected = Some(OffsetDateTime::now_utc());
            st.last_error = None;
            st.ever_connected = true;
            was_reconnection
        };

        info!(endpoint = %self.config.endpoint, "connected");
        self.emit_state(ConnectionState::Connected, 0);

        // Late bus subscribers see no past events, so every (re)connect
        // re-requests the full snapshot for all registered devices.
        let request = Request::Snapshot {
            devices: self.registry.device_ids(),
        };
        if let Err(e) = self.transport.request(request).await {
            warn!(error = %e, "initial snapshot request failed");
        }

        if was_reconnection {
            self.raise_alert(Alert::success("Reconnected to backend"));
        }
    }

    fn on_connect_failure(self: &Arc<Self>, message: String) {
        let mut st = self.lock();
        st.attempts += 1;
        st.last_error = Some(message.clone());
        let attempts = st.attempts;

        if attempts < self.config.max_reconnect_attempts {
            st.state = ConnectionState::Reconnecting;
            let delay = self.config.retry_delay(attempts);
            let weak = Arc::downgrade(self);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(manager) = weak.upgrade() {
                    let _ = manager.connect().await;
                }
            });
            if let Some(old) = st.retry_timer.replace(handle.abort_handle()) {
                old.abort();
            }
            drop(st);
            warn!(attempts, ?delay, error = %message, "connect failed, retry scheduled");
            self.emit_state(ConnectionState::Reconnecting, attempts);
        } else {
            st.state = ConnectionState::Failed;
            if let Some(timer) = st.retry_timer.take() {
                timer.abort();
            }
            drop(st);
            warn!(attempts, error = %message, "retry budget exhausted");
            self.emit_state(ConnectionState::Failed, attempts);
            self.raise_alert(Alert::error(format!(
                "Connection to {} failed after {} attempts: {}",
                self.config.endpoint, attempts, message
            )));
        }
    }

    fn spawn_pump(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let cancel = self.pump_cancel.clone();
        let mut rx = self.transport.events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            let Some(manager) = weak.upgrade() else { break };
                            manager.handle_push(event);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "push stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("inbound pump stopped");
        });
    }

    fn handle_push(self: &Arc<Self>, event: PushEvent) {
        match event {
            PushEvent::Snapshot { entries } => {
                let now = OffsetDateTime::now_utc();
                let mut readings = Vec::with_capacity(entries.len());
                for entry in entries {
                    if !self.registry.contains(&entry.device) {
                        warn!(device = %entry.device, "snapshot entry for unregistered device");
                        continue;
                    }
                    let reading = normalizer::normalize(&entry.device, &entry.reading, now);
                    self.latest
                        .lock()
                        .expect("latest-readings lock poisoned")
                        .insert(entry.device.clone(), reading.clone());
                    self.bus.emit(&ClientEvent::ActuatorState {
                        device: entry.device,
                        water_on: entry.water_on,
                        light_on: entry.light_on,
                    });
                    readings.push(reading);
                }
                debug!(devices = readings.len(), "snapshot applied");
                self.bus.emit(&ClientEvent::Snapshot { readings });
                self.bus
                    .emit(&ClientEvent::Reservoir(self.reservoir_levels()));
            }
            PushEvent::Reading { device, payload } => {
                if !self.registry.contains(&device) {
                    warn!(device = %device, "reading from unregistered device");
                    return;
                }
                let reading = normalizer::normalize(&device, &payload, OffsetDateTime::now_utc());
                self.latest
                    .lock()
                    .expect("latest-readings lock poisoned")
                    .insert(device.clone(), reading.clone());

                self.bus.emit(&ClientEvent::Reading(reading.clone()));

                // Profile is guaranteed present: contains() passed above.
                if let Ok(profile) = self.registry.profile(&device) {
                    for alert in self.generator.evaluate_reading(&reading, profile) {
                        self.raise_alert(alert);
                    }
                }

                // Floor checks run only on levels the device actually
                // reported; a defaulted 0 from an omitted field must not
                // raise refill errors.
                if self.registry.reservoir_authority(ReservoirRole::Water) == Some(&device)
                    && normalizer::reported_water_level(&payload).is_some()
                    && let Some(alert) = self.generator.water_floor_alert(reading.water_level)
                {
                    self.raise_alert(alert);
                }
                if self.registry.reservoir_authority(ReservoirRole::Fertilizer) == Some(&device)
                    && normalizer::reported_fertilizer_level(&payload).is_some()
                    && let Some(alert) =
                        self.generator.fertilizer_floor_alert(reading.fertilizer_level)
                {
                    self.raise_alert(alert);
                }

                self.bus
                    .emit(&ClientEvent::Reservoir(self.reservoir_levels()));
            }
            PushEvent::Reservoir(levels) => {
                self.bus.emit(&ClientEvent::Reservoir(levels));
                for alert in self.generator.evaluate_reservoir(&levels) {
                    self.raise_alert(alert);
                }
            }
            PushEvent::CommandAck { id } => {
                trace!(%id, "device acknowledgement received");
                self.bus.emit(&ClientEvent::CommandAcknowledged { id });
            }
            PushEvent::CommandTimedOut { id } => {
                trace!(%id, "server-side command timeout received");
                self.bus.emit(&ClientEvent::CommandTimedOut { id });
            }
            PushEvent::ConnectionEstablished => {
                debug!("server confirmed session");
            }
            PushEvent::ConnectionLost { reason } => {
                // Only a live session can be lost. While Connecting the
                // in-flight attempt reports its own failure; in any other
                // state the notice is stale or client-initiated. Acting on
                // it anyway would count one failure twice.
                if self.lock().state != ConnectionState::Connected {
                    debug!(%reason, "ignoring lost-session notice without a live session");
                    return;
                }
                self.raise_alert(Alert::warning(format!("Connection lost: {}", reason)));
                self.on_connect_failure(format!("connection lost: {}", reason));
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.pump_cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::alerts::AlertKind;
    use crate::mock::MockTransport;

    struct Harness {
        mock: Arc<MockTransport>,
        manager: Arc<ConnectionManager>,
        alerts: Arc<AlertLog>,
        events: Arc<StdMutex<Vec<ClientEvent>>>,
    }

    fn harness() -> Harness {
        harness_with_config(CoreConfig::default())
    }

    fn harness_with_config(config: CoreConfig) -> Harness {
        let mock = Arc::new(MockTransport::new());
        let bus = EventBus::new();
        let alerts = Arc::new(AlertLog::new(config.alert_capacity));
        let events = Arc::new(StdMutex::new(Vec::new()));
        {
            let events = Arc::clone(&events);
            bus.subscribe(move |event| events.lock().unwrap().push(event.clone()));
        }
        let manager = ConnectionManager::new(
            Arc::clone(&mock) as Arc<dyn Transport>,
            config,
            Arc::new(DeviceRegistry::with_defaults()),
            bus,
            Arc::clone(&alerts),
        );
        Harness {
            mock,
            manager,
            alerts,
            events,
        }
    }

    /// Let the pump and any due timers run (paused-clock tests
    /// auto-advance while every task is idle).
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn wait_for_state(manager: &Arc<ConnectionManager>, state: ConnectionState) {
        for _ in 0..10_000 {
            if manager.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("never reached {:?}, stuck in {:?}", state, manager.state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_requests_snapshot() {
        let h = harness();
        assert!(h.manager.connect().await);
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(h.manager.is_connected());
        assert!(h.manager.last_connected().is_some());

        let requests = h.mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            Request::Snapshot {
                devices: vec![DeviceId::new("planter-a"), DeviceId::new("planter-b")],
            }
        );

        let events = h.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            ClientEvent::ConnectionChanged {
                state: ConnectionState::Connected,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_enters_backoff_then_recovers() {
        let h = harness();
        h.mock.fail_connect_times(2);

        assert!(!h.manager.connect().await);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert_eq!(h.manager.attempts(), 1);
        assert!(h.manager.last_error().is_some());

        // Backoff timers fire under the paused clock; the third attempt
        // succeeds and resets the counter.
        wait_for_state(&h.manager, ConnectionState::Connected).await;
        assert_eq!(h.manager.attempts(), 0);
        assert_eq!(h.mock.connect_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_terminal_and_alerts_once() {
        let h = harness();
        h.mock.set_always_fail_connect(true);

        assert!(!h.manager.connect().await);
        wait_for_state(&h.manager, ConnectionState::Failed).await;

        assert_eq!(h.mock.connect_calls(), 5);
        let terminal: Vec<_> = h
            .alerts
            .recent()
            .into_iter()
            .filter(|a| a.kind == AlertKind::Error)
            .collect();
        assert_eq!(terminal.len(), 1);
        assert!(terminal[0].message.contains("http://localhost:4000"));
        assert!(terminal[0].message.contains("5 attempts"));

        // Exhausted budget: no further transport call, no further alert.
        assert!(!h.manager.connect().await);
        settle().await;
        assert_eq!(h.mock.connect_calls(), 5);
        assert_eq!(
            h.alerts
                .recent()
                .iter()
                .filter(|a| a.kind == AlertKind::Error)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_a_fresh_session_boundary() {
        let h = harness();
        assert!(h.manager.connect().await);
        h.manager.disconnect().await;

        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.manager.attempts(), 0);
        assert!(!h.manager.is_connected());
        assert!(!h.mock.is_live());

        // And the budget is fresh: connecting again works.
        assert!(h.manager.connect().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_connected_requires_live_transport() {
        let h = harness();
        assert!(h.manager.connect().await);
        assert!(h.manager.is_connected());

        // Transport dies without the state machine noticing yet.
        h.mock.close().await.unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert!(!h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_disconnect_reenters_backoff_and_reconnects() {
        let h = harness();
        assert!(h.manager.connect().await);

        h.mock.drop_connection("backend restart");
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

        wait_for_state(&h.manager, ConnectionState::Connected).await;
        assert_eq!(h.manager.attempts(), 0);

        let alerts = h.alerts.recent();
        assert!(
            alerts
                .iter()
                .any(|a| a.kind == AlertKind::Warning && a.message.contains("Connection lost"))
        );
        assert!(
            alerts
                .iter()
                .any(|a| a.kind == AlertKind::Success && a.message.contains("Reconnected"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_disconnect_does_not_reenter_backoff() {
        let h = harness();
        assert!(h.manager.connect().await);
        h.manager.disconnect().await;
        let calls_after_disconnect = h.mock.connect_calls();

        // A late lost-session notice from the server must be ignored.
        h.mock.push(PushEvent::ConnectionLost {
            reason: "client went away".to_string(),
        });
        settle().await;

        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.mock.connect_calls(), calls_after_disconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_watchdog_forces_failure_handling() {
        let h = harness();
        // Hangs longer than the 20s watchdog.
        h.mock.set_connect_latency(Duration::from_secs(60));

        assert!(!h.manager.connect().await);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
        assert!(
            h.manager
                .last_error()
                .unwrap()
                .contains("operation 'connect' timed out")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_session_during_connect_is_not_double_counted() {
        let h = harness();
        h.mock.fail_connect_times(1);
        h.mock.set_connect_latency(Duration::from_secs(1));

        let manager = Arc::clone(&h.manager);
        let in_flight = tokio::spawn(async move { manager.connect().await });

        // The notice lands while the handshake is still in flight.
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        h.mock.push(PushEvent::ConnectionLost {
            reason: "stale session".to_string(),
        });
        settle().await;

        // Only the in-flight attempt itself counts the failure.
        assert!(!in_flight.await.unwrap());
        assert_eq!(h.manager.attempts(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_low_water_level_in_reading_raises_floor_alert() {
        let h = harness();
        assert!(h.manager.connect().await);

        // planter-a is the water authority and reports an explicit level.
        h.mock.push(PushEvent::Reading {
            device: DeviceId::new("planter-a"),
            payload: json!({ "moisture_pct": 75.0, "water_level_pct": 10.0 }),
        });
        settle().await;

        let errors: Vec<_> = h
            .alerts
            .recent()
            .into_iter()
            .filter(|a| a.kind == AlertKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Water reservoir low"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_omitted_level_field_raises_no_floor_alert() {
        let h = harness();
        assert!(h.manager.connect().await);

        // No level field: the normalized reading defaults it to 0, which
        // must not read as an empty tank.
        h.mock.push(PushEvent::Reading {
            device: DeviceId::new("planter-a"),
            payload: json!({ "moisture_pct": 75.0 }),
        });
        settle().await;

        assert!(
            !h.alerts
                .recent()
                .iter()
                .any(|a| a.kind == AlertKind::Error)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reading_push_updates_latest_and_emits() {
        let h = harness();
        assert!(h.manager.connect().await);

        let device = DeviceId::new("planter-a");
        h.mock.push(PushEvent::Reading {
            device: device.clone(),
            payload: json!({ "moisture_pct": 70.0, "temperature": 22.0 }),
        });
        settle().await;

        let reading = h.manager.latest_reading(&device).unwrap();
        assert_eq!(reading.moisture, 70.0);
        assert_eq!(reading.temperature, 22.0);

        let events = h.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, ClientEvent::Reading(r) if r.device == device)));
        assert!(events.iter().any(|e| matches!(e, ClientEvent::Reservoir(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_device_reading_is_dropped() {
        let h = harness();
        assert!(h.manager.connect().await);

        let device = DeviceId::new("planter-x");
        h.mock.push(PushEvent::Reading {
            device: device.clone(),
            payload: json!({ "moisture_pct": 70.0 }),
        });
        settle().await;

        assert!(h.manager.latest_reading(&device).is_none());
        let events = h.events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, ClientEvent::Reading(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_applies_all_entries_and_actuator_states() {
        let h = harness();
        assert!(h.manager.connect().await);

        h.mock.push(PushEvent::Snapshot {
            entries: vec![
                crate::transport::SnapshotEntry {
                    device: DeviceId::new("planter-a"),
                    reading: json!({ "moisture_pct": 75.0, "water_level_pct": 80.0 }),
                    water_on: true,
                    light_on: false,
                },
                crate::transport::SnapshotEntry {
                    device: DeviceId::new("planter-b"),
                    reading: json!({ "fertilizer_level_pct": 55.0 }),
                    water_on: false,
                    light_on: true,
                },
            ],
        });
        settle().await;

        assert!(h.manager.latest_reading(&DeviceId::new("planter-a")).is_some());
        assert!(h.manager.latest_reading(&DeviceId::new("planter-b")).is_some());

        let levels = h.manager.reservoir_levels();
        assert_eq!(levels.water_pct, 80.0);
        assert_eq!(levels.fertilizer_pct, 55.0);

        let events = h.events.lock().unwrap();
        let actuator_events = events
            .iter()
            .filter(|e| matches!(e, ClientEvent::ActuatorState { .. }))
            .count();
        assert_eq!(actuator_events, 2);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ClientEvent::Snapshot { readings } if readings.len() == 2))
        );
    }
}
