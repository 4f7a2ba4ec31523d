//! End-to-end pipeline tests over the mock transport: raw push events in,
//! typed events and alerts out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use verdant_core::{
    Action, Alert, AlertKind, AlertLog, ClientEvent, CommandDispatcher, ConnectionManager,
    ConnectionState, CoreConfig, DeviceId, DeviceRegistry, EventBus, MockTransport, PushEvent,
    Transport, health,
};

struct Pipeline {
    mock: Arc<MockTransport>,
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<DeviceRegistry>,
    alerts: Arc<AlertLog>,
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

fn pipeline() -> Pipeline {
    let config = CoreConfig::default();
    let mock = Arc::new(MockTransport::new());
    let registry = Arc::new(DeviceRegistry::with_defaults());
    let alerts = Arc::new(AlertLog::new(config.alert_capacity));
    let bus = EventBus::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        bus.subscribe(move |event| events.lock().unwrap().push(event.clone()));
    }
    let connection = ConnectionManager::new(
        Arc::clone(&mock) as Arc<dyn Transport>,
        config.clone(),
        Arc::clone(&registry),
        bus,
        Arc::clone(&alerts),
    );
    let dispatcher = CommandDispatcher::new(
        Arc::clone(&connection),
        Arc::clone(&registry),
        Arc::clone(&alerts),
        config.command_timeout,
    );
    Pipeline {
        mock,
        connection,
        dispatcher,
        registry,
        alerts,
        events,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn alerts_matching(alerts: &[Alert], kind: AlertKind, needle: &str) -> usize {
    alerts
        .iter()
        .filter(|a| a.kind == kind && a.message.contains(needle))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_dry_reading_raises_exactly_one_moisture_warning() {
    let p = pipeline();
    assert!(p.connection.connect().await);

    // Monstera optimal moisture is [65, 85]; everything else in range.
    p.mock.push(PushEvent::Reading {
        device: DeviceId::new("planter-a"),
        payload: json!({
            "moisture_pct": 40.0,
            "temperature": 22.0,
            "humidity": 60.0,
            "sunlight": 15000.0,
            "npk": { "n": 40.0, "p": 40.0, "k": 40.0 },
            "water_level_pct": 80.0,
        }),
    });
    settle().await;

    let alerts = p.alerts.recent();
    assert_eq!(alerts_matching(&alerts, AlertKind::Warning, "moisture low"), 1);
    assert_eq!(alerts.len(), 1);

    // The same alert also went out on the bus.
    let events = p.events.lock().unwrap();
    let alert_events = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::Alert(_)))
        .count();
    assert_eq!(alert_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_low_water_reservoir_raises_exactly_one_error() {
    let p = pipeline();
    assert!(p.connection.connect().await);

    p.mock
        .push(PushEvent::Reservoir(health::levels_from_pcts(15.0, 60.0)));
    settle().await;

    let alerts = p.alerts.recent();
    assert_eq!(alerts_matching(&alerts, AlertKind::Error, "Water reservoir low"), 1);
    assert_eq!(alerts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_normalizer_fills_defaults_through_the_pipeline() {
    let p = pipeline();
    assert!(p.connection.connect().await);

    p.mock.push(PushEvent::Reading {
        device: DeviceId::new("planter-b"),
        payload: json!({ "temp": "19.5" }),
    });
    settle().await;

    let reading = p
        .connection
        .latest_reading(&DeviceId::new("planter-b"))
        .unwrap();
    assert_eq!(reading.temperature, 19.5);
    assert_eq!(reading.humidity, 50.0);
    assert_eq!(reading.moisture, 0.0);
    assert_eq!(reading.sunlight, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_health_scoring_from_live_reading() {
    let p = pipeline();
    assert!(p.connection.connect().await);

    let device = DeviceId::new("planter-a");
    p.mock.push(PushEvent::Reading {
        device: device.clone(),
        payload: json!({
            "moisture_pct": 75.0,
            "temperature": 22.5,
            "humidity": 60.0,
            "sunlight": 15000.0,
        }),
    });
    settle().await;

    let reading = p.connection.latest_reading(&device).unwrap();
    let profile = p.registry.profile(&device).unwrap();
    let score = health::health_score(&reading, profile);
    assert!((score - 100.0).abs() < 1e-9);
    assert_eq!(
        health::health_status(&reading, profile),
        verdant_core::HealthStatus::Excellent
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhaustion_end_to_end() {
    let p = pipeline();
    p.mock.set_always_fail_connect(true);

    assert!(!p.connection.connect().await);
    for _ in 0..10_000 {
        if p.connection.state() == ConnectionState::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(p.connection.state(), ConnectionState::Failed);
    assert_eq!(p.mock.connect_calls(), 5);

    let alerts = p.alerts.recent();
    assert_eq!(alerts_matching(&alerts, AlertKind::Error, "5 attempts"), 1);

    // Commands in the failed state never reach the transport.
    assert!(!p.dispatcher.send_command(Action::Water).await);
    assert_eq!(p.mock.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_command_round_trip() {
    let p = pipeline();
    assert!(p.connection.connect().await);

    assert!(p.dispatcher.send_command(Action::Water).await);
    let id = p.dispatcher.pending()[0].id;
    p.mock.push(PushEvent::CommandAck { id });
    settle().await;

    assert!(p.dispatcher.pending().is_empty());
    assert!(
        p.dispatcher
            .actuator_state(&DeviceId::new("planter-a"), Action::Water)
    );
    assert_eq!(
        alerts_matching(&p.alerts.recent(), AlertKind::Success, "Watering command completed"),
        1
    );

    let events = p.events.lock().unwrap();
    let resolved = events
        .iter()
        .filter(|e| matches!(e, ClientEvent::CommandResolved { .. }))
        .count();
    assert_eq!(resolved, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_snapshot_request() {
    let p = pipeline();
    assert!(p.connection.connect().await);
    assert_eq!(p.mock.request_count(), 1);

    p.mock.drop_connection("backend restart");
    for _ in 0..10_000 {
        if p.connection.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(p.connection.is_connected());

    // A second snapshot request compensates for missed events.
    assert_eq!(p.mock.request_count(), 2);
    assert_eq!(
        alerts_matching(&p.alerts.recent(), AlertKind::Success, "Reconnected"),
        1
    );
}
