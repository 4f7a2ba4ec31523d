//! Client core for the Verdant plant-monitoring dashboard.
//!
//! This crate contains everything between the backend session and the UI:
//! connection lifecycle with bounded-backoff reconnection, raw-payload
//! normalization into canonical readings, plant health scoring, reservoir
//! derivation, threshold alerts, and queued actuator commands with
//! exactly-once acknowledgement tracking.
//!
//! # Architecture
//!
//! - [`Transport`] is the seam to the backend; production wires a real
//!   session behind it, tests use [`MockTransport`], demos use
//!   [`SimTransport`]
//! - [`ConnectionManager`] owns the session state machine and pumps
//!   inbound push events into typed [`ClientEvent`]s on an [`EventBus`]
//! - [`CommandDispatcher`] queues actuator commands and tracks their
//!   acknowledgements against a bounded window
//! - Pure helpers in [`health`] and [`normalizer`] do the math
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use verdant_core::{
//!     Action, AlertLog, CommandDispatcher, ConnectionManager, CoreConfig, DeviceRegistry,
//!     EventBus, SimTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CoreConfig::from_env();
//!     let registry = Arc::new(DeviceRegistry::with_defaults());
//!     let alerts = Arc::new(AlertLog::new(config.alert_capacity));
//!     let bus = EventBus::new();
//!     bus.subscribe(|event| println!("{:?}", event));
//!
//!     let transport = Arc::new(SimTransport::new(Arc::clone(&registry)));
//!     let connection = ConnectionManager::new(
//!         transport,
//!         config.clone(),
//!         Arc::clone(&registry),
//!         bus,
//!         Arc::clone(&alerts),
//!     );
//!     connection.connect().await;
//!
//!     let commands = CommandDispatcher::new(
//!         Arc::clone(&connection),
//!         registry,
//!         alerts,
//!         config.command_timeout,
//!     );
//!     commands.send_command(Action::Water).await;
//! }
//! ```

pub mod alerts;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod health;
pub mod mock;
pub mod normalizer;
pub mod registry;
pub mod sim;
pub mod transport;

// Re-export the shared data model for downstream convenience.
pub use verdant_types::{DeviceId, OptimalRange, PlantProfile, ReservoirLevels, SensorReading};

pub use alerts::{Alert, AlertGenerator, AlertKind, AlertLog};
pub use commands::{Action, CommandDispatcher, CommandOutcome, PendingCommand};
pub use config::CoreConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{Error, Result};
pub use events::{ClientEvent, EventBus, SubscriptionId};
pub use health::{HealthStatus, dimension_score, health_score, health_status};
pub use mock::MockTransport;
pub use registry::{DeviceRegistry, RegistryEntry, ReservoirRole};
pub use sim::SimTransport;
pub use transport::{CommandToken, PushEvent, Request, Response, SnapshotEntry, Transport};
