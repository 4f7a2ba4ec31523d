use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use verdant_core::{
    Action, AlertLog, ClientEvent, CommandDispatcher, CommandOutcome, ConnectionManager,
    CoreConfig, DeviceRegistry, EventBus, SimTransport, health,
};

#[derive(Parser)]
#[command(name = "verdant")]
#[command(author, version, about = "Client for the Verdant plant-monitoring dashboard", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live readings, reservoir levels, and alerts
    Watch {
        /// Stop after this many seconds (0 to run until Ctrl-C)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },

    /// Print one snapshot with health scores, then exit
    Status,

    /// Send an actuator command and wait for its outcome
    Command {
        /// Action to perform
        #[arg(value_enum)]
        action: ActionArg,

        /// Plant to target (defaults to the first registered plant)
        #[arg(short, long)]
        plant: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActionArg {
    Water,
    Light,
    Nutrients,
}

impl From<ActionArg> for Action {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Water => Action::Water,
            ActionArg::Light => Action::Light,
            ActionArg::Nutrients => Action::Nutrients,
        }
    }
}

struct Client {
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
}

fn build_client() -> Client {
    let config = CoreConfig::from_env();
    let registry = Arc::new(DeviceRegistry::with_defaults());
    let alerts = Arc::new(AlertLog::new(config.alert_capacity));
    let bus = EventBus::new();

    let transport = Arc::new(SimTransport::new(Arc::clone(&registry)));
    let connection = ConnectionManager::new(
        transport,
        config.clone(),
        Arc::clone(&registry),
        bus.clone(),
        Arc::clone(&alerts),
    );
    let dispatcher = CommandDispatcher::new(
        Arc::clone(&connection),
        Arc::clone(&registry),
        alerts,
        config.command_timeout,
    );
    Client {
        connection,
        dispatcher,
        registry,
        bus,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Watch { duration } => watch(duration).await,
        Commands::Status => status().await,
        Commands::Command { action, plant } => command(action.into(), plant).await,
    }
}

async fn connect_or_bail(client: &Client) -> Result<()> {
    if !client.connection.connect().await {
        bail!(
            "could not connect ({})",
            client
                .connection
                .last_error()
                .unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

async fn watch(duration: u64) -> Result<()> {
    let client = build_client();

    let registry = Arc::clone(&client.registry);
    client.bus.subscribe(move |event| match event {
        ClientEvent::Reading(reading) => {
            if let Ok(profile) = registry.profile(&reading.device) {
                let score = health::health_score(reading, profile);
                println!(
                    "{}  {}  moisture {:>5.1}%  temp {:>4.1}°C  humidity {:>4.1}%  light {:>7.0} lux  health {:>5.1} ({})",
                    reading.device,
                    profile.name,
                    reading.moisture,
                    reading.temperature,
                    reading.humidity,
                    reading.sunlight,
                    score,
                    health::HealthStatus::from_score(score),
                );
            }
        }
        ClientEvent::Reservoir(levels) => {
            println!(
                "reservoirs  water {:.1}% ({:.1} cm)  fertilizer {:.1}% ({:.1} cm)",
                levels.water_pct, levels.water_cm, levels.fertilizer_pct, levels.fertilizer_cm
            );
        }
        ClientEvent::Alert(alert) => {
            println!("[{:?}] {}", alert.kind, alert.message);
        }
        ClientEvent::ConnectionChanged { state, attempts } => {
            println!("connection: {:?} (attempts: {})", state, attempts);
        }
        _ => {}
    });

    connect_or_bail(&client).await?;

    if duration == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::time::sleep(Duration::from_secs(duration)).await;
    }

    client.connection.disconnect().await;
    Ok(())
}

async fn status() -> Result<()> {
    let client = build_client();
    connect_or_bail(&client).await?;

    // Give the snapshot a moment to arrive.
    tokio::time::sleep(Duration::from_millis(500)).await;

    for entry in client.registry.entries() {
        match client.connection.latest_reading(&entry.device) {
            Some(reading) => {
                let score = health::health_score(&reading, &entry.profile);
                println!(
                    "{:<10} ({}): health {:.1} ({})",
                    entry.profile.name,
                    entry.device,
                    score,
                    health::HealthStatus::from_score(score),
                );
            }
            None => println!("{:<10} ({}): no data", entry.profile.name, entry.device),
        }
    }
    let levels = client.connection.reservoir_levels();
    println!(
        "reservoirs: water {:.1}%, fertilizer {:.1}%",
        levels.water_pct, levels.fertilizer_pct
    );

    client.connection.disconnect().await;
    Ok(())
}

async fn command(action: Action, plant: Option<String>) -> Result<()> {
    let client = build_client();
    connect_or_bail(&client).await?;

    if let Some(plant) = plant {
        client.dispatcher.set_active_plant(&plant).await?;
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.bus.subscribe(move |event| {
        if let ClientEvent::CommandResolved { outcome, .. } = event {
            let _ = tx.send(outcome.clone());
        }
    });

    if !client.dispatcher.send_command(action).await {
        client.connection.disconnect().await;
        bail!("command was not queued");
    }

    let outcome = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
    client.connection.disconnect().await;
    match outcome {
        Ok(Some(CommandOutcome::Succeeded)) => {
            println!("command acknowledged");
            Ok(())
        }
        Ok(Some(CommandOutcome::Failed { reason })) => bail!("command failed: {}", reason),
        Ok(Some(CommandOutcome::TimedOut)) => bail!("command timed out"),
        _ => bail!("no command outcome received"),
    }
}
