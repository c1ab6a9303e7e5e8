use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tokenrelay::config::{Command, Config, Settings, StoreCommand};
use tokenrelay_core::store::{resolve_room_id, ConfigStore, ROOM_ID_KEY};
use tokenrelay::pipeline::{self, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command {
        Command::Run { ref platforms } => run(&settings, platforms).await,
        Command::Probe { ref platform } => probe(&settings, platform),
        Command::Store(ref command) => store(&settings, command),
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("tokenrelay=debug,tokenrelay_core=debug")
    } else {
        EnvFilter::new("tokenrelay=info,tokenrelay_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

async fn run(settings: &Settings, platforms: &[String]) -> Result<()> {
    let pipeline = Pipeline::start_default(settings, platforms)?;
    tracing::info!(
        platforms = pipeline.len(),
        interval_ms = settings.poll_interval_ms,
        "relay running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("shutting down");
    pipeline.shutdown().await;
    Ok(())
}

fn probe(settings: &Settings, platform: &str) -> Result<()> {
    let platform = settings
        .platform(platform)
        .with_context(|| format!("Unknown platform: {}", platform))?;
    let reader = pipeline::reader(settings, &platform)?;

    match reader.read() {
        Some(reading) => println!(
            "{} {} ({})",
            reading.platform,
            reading.value,
            reading.captured_at.to_rfc3339()
        ),
        None => println!("{}: not found", platform.id),
    }
    Ok(())
}

fn store(settings: &Settings, command: &StoreCommand) -> Result<()> {
    let store = pipeline::open_store(settings)?;

    match command {
        StoreCommand::Get { key } => {
            let value = store.get(key)?.unwrap_or_default();
            println!("{}", value);
        }
        StoreCommand::Set { key, value } => {
            store.set(key, value.trim())?;
            tracing::info!(key = %key, path = ?store.path(), "saved");
        }
        StoreCommand::Status => match resolve_room_id(&store)? {
            Some(room_id) => println!("configured: {}", room_id),
            None => println!("no {} configured ({})", ROOM_ID_KEY, store.path().display()),
        },
    }
    Ok(())
}
