//! Versioned Adapter - benchmark system adapter for a versioned RDF store.
//!
//! Usage:
//!   versioned-adapter --config adapter.json
//!   versioned-adapter --mqtt-host broker --staging-dir /data/staging --store-dir /data/store
//!   versioned-adapter --cycle-policy after-last-phase --debug

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use versioned_adapter::bus::{BusHandler, MessageBus, MqttBus};
use versioned_adapter::config::CyclePolicy;
use versioned_adapter::{AdapterConfig, SystemAdapter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Immediate,
    AfterLastPhase,
}

impl From<PolicyArg> for CyclePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Immediate => CyclePolicy::Immediate,
            PolicyArg::AfterLastPhase => CyclePolicy::AfterLastPhase,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "versioned-adapter")]
#[command(about = "Benchmark system adapter for a versioned RDF store")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the fragments of the current version
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Persistent store directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// MQTT host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// When loaded versions become queryable
    #[arg(long, value_enum)]
    cycle_policy: Option<PolicyArg>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn into_config(self) -> versioned_adapter::Result<AdapterConfig> {
        let mut config = match &self.config {
            Some(path) => AdapterConfig::from_file(path)?,
            None => AdapterConfig::default(),
        };
        if let Some(dir) = self.staging_dir {
            config.staging_dir = dir;
        }
        if let Some(dir) = self.store_dir {
            config.store_dir = dir;
        }
        if let Some(host) = self.mqtt_host {
            config.bus.host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.bus.port = port;
        }
        if let Some(policy) = self.cycle_policy {
            config.cycle_policy = policy.into();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config()?;
    info!(broker = %format!("{}:{}", config.bus.host, config.bus.port), "starting versioned adapter");

    let bus = Arc::new(MqttBus::new(&config.bus)?);
    let adapter = Arc::new(SystemAdapter::new(config, Arc::clone(&bus) as Arc<dyn MessageBus>)?);
    adapter.init()?;

    let bus_for_signal = Arc::clone(&bus);
    ctrlc::set_handler(move || {
        info!("received Ctrl+C, stopping");
        bus_for_signal.stop();
    })?;

    let run = bus.run(Arc::clone(&adapter) as Arc<dyn BusHandler>);
    adapter.close()?;
    run?;

    let (received, errors) = bus.metrics();
    info!(received, errors, "versioned adapter stopped");
    Ok(())
}
