//! fleetd — the ollama-fleet daemon.
//!
//! Single binary that assembles the fleet subsystems:
//! - Worker registry and demand tracker
//! - Docker container runtime
//! - GPU metrics probe
//! - Scaling engine
//! - Request router + HTTP API
//!
//! # Usage
//!
//! ```text
//! fleetd --config /etc/ollama-fleet/fleet.toml --port 8080
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use fleet_core::{FleetConfig, ProbeKind};

#[derive(Parser)]
#[command(name = "fleetd", about = "Autoscaling router for Ollama workers")]
struct Cli {
    /// Path to a fleet.toml configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port the HTTP API listens on.
    #[arg(long)]
    port: Option<u16>,

    /// First host port handed to workers.
    #[arg(long)]
    base_port: Option<u16>,

    /// Seconds between scaling cycles.
    #[arg(long)]
    interval: Option<u64>,

    /// GPU metrics source.
    #[arg(long, value_enum)]
    probe: Option<ProbeArg>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeArg {
    NvidiaSmi,
    Static,
}

impl From<ProbeArg> for ProbeKind {
    fn from(arg: ProbeArg) -> Self {
        match arg {
            ProbeArg::NvidiaSmi => ProbeKind::NvidiaSmi,
            ProbeArg::Static => ProbeKind::Static,
        }
    }
}

impl Cli {
    /// Load the config file (or defaults) and apply flag overrides.
    fn resolve_config(&self) -> anyhow::Result<FleetConfig> {
        let mut config = match &self.config {
            Some(path) => FleetConfig::from_file(path)?,
            None => FleetConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(base_port) = self.base_port {
            config.workers.base_port = base_port;
        }
        if let Some(interval) = self.interval {
            config.scaling.interval_secs = interval;
        }
        if let Some(probe) = self.probe {
            config.metrics.probe = probe.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,fleetd=debug,fleet=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = cli.resolve_config()?;
    daemon::run(config).await
}
