// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::Parser;
use dd_worker_supervisor::config::{self, SupervisorConfig};
use dd_worker_supervisor::console::{self, ConsoleExit};
use dd_worker_supervisor::params::ParamRegistry;
use dd_worker_supervisor::{ShutdownCoordinator, ShutdownSignals, Supervisor};
use log::{error, info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::BufReader;

const LOG_COMPONENT: &str = "WORKERSUPERVISOR";

#[derive(Parser, Debug)]
#[command(name = "dd-worker-supervisor", version, about = "Supervises a single worker process")]
struct Cli {
    /// Configuration file (defaults to $DD_WS_CONFIG, then the packaged location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `log_level` from the configuration file.
    #[arg(long)]
    log_level: Option<String>,

    /// Do not read operator commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn init_logging(cli: &Cli, cfg: &SupervisorConfig) -> Result<()> {
    let level = match &cli.log_level {
        Some(raw) => log::Level::from_str(raw).with_context(|| format!("invalid --log-level `{raw}`"))?,
        None => cfg.log_level()?,
    };
    match &cfg.log_file {
        Some(path) => dd_agent_log::init_with_file(LOG_COMPONENT, level, path)
            .with_context(|| format!("opening log file {}", path.display()))?,
        None => dd_agent_log::init(LOG_COMPONENT, level).context("installing logger")?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config::config_path(cli.config.clone());
    let loaded = config::load(&path)?;
    let found = loaded.is_some();
    let cfg = loaded.unwrap_or_default();

    init_logging(&cli, &cfg)?;
    info!(
        "dd-worker-supervisor starting (version {})",
        env!("CARGO_PKG_VERSION")
    );
    if found {
        info!("loaded configuration from {}", path.display());
    } else {
        warn!(
            "configuration file {} does not exist, using defaults",
            path.display()
        );
    }

    let mut signals = ShutdownSignals::install().context("installing signal handlers")?;
    let supervisor = Arc::new(Supervisor::with_environment(
        cfg.configuration()?,
        cfg.launch_environment()?,
    ));
    let coordinator = ShutdownCoordinator::new(Arc::clone(&supervisor));
    let registry = ParamRegistry::new(Arc::clone(&supervisor));

    if cfg.auto_start {
        if let Err(e) = supervisor.start() {
            error!("initial start failed: {e}");
        }
    } else {
        info!("auto_start disabled, waiting for a start request");
    }

    let console = console::run(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &registry,
    );
    tokio::pin!(console);
    let mut console_open = !cli.no_console;

    loop {
        tokio::select! {
            name = signals.recv() => {
                info!("received {name}");
                break;
            }
            result = &mut console, if console_open => {
                console_open = false;
                match result {
                    Ok(ConsoleExit::Quit) => {
                        info!("quit requested from console");
                        break;
                    }
                    Ok(ConsoleExit::Eof) => info!("console input closed"),
                    Err(e) => warn!("console failed: {e}"),
                }
            }
        }
    }

    coordinator.shutdown().await;
    info!("dd-worker-supervisor shutting down");
    log::logger().flush();
    // A blocked stdin read cannot be cancelled and would hold up runtime shutdown.
    std::process::exit(0)
}
