//! Command-line front end for CAEN TCP readers.
//!
//! Connects to a reader, sends any given commands, then prints the reader's
//! observations as JSON lines until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use caenlink_hal::{CaenTcpController, DEFAULT_HAL_NAME, HalError, HardwareAbstraction};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "caenlink")]
#[command(version)]
#[command(about = "Poll a CAEN RFID reader over TCP and print observations as JSON")]
struct Cli {
    /// Reader configuration file (TOML). Embedded defaults are used when
    /// omitted or missing.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller name reported in observations.
    #[arg(long, default_value = DEFAULT_HAL_NAME)]
    hal_name: String,

    /// Milliseconds between identify cycles.
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// Command line sent to the reader after connecting. Repeatable.
    #[arg(long = "command")]
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    run(cli).await
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

async fn run(cli: Cli) -> Result<()> {
    let mut controller = CaenTcpController::new(cli.hal_name, cli.config.as_deref())
        .context("failed to load reader configuration")?;
    controller
        .initialize()
        .await
        .context("failed to connect to reader")?;

    for command in &cli.commands {
        controller
            .send_command(command)
            .await
            .with_context(|| format!("failed to send command {command:?}"))?;
    }

    let read_points = controller.read_point_names();
    let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(1)));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                match controller.identify(&read_points).await {
                    Ok(observations) => {
                        for observation in observations {
                            println!("{}", serde_json::to_string(&observation)?);
                        }
                    }
                    Err(HalError::Disconnected { .. }) => {
                        warn!(state = %controller.state(), "Reader not connected, skipping cycle");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
