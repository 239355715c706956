use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

mod actions;
mod config;
mod engine;
mod models;
mod probe;
mod shelly;
mod store;
mod transition;

use crate::actions::Actions;
use crate::config::MonitorConfig;
use crate::engine::Monitor;
use crate::probe::PingProber;

#[derive(Parser, Debug)]
#[command(version, about = "Watch LAN/WAN gateway reachability and act on WAN state changes")]
struct Args {
    /// Monitor configuration (JSON)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single tick and exit, for cron or timer driven setups
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = MonitorConfig::load(&args.config)?;

    let prober = PingProber::new()?;
    let actions = Actions::from_config(&config)?;
    let monitor = Monitor::new(config, prober, actions);

    if args.once {
        let outcome = monitor.tick().await;
        info!(?outcome, "tick finished");
        return Ok(());
    }

    tokio::select! {
        _ = monitor.run() => {}
        res = signal::ctrl_c() => {
            res?;
            info!("Shutdown signal received. Closing WAN monitor...");
        }
    }

    Ok(())
}
