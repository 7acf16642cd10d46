mod config;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use config::read_config;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "ARMOIRE_CONFIG", default_value = "armoire.toml")]
    /// Path to the main Armoire configuration file
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = read_config(args.config_file)?;
    tracing::info!(addr=%config.bind_addr, mounts=config.mounts.len(), "starting armoire");

    let (exit_tx, exit_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = exit_tx.send(true);
        }
    });

    let server = server::new(config)?;
    server.run(exit_rx).await
}
