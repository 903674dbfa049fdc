mod app;
mod cli;
mod config;
mod console;
mod domain;
mod infrastructure;
mod tasks;
mod telegram;

use anyhow::Result;
use clap::Parser;
use infrastructure::{directories, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = cli::Args::parse();
    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = app::BotMonitorApp::initialize(config, shutdown).await?;
    app.run(args.command()).await
}
