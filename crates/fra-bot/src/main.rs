//! Entry point: load configuration, wire the engine, run until shutdown.

use clap::Parser;
use fra_bot::{AppConfig, AppResult};

/// Cross-exchange funding-rate arbitrage engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via FRA_CONFIG env var).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = Args::parse();

    fra_ws::init_crypto();
    fra_telemetry::init_logging()?;

    if let Some(path) = &args.config {
        std::env::set_var("FRA_CONFIG", path);
    }
    let config = AppConfig::load()?;

    let app = fra_bot::build(config)?;
    app.run_preflight().await?;
    app.run().await?;

    Ok(())
}
