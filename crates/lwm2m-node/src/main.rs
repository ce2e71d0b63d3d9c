use std::path::PathBuf;

use clap::Parser;

use lwm2m_node::{NodeConfig, logging, run_simulation};

#[derive(Parser)]
#[command(
    name = "lwm2m-exchange-sim",
    about = "Simulate an LwM2M block-wise send over a lossy link"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bytes to send (overrides `simulation.payload_size`)
    #[arg(long)]
    payload_size: Option<usize>,

    /// Datagram loss probability per direction (overrides `simulation.loss_rate`)
    #[arg(long)]
    loss_rate: Option<f64>,

    /// RNG seed (overrides `simulation.seed`)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match NodeConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => NodeConfig::default(),
    };
    if let Some(size) = cli.payload_size {
        config.simulation.payload_size = size;
    }
    if let Some(rate) = cli.loss_rate {
        config.simulation.loss_rate = rate;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        logging::init_json(&config.logging.level);
    } else {
        logging::init(&config.logging.level);
    }

    match run_simulation(&config) {
        Ok(report) if report.succeeded() => {
            tracing::info!(
                elapsed_ms = report.elapsed.as_millis() as u64,
                sent = report.driver.sent,
                duplicates = report.peer.duplicates,
                "upload delivered"
            );
        }
        Ok(report) => {
            tracing::error!(result = ?report.result, delivered = report.delivered, "upload failed");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!("simulation failed: {e}");
            std::process::exit(1);
        }
    }
}
