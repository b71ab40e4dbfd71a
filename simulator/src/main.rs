mod args;
mod driver;
mod logging;
mod model;
mod oracle;
mod scheduler;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::Level;

use crate::args::{Args, SimConfig};
use crate::logging::LogWriter;

fn main() {
    let config = SimConfig::from_args(Args::parse());
    let writer = match LogWriter::new(config.log.clone()) {
        Ok(writer) => writer,
        Err(err) => {
            eprintln!("failed to open log file: {err}");
            std::process::exit(1);
        }
    };

    let level = if config.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_target(false)
        .with_max_level(level)
        .init();

    match serde_json::to_string(&config) {
        Ok(json) => tracing::info!(config = %json, "starting"),
        Err(err) => tracing::warn!(error = %err, "config not serializable"),
    }

    let seed = config.seed;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    if let Err(reason) = driver::run(config, &mut rng) {
        tracing::error!(seed, "simulation failed: {reason}");
        std::process::exit(1);
    }
}
