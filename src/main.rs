use clap::Parser;
use tracing_subscriber::EnvFilter;

use spike_teleop::config::{Cli, Config};

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    let config = match Config::load(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = spike_teleop::runtime::run(config) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
