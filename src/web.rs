#![cfg(not(tarpaulin_include))]

use dekanat::app;
use dekanat::config::Config;

/// Main entry point for the console server
///
/// Reads the configuration from the environment and serves the console
/// until the process is stopped. Set `RUST_LOG` to control log output.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();
    app::run(config).await
}
