//! Shared setup for commands that need a running service.
//!
//! Config resolution:
//! 1. `--config` flag if provided (must exist)
//! 2. Default config at `~/.local/share/pinrelay/config.toml`
//! 3. Built-in defaults with no remote providers

use pinrelay::config::{default_config_path, default_data_dir, PinrelayConfig};
use pinrelay::service::PinService;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

pub fn load_config(config_path: Option<&str>) -> Result<PinrelayConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        return Ok(PinrelayConfig::load(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        Ok(PinrelayConfig::load(&default_path)?)
    } else {
        Ok(PinrelayConfig::new(default_data_dir()))
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the configured level.
///
/// Returns `false` when a subscriber was already installed, which happens
/// when commands run in-process; the existing one is kept.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "keeping existing tracing subscriber");
            false
        }
    }
}

pub async fn open_service(config: &PinrelayConfig) -> Result<PinService, Box<dyn std::error::Error>> {
    Ok(PinService::from_config(config).await?)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
