use pinrelay::config::{default_config_path, default_data_dir, PinrelayConfig};
use std::path::PathBuf;

/// Write a commented default configuration.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn execute(
    config_path: Option<String>,
    data_dir: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let data_dir = data_dir.map(PathBuf::from).unwrap_or_else(default_data_dir);

    if config_path.exists() && !force {
        return Err(format!(
            "config file already exists: {} (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    PinrelayConfig::create_default(&config_path, &data_dir)?;
    println!("Created: {}", config_path.display());
    println!("Data directory: {}", data_dir.display());
    println!();
    println!("Add a [cloud] or [companion] section to replicate content.");
    Ok(())
}
