use super::config::{default_config_path, default_data_dir, StagingConfig};
use std::path::PathBuf;

/// Write a default configuration file
pub fn execute(
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let config_path = config_path.unwrap_or_else(|| data_dir.join("config.toml"));

    if config_path.exists() && !force {
        return Err(format!(
            "Config file already exists: {} (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    StagingConfig::create_default(&config_path, &data_dir)?;

    println!("✅ Wrote configuration to {}", config_path.display());
    println!("   Database:    {}", data_dir.join("staging.db").display());
    println!("   Staging dir: {}", data_dir.join("staged").display());
    if config_path != default_config_path() {
        println!();
        println!("Pass --config {} to other commands.", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        execute(
            Some(config_path.clone()),
            Some(temp_dir.path().to_path_buf()),
            false,
        )
        .unwrap();

        let config = StagingConfig::load(&config_path).unwrap();
        assert_eq!(config.store.path, temp_dir.path().join("staging.db"));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "# operator edits").unwrap();

        let result = execute(
            Some(config_path.clone()),
            Some(temp_dir.path().to_path_buf()),
            false,
        );
        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            "# operator edits"
        );

        execute(Some(config_path.clone()), Some(temp_dir.path().to_path_buf()), true).unwrap();
        assert!(StagingConfig::load(&config_path).is_ok());
    }
}
