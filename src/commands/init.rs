use std::fs;
use std::path::Path;

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::store::SiteStore;

/// Write a starter config next to `config_path` and create the target store
/// and uploads directory it names.
pub fn run(config_path: &Path, legacy_db: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(MigrateError::InvalidConfig(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )));
    }
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(config_path, MigrationConfig::starter(legacy_db).to_yaml()?)?;

    let config = MigrationConfig::load(config_path)?;
    SiteStore::open(&config.target.store)?;
    fs::create_dir_all(&config.target.uploads_dir)?;

    eprintln!(
        "Initialized {} (target store {})",
        config_path.display(),
        config.target.store.display()
    );
    Ok(())
}
