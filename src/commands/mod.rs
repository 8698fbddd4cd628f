pub mod init;
pub mod menus;
pub mod migrate;
pub mod status;

use std::path::Path;

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::legacy::WpDatabase;

/// Open the legacy export named by `config`, read-only.
fn open_legacy(config: &MigrationConfig) -> Result<WpDatabase> {
    let path = &config.legacy.database;
    if !path.is_file() {
        return Err(MigrateError::InvalidConfig(format!(
            "legacy database '{}' does not exist",
            path.display()
        )));
    }
    WpDatabase::open(path, &config.legacy.table_prefix)
}

fn load(config_path: &Path) -> Result<MigrationConfig> {
    if !config_path.is_file() {
        return Err(MigrateError::InvalidConfig(format!(
            "config '{}' not found; run `wpgraft init` first",
            config_path.display()
        )));
    }
    MigrationConfig::load(config_path)
}
