use std::path::Path;

use crate::error::Result;
use crate::legacy::LegacySource;
use crate::output::{self, Format};

/// List the legacy navigation menus, to pick a slug for the menu pass.
pub fn run(config_path: &Path, format: Format) -> Result<()> {
    let config = super::load(config_path)?;
    let legacy = super::open_legacy(&config)?;
    output::print_menus(&legacy.nav_menus()?, format)
}
