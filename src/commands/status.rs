use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::SiteStore;

pub fn run(config_path: &Path, format: Format) -> Result<()> {
    let config = super::load(config_path)?;
    let store = SiteStore::open(&config.target.store)?;
    output::print_store_summary(&store.summary()?, format)
}
