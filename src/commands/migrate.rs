use std::path::Path;

use crate::error::Result;
use crate::importer::Importer;
use crate::output::{self, Format};
use crate::store::{RunLock, SiteStore};

/// A single migration pass, or all of them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Attachments,
    Pages,
    Hierarchy,
    ContentUrls,
    Homepage,
    Menu,
    Events,
    Forms,
    All,
}

pub fn run(
    config_path: &Path,
    pass: Pass,
    menu: Option<&str>,
    report_path: Option<&Path>,
    format: Format,
) -> Result<()> {
    let config = super::load(config_path)?;
    let lock = RunLock::acquire(&config.lock_path())?;
    tracing::debug!(lock = %lock.path().display(), ?pass, "run lock acquired");

    let legacy = super::open_legacy(&config)?;
    let mut store = SiteStore::open(&config.target.store)?;
    let mut importer = Importer::new(&config, &legacy, &mut store);
    let result = match pass {
        Pass::Attachments => importer.import_attachments(),
        Pass::Pages => importer.import_pages(),
        Pass::Hierarchy => importer.reconcile_ancestry(),
        Pass::ContentUrls => importer.fix_content_urls(),
        Pass::Homepage => importer.promote_homepage(),
        Pass::Menu => importer.reconcile_menu(menu),
        Pass::Events => importer.import_events(),
        Pass::Forms => importer.import_forms(),
        Pass::All => importer.run_all(),
    };
    let report = importer.into_report();

    if let Some(path) = report_path {
        report.write_json(path)?;
    }
    output::print_summary(&report.summary(), format)?;
    lock.release()?;
    result
}
