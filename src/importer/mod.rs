//! Ordered migration passes over one legacy dataset and one target store.
//!
//! Each pass can run alone; [`Importer::run_all`] runs them in dependency
//! order. Structural failures come back as `Err`, everything per-record goes
//! to the [`BatchReport`].

mod attachments;
mod events;
mod forms;
mod homepage;
mod pages;
mod urls;

use std::collections::HashSet;

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::legacy::LegacySource;
use crate::reconcile::content::{self, ContentStrategy};
use crate::reconcile::hierarchy::{self, MenuForest};
use crate::report::{BatchReport, DiagnosticKind, Subject};
use crate::store::TargetStore;

pub use forms::map_fields;

pub const PASS_ATTACHMENTS: &str = "attachments";
pub const PASS_PAGES: &str = "pages";
pub const PASS_HIERARCHY: &str = "hierarchy";
pub const PASS_CONTENT_URLS: &str = "content_urls";
pub const PASS_HOMEPAGE: &str = "homepage";
pub const PASS_MENU: &str = "menu";
pub const PASS_EVENTS: &str = "events";
pub const PASS_FORMS: &str = "forms";

pub struct Importer<'a> {
    config: &'a MigrationConfig,
    legacy: &'a dyn LegacySource,
    store: &'a mut dyn TargetStore,
    content: Box<dyn ContentStrategy>,
    report: BatchReport,
}

impl<'a> Importer<'a> {
    pub fn new(
        config: &'a MigrationConfig,
        legacy: &'a dyn LegacySource,
        store: &'a mut dyn TargetStore,
    ) -> Self {
        Self {
            config,
            legacy,
            store,
            content: content::for_mode(config.target.content_mode),
            report: BatchReport::new(),
        }
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    pub fn into_report(mut self) -> BatchReport {
        self.report.finish();
        self.report
    }

    fn run_pass(&mut self, name: &str, pass: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        self.report.pass_start(name);
        let result = pass(self);
        self.report.pass_end(name, result.as_ref().err());
        result
    }

    /// Register copied upload files that a legacy attachment row points at.
    pub fn import_attachments(&mut self) -> Result<()> {
        self.run_pass(PASS_ATTACHMENTS, attachments::run)
    }

    pub fn import_pages(&mut self) -> Result<()> {
        self.run_pass(PASS_PAGES, |imp| pages::import_posts(imp, "page"))
    }

    /// Pages the configured menu positions are skipped; the menu pass owns them.
    pub fn reconcile_ancestry(&mut self) -> Result<()> {
        self.run_pass(PASS_HIERARCHY, |imp| {
            let placed = match imp.config.navigation_menu.as_deref() {
                Some(slug) => {
                    let forest = MenuForest::build(imp.legacy.nav_menu_items(slug)?)?;
                    hierarchy::menu_placements(&*imp.store, &forest)?
                }
                None => HashSet::new(),
            };
            hierarchy::reconcile_ancestry(
                &mut *imp.store,
                imp.config.target.root_parent_id,
                &placed,
                &mut imp.report,
            )
        })
    }

    pub fn fix_content_urls(&mut self) -> Result<()> {
        self.run_pass(PASS_CONTENT_URLS, urls::run)
    }

    pub fn promote_homepage(&mut self) -> Result<()> {
        self.run_pass(PASS_HOMEPAGE, homepage::run)
    }

    /// Follow the named navigation menu, falling back to the configured one.
    pub fn reconcile_menu(&mut self, slug: Option<&str>) -> Result<()> {
        let slug = slug
            .or(self.config.navigation_menu.as_deref())
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        self.run_pass(PASS_MENU, |imp| {
            if slug.is_empty() {
                let menus = imp
                    .legacy
                    .nav_menus()?
                    .into_iter()
                    .map(|m| format!("{} (slug: {})", m.name, m.slug))
                    .collect::<Vec<_>>();
                return Err(MigrateError::MenuSlugRequired(menus.join(", ")));
            }
            let items = imp.legacy.nav_menu_items(&slug)?;
            if items.is_empty() {
                return Err(MigrateError::UnknownMenu(slug.clone()));
            }
            let forest = MenuForest::build(items)?;
            tracing::debug!(menu = %slug, items = forest.len(), "menu forest built");
            hierarchy::reconcile_menu(
                &mut *imp.store,
                &forest,
                imp.config.target.root_parent_id,
                &mut imp.report,
            )
        })
    }

    pub fn import_events(&mut self) -> Result<()> {
        self.run_pass(PASS_EVENTS, events::run)
    }

    pub fn import_forms(&mut self) -> Result<()> {
        self.run_pass(PASS_FORMS, forms::run)
    }

    /// Secondary imports never stop the batch; a failure becomes a report entry.
    fn run_secondary(&mut self, name: &str, pass: fn(&mut Self) -> Result<()>) {
        match pass(self) {
            Ok(()) => {}
            Err(err @ MigrateError::PrerequisiteMissing(_)) => self.report.notice(
                DiagnosticKind::SecondaryImportFailed,
                Subject::none(),
                format!("skipped {name}: {err}"),
            ),
            Err(err) => self.report.error(
                DiagnosticKind::SecondaryImportFailed,
                Subject::none(),
                format!("{name} import failed: {err}"),
            ),
        }
    }

    pub fn run_all(&mut self) -> Result<()> {
        self.import_attachments()?;
        self.import_pages()?;
        self.reconcile_ancestry()?;
        self.fix_content_urls()?;
        self.promote_homepage()?;
        if self.config.navigation_menu.is_some() {
            self.reconcile_menu(None)?;
        }
        self.run_secondary(PASS_EVENTS, Self::import_events);
        self.run_secondary(PASS_FORMS, Self::import_forms);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::config;
    use super::*;
    use crate::legacy::WpDatabase;
    use crate::legacy::wpdb::fixtures::*;
    use crate::model::{Category, RecordKind};
    use crate::report::{Outcome, PassStatus};
    use crate::store::SiteStore;
    use tempfile::tempdir;

    #[test]
    fn run_all_records_every_pass_and_converges() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let db = WpDatabase::open_memory("wp").unwrap();
        set_option(&db, "siteurl", "http://old.test");
        insert_post(&db, &Post::page(5, "About", "about", 0));
        insert_post(&db, &Post::page(6, "Team", "team", 5));
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.run_all().unwrap();
        let names: Vec<&str> = importer.report().passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["attachments", "pages", "hierarchy", "content_urls", "homepage", "events", "forms"]
        );
        assert!(
            importer
                .report()
                .passes
                .iter()
                .filter(|p| p.name != "events" && p.name != "forms")
                .all(|p| p.status == PassStatus::Completed)
        );
        // Both secondary features are off in the starter config.
        assert_eq!(
            importer.report().diagnostic_count(DiagnosticKind::SecondaryImportFailed),
            2
        );
        let report = importer.into_report();
        assert!(report.finished_at.is_some());
        assert_eq!(report.count(Outcome::Created), 2);

        let pages = store.list(Category::Page).unwrap();
        let about = pages.iter().find(|p| p.title == "About").unwrap();
        let team = pages.iter().find(|p| p.title == "Team").unwrap();
        assert_eq!(team.parent_id, about.id);
        assert_eq!(about.kind, RecordKind::Page);

        let mut again = Importer::new(&config, &db, &mut store);
        again.run_all().unwrap();
        let report = again.into_report();
        assert_eq!(report.count(Outcome::Created), 0);
        assert_eq!(report.count(Outcome::Changed), 0);
    }

    #[test]
    fn menu_pass_requires_a_slug() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let db = WpDatabase::open_memory("wp").unwrap();
        add_menu(&db, 3, "main-menu", &[]);
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        let err = importer.reconcile_menu(None).unwrap_err();
        assert_eq!(err.code(), "menu_slug_required");
        assert!(err.to_string().contains("main-menu (slug: main-menu)"));

        let err = importer.reconcile_menu(Some("main-menu")).unwrap_err();
        assert_eq!(err.code(), "unknown_menu");
        assert_eq!(importer.report().passes[1].status, PassStatus::Failed);
    }
}
