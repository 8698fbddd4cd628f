use serde_json::Value;

use super::Importer;
use crate::error::Result;
use crate::legacy::process_title;
use crate::model::{Category, MigrationStamp, RecordKind, SourceTable, TargetRecord};
use crate::reconcile::identity::records_by_legacy_id;
use crate::reconcile::rewrite::HOME_SEGMENT;
use crate::reconcile::writer::{self, PublishPolicy};

/// Sort given to new pages so they land after anything authored by hand.
pub(super) const NEW_PAGE_SORT: i64 = 9_000_000;

/// Create or refresh one target page per legacy post of `post_type`.
///
/// Existing records keep their kind, parent, sort and a promoted `home`
/// segment. The body is only re-applied when the legacy body itself changed,
/// so link rewriting done by later passes survives a re-run.
pub(super) fn import_posts(imp: &mut Importer<'_>, post_type: &str) -> Result<()> {
    let posts = imp.legacy.posts(post_type)?;
    let mut existing = records_by_legacy_id(imp.store.list(Category::Page)?, SourceTable::Posts)?;
    tracing::debug!(post_type, legacy = posts.len(), migrated = existing.len(), "importing posts");

    for post in &posts {
        let (mut record, body_changed) = match existing.remove(&post.id) {
            Some(record) => {
                let previous = record.stamp.payload.get("post_content").and_then(Value::as_str);
                let changed = previous != Some(post.content());
                (record, changed)
            }
            None => {
                let record = TargetRecord {
                    parent_id: imp.config.target.root_parent_id,
                    sort: NEW_PAGE_SORT,
                    show_in_menus: false,
                    last_edited: Some(post.modified()?.to_string()),
                    ..TargetRecord::new(RecordKind::Page)
                };
                (record, true)
            }
        };

        record.title = process_title(post.title()?);
        if record.url_segment != HOME_SEGMENT {
            record.url_segment = post.slug()?.to_string();
        }
        record.created = Some(post.date()?.to_string());
        record.stamp = MigrationStamp::from_legacy(post);
        if body_changed {
            imp.content.set(&mut record, post.content());
        }

        let policy = PublishPolicy::IfLegacyPublished(post.is_published());
        writer::upsert(&mut *imp.store, &mut record, policy, &mut imp.report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::testing::{FailingTitle, config};
    use crate::legacy::WpDatabase;
    use crate::legacy::wpdb::fixtures::*;
    use crate::report::{DiagnosticKind, Outcome, PassStatus};
    use crate::store::{SiteStore, TargetStore};
    use tempfile::tempdir;

    fn page_by_legacy(store: &SiteStore, legacy_id: u64) -> TargetRecord {
        store
            .list(Category::Page)
            .unwrap()
            .into_iter()
            .find(|r| r.stamp.legacy_id == legacy_id)
            .unwrap()
    }

    #[test]
    fn new_pages_are_created_below_root_and_published_when_live() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.target.root_parent_id = 77;
        let db = WpDatabase::open_memory("wp").unwrap();
        insert_post(
            &db,
            &Post {
                content: "  <p>Hello</p>\r\n",
                ..Post::page(5, "Tom &amp; Jerry", "tom-jerry", 0)
            },
        );
        insert_post(
            &db,
            &Post {
                status: "draft",
                ..Post::page(6, "Draft", "draft", 0)
            },
        );
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_pages().unwrap();
        let report = importer.into_report();
        assert_eq!(report.count(Outcome::Created), 2);
        assert_eq!(report.count(Outcome::Published), 1);

        let page = page_by_legacy(&store, 5);
        assert_eq!(page.title, "Tom & Jerry");
        assert_eq!(page.url_segment, "tom-jerry");
        assert_eq!(page.parent_id, 77);
        assert_eq!(page.sort, NEW_PAGE_SORT);
        assert_eq!(page.content, "<p>Hello</p>");
        assert_eq!(page.last_edited.as_deref(), Some("2019-04-02 10:00:00"));
        assert!(store.is_published(page.id).unwrap());
        assert!(!store.is_published(page_by_legacy(&store, 6).id).unwrap());
    }

    #[test]
    fn reimport_keeps_local_state_and_rewritten_body() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let db = WpDatabase::open_memory("wp").unwrap();
        insert_post(
            &db,
            &Post {
                content: "<a href=\"http://old.test/x\">x</a>",
                ..Post::page(5, "About", "about", 0)
            },
        );
        let mut store = SiteStore::open_memory().unwrap();
        Importer::new(&config, &db, &mut store).import_pages().unwrap();

        let mut page = page_by_legacy(&store, 5);
        page.kind = RecordKind::UserForm;
        page.url_segment = HOME_SEGMENT.into();
        page.content = "<a href=\"[page-ref:9]\">x</a>".into();
        page.sort = 3;
        store.write(&mut page).unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_pages().unwrap();
        assert_eq!(importer.into_report().count(Outcome::NoChange), 1);
        let kept = page_by_legacy(&store, 5);
        assert_eq!(kept.kind, RecordKind::UserForm);
        assert_eq!(kept.url_segment, HOME_SEGMENT);
        assert_eq!(kept.sort, 3);
        assert_eq!(kept.content, "<a href=\"[page-ref:9]\">x</a>");

        insert_post(
            &db,
            &Post {
                content: "<p>Rewritten upstream</p>",
                ..Post::page(5, "About us", "about", 0)
            },
        );
        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_pages().unwrap();
        assert_eq!(importer.into_report().count(Outcome::Changed), 1);
        let changed = page_by_legacy(&store, 5);
        assert_eq!(changed.title, "About us");
        assert_eq!(changed.content, "<p>Rewritten upstream</p>");
    }

    #[test]
    fn failed_write_does_not_stop_the_pass() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let db = WpDatabase::open_memory("wp").unwrap();
        insert_post(&db, &Post::page(5, "Bad", "bad", 0));
        insert_post(&db, &Post::page(6, "Good", "good", 0));
        let mut store = FailingTitle {
            inner: SiteStore::open_memory().unwrap(),
            title: "Bad",
        };

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_pages().unwrap();
        let report = importer.into_report();
        assert_eq!(report.diagnostic_count(DiagnosticKind::WriteFailed), 1);
        assert_eq!(report.count(Outcome::Created), 1);
        assert_eq!(report.passes[0].status, PassStatus::Completed);

        let pages = store.list(Category::Page).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Good");
    }
}
