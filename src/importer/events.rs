use chrono::DateTime;

use super::Importer;
use super::pages::import_posts;
use crate::error::{MigrateError, Result};
use crate::model::{
    Category, EventSchedule, GeoPoint, LegacyRecord, MigrationStamp, RecordKind, SourceTable,
    TargetRecord,
};
use crate::reconcile::identity::records_by_legacy_id;
use crate::reconcile::writer::{self, PublishPolicy};
use crate::report::DiagnosticKind;

pub const EVENT_POST_TYPE: &str = "ajde_events";
pub const HOLDER_TITLE: &str = "Imported Events";
pub const HOLDER_SEGMENT: &str = "events";

fn meta_text<'a>(post: &'a LegacyRecord, key: &str) -> Option<&'a str> {
    post.meta_str(key).map(str::trim).filter(|v| !v.is_empty())
}

/// `(Y-m-d, H:i:s)` in UTC for a unix timestamp.
fn split_timestamp(seconds: u64) -> Option<(String, String)> {
    let at = DateTime::from_timestamp(i64::try_from(seconds).ok()?, 0)?;
    Some((
        at.format("%Y-%m-%d").to_string(),
        at.format("%H:%M:%S").to_string(),
    ))
}

/// Schedule from the event's `evcal_*` meta. Start and end must both be set.
pub(crate) fn schedule(post: &LegacyRecord, previous: Option<&EventSchedule>) -> Option<EventSchedule> {
    let mut schedule = previous.cloned().unwrap_or_default();
    let start = post.meta_u64("evcal_srow").filter(|t| *t != 0);
    let end = post.meta_u64("evcal_erow").filter(|t| *t != 0);
    if let (Some((start_date, start_time)), Some((end_date, end_time))) =
        (start.and_then(split_timestamp), end.and_then(split_timestamp))
    {
        schedule.all_day = post.meta_str("evcal_allday") == Some("yes");
        schedule.start_date = Some(start_date);
        schedule.start_time = Some(start_time);
        schedule.end_date = Some(end_date);
        schedule.end_time = Some(end_time);
    }
    if let Some(address) = post.meta_str("evcal_location") {
        schedule.address = Some(address.to_string());
    }
    (schedule != EventSchedule::default()).then_some(schedule)
}

fn holder(imp: &mut Importer<'_>) -> Result<u64> {
    let existing = imp
        .store
        .list(Category::Page)?
        .into_iter()
        .find(|r| r.kind == RecordKind::Calendar && r.stamp.is_marker());
    if let Some(holder) = existing {
        return Ok(holder.id);
    }
    let mut holder = TargetRecord {
        title: HOLDER_TITLE.to_string(),
        url_segment: HOLDER_SEGMENT.to_string(),
        parent_id: imp.config.target.root_parent_id,
        stamp: MigrationStamp::marker(),
        ..TargetRecord::new(RecordKind::Calendar)
    };
    writer::try_upsert(&mut *imp.store, &mut holder, PublishPolicy::Always, &mut imp.report)?;
    Ok(holder.id)
}

/// Event posts are imported as pages first, then turned into calendar events
/// under a shared holder when the calendar feature is enabled.
pub(super) fn run(imp: &mut Importer<'_>) -> Result<()> {
    import_posts(imp, EVENT_POST_TYPE)?;
    if !imp.config.features.events {
        return Err(MigrateError::PrerequisiteMissing(
            "calendar events are disabled (features.events)".into(),
        ));
    }

    let holder_id = holder(imp)?;
    let mut existing = records_by_legacy_id(imp.store.list(Category::Page)?, SourceTable::Posts)?;
    for post in imp.legacy.posts(EVENT_POST_TYPE)? {
        let Some(mut record) = existing.remove(&post.id) else {
            imp.report.error(
                DiagnosticKind::MissingLegacyRecord,
                &post,
                format!("unable to find a migrated page for event #{}", post.id),
            );
            continue;
        };
        record.kind = RecordKind::CalendarEvent;
        record.parent_id = holder_id;
        record.event = schedule(&post, record.event.as_ref());
        if let (Some(lat), Some(lng)) = (meta_text(&post, "evcal_lat"), meta_text(&post, "evcal_lng")) {
            record.geo = Some(GeoPoint {
                lat: lat.to_string(),
                lng: lng.to_string(),
            });
        }
        let policy = PublishPolicy::IfLegacyPublished(post.is_published());
        writer::upsert(&mut *imp.store, &mut record, policy, &mut imp.report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::testing::config;
    use crate::legacy::WpDatabase;
    use crate::legacy::wpdb::fixtures::*;
    use crate::report::Outcome;
    use crate::store::{SiteStore, TargetStore};
    use tempfile::tempdir;

    fn event(db: &WpDatabase, id: u64, title: &str) {
        insert_post(
            db,
            &Post {
                post_type: EVENT_POST_TYPE,
                ..Post::page(id, title, title, 0)
            },
        );
    }

    #[test]
    fn timestamps_split_in_utc() {
        assert_eq!(
            split_timestamp(1_556_712_000),
            Some(("2019-05-01".to_string(), "12:00:00".to_string()))
        );
    }

    #[test]
    fn disabled_feature_still_imports_event_pages() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let db = WpDatabase::open_memory("wp").unwrap();
        event(&db, 30, "fete");
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        let err = importer.import_events().unwrap_err();
        assert_eq!(err.code(), "prerequisite_missing");
        drop(importer);
        let pages = store.list(Category::Page).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].kind, RecordKind::Page);
    }

    #[test]
    fn events_move_under_one_holder() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.features.events = true;
        let db = WpDatabase::open_memory("wp").unwrap();
        event(&db, 30, "fete");
        insert_meta(&db, 30, "evcal_srow", "1556712000");
        insert_meta(&db, 30, "evcal_erow", "1556719200");
        insert_meta(&db, 30, "evcal_allday", "no");
        insert_meta(&db, 30, "evcal_location", "Town Hall");
        insert_meta(&db, 30, "evcal_lat", "-33.86");
        insert_meta(&db, 30, "evcal_lng", "151.21");
        event(&db, 31, "market");
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_events().unwrap();
        drop(importer);

        let pages = store.list(Category::Page).unwrap();
        let holder = pages.iter().find(|p| p.kind == RecordKind::Calendar).unwrap();
        assert_eq!(holder.url_segment, HOLDER_SEGMENT);
        assert!(holder.stamp.is_marker());
        let fete = pages.iter().find(|p| p.stamp.legacy_id == 30).unwrap();
        assert_eq!(fete.kind, RecordKind::CalendarEvent);
        assert_eq!(fete.parent_id, holder.id);
        let schedule = fete.event.as_ref().unwrap();
        assert!(!schedule.all_day);
        assert_eq!(schedule.start_time.as_deref(), Some("12:00:00"));
        assert_eq!(schedule.end_time.as_deref(), Some("14:00:00"));
        assert_eq!(schedule.address.as_deref(), Some("Town Hall"));
        assert_eq!(fete.geo.as_ref().map(|g| g.lat.as_str()), Some("-33.86"));
        let market = pages.iter().find(|p| p.stamp.legacy_id == 31).unwrap();
        assert_eq!(market.kind, RecordKind::CalendarEvent);
        assert_eq!(market.event, None);

        let mut again = Importer::new(&config, &db, &mut store);
        again.import_events().unwrap();
        let report = again.into_report();
        assert_eq!(report.count(Outcome::Created), 0);
        assert_eq!(report.count(Outcome::Changed), 0);
        assert_eq!(
            store.list(Category::Page).unwrap().iter().filter(|p| p.kind == RecordKind::Calendar).count(),
            1
        );
    }
}
