use crate::error::Result;
use crate::model::{MigrationStamp, TargetRecord};
use crate::report::{BatchReport, DiagnosticKind, Outcome};
use crate::store::TargetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPolicy {
    Always,
    /// Publish when the legacy row was live, or the record already is.
    IfLegacyPublished(bool),
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Changed(Vec<&'static str>),
    Unchanged,
    /// The write was attempted and failed; already reported.
    Failed,
}

fn same_stamp(old: &MigrationStamp, new: &MigrationStamp) -> bool {
    old.source_table == new.source_table
        && old.legacy_id == new.legacy_id
        && old.legacy_parent_id == new.legacy_parent_id
        && old.payload == new.payload
        && old.meta_payload == new.meta_payload
}

/// Persisted fields that differ between `old` and `new`. Geo coordinates are
/// passive and never count as a change on their own.
pub fn changed_fields(old: &TargetRecord, new: &TargetRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();
    let mut check = |name: &'static str, differs: bool| {
        if differs {
            changed.push(name);
        }
    };
    check("kind", old.kind != new.kind);
    check("parent_id", old.parent_id != new.parent_id);
    check("sort", old.sort != new.sort);
    check("title", old.title != new.title);
    check("menu_title", old.menu_title != new.menu_title);
    check("url_segment", old.url_segment != new.url_segment);
    check("show_in_menus", old.show_in_menus != new.show_in_menus);
    check("content", old.content != new.content);
    check("blocks", old.blocks != new.blocks);
    check("filename", old.filename != new.filename);
    check("cdn_file", old.cdn_file != new.cdn_file);
    check("external_url", old.external_url != new.external_url);
    check("created", old.created != new.created);
    check("last_edited", old.last_edited != new.last_edited);
    check("event", old.event != new.event);
    check("form_fields", old.form_fields != new.form_fields);
    check("form_id", old.form_id != new.form_id);
    check("stamp", !same_stamp(&old.stamp, &new.stamp));
    changed
}

fn write_if_changed(
    store: &mut dyn TargetStore,
    record: &mut TargetRecord,
    policy: PublishPolicy,
    report: &mut BatchReport,
) -> Result<WriteOutcome> {
    let existing = if record.exists() {
        store.get(record.id)?
    } else {
        None
    };
    let was_published = match &existing {
        Some(old) => store.is_published(old.id)?,
        None => false,
    };

    let outcome = match &existing {
        Some(old) => {
            let fields = changed_fields(old, record);
            if fields.is_empty() {
                report.record(Outcome::NoChange, &*record, record.label());
                return Ok(WriteOutcome::Unchanged);
            }
            WriteOutcome::Changed(fields)
        }
        None => WriteOutcome::Created,
    };

    record.stamp.was_last_write_by_migration = true;
    store.write(record)?;
    match &outcome {
        WriteOutcome::Changed(fields) => report.record(
            Outcome::Changed,
            &*record,
            format!("{} ({})", record.label(), fields.join(", ")),
        ),
        _ => report.record(Outcome::Created, &*record, record.label()),
    }

    let publish = match policy {
        PublishPolicy::Always => true,
        PublishPolicy::IfLegacyPublished(live) => live || was_published,
        PublishPolicy::Never => false,
    };
    if publish {
        match store.publish(record.id) {
            Ok(()) => report.record(Outcome::Published, &*record, record.label()),
            Err(err) => report.error(
                DiagnosticKind::PublishFailed,
                &*record,
                format!("unable to publish {}: {err}", record.label()),
            ),
        }
    }
    Ok(outcome)
}

/// Write `record` only when it differs from what is stored, then publish per
/// `policy`. A failed write is reported and returned as `Err`.
pub fn try_upsert(
    store: &mut dyn TargetStore,
    record: &mut TargetRecord,
    policy: PublishPolicy,
    report: &mut BatchReport,
) -> Result<WriteOutcome> {
    write_if_changed(store, record, policy, report).inspect_err(|err| {
        report.error(
            DiagnosticKind::WriteFailed,
            &*record,
            format!("unable to write {}: {err}", record.label()),
        );
    })
}

/// As [`try_upsert`], for passes that continue past a failed record.
pub fn upsert(
    store: &mut dyn TargetStore,
    record: &mut TargetRecord,
    policy: PublishPolicy,
    report: &mut BatchReport,
) -> WriteOutcome {
    try_upsert(store, record, policy, report).unwrap_or(WriteOutcome::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::model::{Category, GeoPoint, RecordKind, SourceTable};
    use crate::store::SiteStore;
    use serde_json::json;

    fn legacy_page(legacy_id: u64, title: &str) -> TargetRecord {
        TargetRecord {
            title: title.into(),
            url_segment: title.to_lowercase(),
            stamp: MigrationStamp {
                source_table: Some(SourceTable::Posts),
                legacy_id,
                payload: json!({"ID": legacy_id, "post_title": title}),
                ..MigrationStamp::default()
            },
            ..TargetRecord::new(RecordKind::Page)
        }
    }

    #[test]
    fn identical_values_are_not_written() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut report = BatchReport::new();
        let mut record = legacy_page(5, "About");
        assert_eq!(
            upsert(&mut store, &mut record, PublishPolicy::Never, &mut report),
            WriteOutcome::Created
        );
        assert!(record.stamp.was_last_write_by_migration);

        let mut again = store.get(record.id).unwrap().unwrap();
        again.stamp.payload = json!({"post_title": "About", "ID": 5});
        assert_eq!(
            upsert(&mut store, &mut again, PublishPolicy::Always, &mut report),
            WriteOutcome::Unchanged
        );
        assert_eq!(report.count(Outcome::NoChange), 1);
        assert_eq!(report.count(Outcome::Published), 0);
    }

    #[test]
    fn field_diff_names_changes_and_ignores_geo() {
        let old = legacy_page(5, "About");
        let mut new = old.clone();
        new.geo = Some(GeoPoint {
            lat: "-33.86".into(),
            lng: "151.2".into(),
        });
        new.stamp.was_last_write_by_migration = true;
        assert!(changed_fields(&old, &new).is_empty());

        new.sort = 3;
        new.stamp.payload = json!({"ID": 5, "post_title": "About us"});
        assert_eq!(changed_fields(&old, &new), vec!["sort", "stamp"]);
    }

    #[test]
    fn publish_follows_policy_and_existing_state() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut report = BatchReport::new();
        let mut record = legacy_page(5, "About");

        upsert(&mut store, &mut record, PublishPolicy::IfLegacyPublished(false), &mut report);
        assert!(!store.is_published(record.id).unwrap());

        store.publish(record.id).unwrap();
        record.title = "About us".into();
        let outcome = upsert(&mut store, &mut record, PublishPolicy::IfLegacyPublished(false), &mut report);
        assert_eq!(outcome, WriteOutcome::Changed(vec!["title"]));
        assert_eq!(store.live(record.id).unwrap().unwrap().title, "About us");
    }

    /// Store whose publish step always fails.
    struct NoPublish(SiteStore);

    impl TargetStore for NoPublish {
        fn get(&self, id: u64) -> Result<Option<TargetRecord>> {
            self.0.get(id)
        }
        fn list(&self, category: Category) -> Result<Vec<TargetRecord>> {
            self.0.list(category)
        }
        fn write(&mut self, record: &mut TargetRecord) -> Result<()> {
            self.0.write(record)
        }
        fn publish(&mut self, id: u64) -> Result<()> {
            Err(MigrateError::RecordNotFound(id))
        }
        fn unpublish(&mut self, id: u64) -> Result<()> {
            self.0.unpublish(id)
        }
        fn delete(&mut self, id: u64) -> Result<()> {
            self.0.delete(id)
        }
        fn is_published(&self, id: u64) -> Result<bool> {
            self.0.is_published(id)
        }
    }

    #[test]
    fn publish_failure_keeps_the_write() {
        let mut store = NoPublish(SiteStore::open_memory().unwrap());
        let mut report = BatchReport::new();
        let mut record = legacy_page(5, "About");

        let outcome = upsert(&mut store, &mut record, PublishPolicy::Always, &mut report);
        assert_eq!(outcome, WriteOutcome::Created);
        assert!(store.get(record.id).unwrap().is_some());
        assert_eq!(report.diagnostic_count(DiagnosticKind::PublishFailed), 1);
    }

    #[test]
    fn failed_write_is_reported_once() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut report = BatchReport::new();
        let mut record = legacy_page(5, "Ghost");
        record.id = 404;

        let err = try_upsert(&mut store, &mut record, PublishPolicy::Never, &mut report).unwrap_err();
        assert_eq!(err.code(), "record_not_found");
        assert_eq!(report.diagnostic_count(DiagnosticKind::WriteFailed), 1);
        assert_eq!(report.count(Outcome::Error), 1);

        let outcome = upsert(&mut store, &mut record, PublishPolicy::Never, &mut report);
        assert_eq!(outcome, WriteOutcome::Failed);
        assert_eq!(report.diagnostic_count(DiagnosticKind::WriteFailed), 2);
    }
}
