use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MigrateError, Result};
use crate::model::{
    Category, ContentBlock, EventSchedule, FormField, GeoPoint, MigrationStamp, RecordKind,
    SourceTable, TargetRecord,
};

/// Persistence seam for the target tree. The migration only needs draft
/// writes, publish/unpublish and delete; versioning beyond that belongs to
/// the hosting system.
pub trait TargetStore {
    fn get(&self, id: u64) -> Result<Option<TargetRecord>>;

    fn list(&self, category: Category) -> Result<Vec<TargetRecord>>;

    /// Insert when `record.id == 0` (assigning the new id), otherwise replace the draft.
    fn write(&mut self, record: &mut TargetRecord) -> Result<()>;

    /// Copy the current draft to the live table.
    fn publish(&mut self, id: u64) -> Result<()>;

    fn unpublish(&mut self, id: u64) -> Result<()>;

    fn delete(&mut self, id: u64) -> Result<()>;

    fn is_published(&self, id: u64) -> Result<bool>;
}

/// Columns that do not warrant their own SQL column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordExtra {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cdn_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event: Option<EventSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geo: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    form_fields: Vec<FormField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    form_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub kind: String,
    pub total: u64,
    pub published: u64,
    pub migrated: u64,
}

/// SQLite-backed target tree with a draft table and a live table.
pub struct SiteStore {
    conn: Connection,
}

const RECORD_COLUMNS: &str = "id, kind, parent_id, sort, title, menu_title, url_segment, show_in_menus, content, filename, external_url, created, last_edited, legacy_table, legacy_id, legacy_parent_id, legacy_data, legacy_meta, last_write_by_migration, extra";

impl SiteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                parent_id INTEGER NOT NULL DEFAULT 0,
                sort INTEGER NOT NULL DEFAULT 0,
                title TEXT NOT NULL DEFAULT '',
                menu_title TEXT,
                url_segment TEXT NOT NULL DEFAULT '',
                show_in_menus INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL DEFAULT '',
                filename TEXT,
                external_url TEXT,
                created TEXT,
                last_edited TEXT,
                legacy_table TEXT,
                legacy_id INTEGER NOT NULL DEFAULT 0,
                legacy_parent_id INTEGER NOT NULL DEFAULT 0,
                legacy_data TEXT,
                legacy_meta TEXT,
                last_write_by_migration INTEGER NOT NULL DEFAULT 0,
                extra TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS live (
                id INTEGER PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
                snapshot TEXT NOT NULL,
                published_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
            CREATE INDEX IF NOT EXISTS idx_records_legacy ON records(legacy_table, legacy_id);
            CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent_id);",
        )?;
        Ok(())
    }

    /// Per-kind counts for status output.
    pub fn summary(&self) -> Result<Vec<KindSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.kind, COUNT(*),
                    SUM(CASE WHEN l.id IS NULL THEN 0 ELSE 1 END),
                    SUM(CASE WHEN r.legacy_id <> 0 THEN 1 ELSE 0 END)
             FROM records r LEFT JOIN live l ON l.id = r.id
             GROUP BY r.kind ORDER BY r.kind",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KindSummary {
                    kind: row.get(0)?,
                    total: row.get(1)?,
                    published: row.get(2)?,
                    migrated: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The published snapshot of a record, if any.
    pub fn live(&self, id: u64) -> Result<Option<TargetRecord>> {
        let snapshot: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM live WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        snapshot
            .map(|raw| serde_json::from_str(&raw).map_err(MigrateError::from))
            .transpose()
    }
}

fn encode_json(value: &Value) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn decode_json(raw: Option<String>) -> Value {
    raw.and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(Value::Null)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(TargetRecord, String)> {
    let kind: String = row.get(1)?;
    let legacy_table: Option<String> = row.get(13)?;
    let extra: String = row.get(19)?;
    let record = TargetRecord {
        id: row.get(0)?,
        kind: RecordKind::parse(&kind).unwrap_or_default(),
        parent_id: row.get(2)?,
        sort: row.get(3)?,
        title: row.get(4)?,
        menu_title: row.get(5)?,
        url_segment: row.get(6)?,
        show_in_menus: row.get(7)?,
        content: row.get(8)?,
        filename: row.get(9)?,
        external_url: row.get(10)?,
        created: row.get(11)?,
        last_edited: row.get(12)?,
        stamp: MigrationStamp {
            source_table: legacy_table.as_deref().and_then(SourceTable::parse),
            legacy_id: row.get(14)?,
            legacy_parent_id: row.get(15)?,
            payload: decode_json(row.get(16)?),
            meta_payload: decode_json(row.get(17)?),
            was_last_write_by_migration: row.get(18)?,
        },
        ..TargetRecord::default()
    };
    Ok((record, extra))
}

fn apply_extra(mut record: TargetRecord, raw: &str) -> Result<TargetRecord> {
    let extra: RecordExtra = serde_json::from_str(raw)?;
    record.blocks = extra.blocks;
    record.cdn_file = extra.cdn_file;
    record.event = extra.event;
    record.geo = extra.geo;
    record.form_fields = extra.form_fields;
    record.form_id = extra.form_id;
    Ok(record)
}

fn extra_of(record: &TargetRecord) -> Result<String> {
    let extra = RecordExtra {
        blocks: record.blocks.clone(),
        cdn_file: record.cdn_file.clone(),
        event: record.event.clone(),
        geo: record.geo.clone(),
        form_fields: record.form_fields.clone(),
        form_id: record.form_id,
    };
    Ok(serde_json::to_string(&extra)?)
}

impl TargetStore for SiteStore {
    fn get(&self, id: u64) -> Result<Option<TargetRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()?;
        row.map(|(record, extra)| apply_extra(record, &extra))
            .transpose()
    }

    fn list(&self, category: Category) -> Result<Vec<TargetRecord>> {
        let filter = match category {
            Category::File => "kind = 'file'",
            Category::Page => "kind <> 'file'",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE {filter} ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(record, extra)| apply_extra(record, &extra))
            .collect()
    }

    fn write(&mut self, record: &mut TargetRecord) -> Result<()> {
        let stamp = &record.stamp;
        let legacy_data = encode_json(&stamp.payload)?;
        let legacy_meta = encode_json(&stamp.meta_payload)?;
        let extra = extra_of(record)?;
        let now = Utc::now().to_rfc3339();
        let values = params![
            record.kind.as_str(),
            record.parent_id,
            record.sort,
            record.title,
            record.menu_title,
            record.url_segment,
            record.show_in_menus,
            record.content,
            record.filename,
            record.external_url,
            record.created,
            record.last_edited,
            stamp.source_table.map(SourceTable::as_str),
            stamp.legacy_id,
            stamp.legacy_parent_id,
            legacy_data,
            legacy_meta,
            stamp.was_last_write_by_migration,
            extra,
            now,
        ];

        if record.id == 0 {
            self.conn.execute(
                "INSERT INTO records (kind, parent_id, sort, title, menu_title, url_segment, show_in_menus, content, filename, external_url, created, last_edited, legacy_table, legacy_id, legacy_parent_id, legacy_data, legacy_meta, last_write_by_migration, extra, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                values,
            )?;
            record.id = self.conn.last_insert_rowid() as u64;
            return Ok(());
        }

        let updated = self.conn.execute(
            &format!(
                "UPDATE records SET kind = ?1, parent_id = ?2, sort = ?3, title = ?4, menu_title = ?5, url_segment = ?6, show_in_menus = ?7, content = ?8, filename = ?9, external_url = ?10, created = ?11, last_edited = ?12, legacy_table = ?13, legacy_id = ?14, legacy_parent_id = ?15, legacy_data = ?16, legacy_meta = ?17, last_write_by_migration = ?18, extra = ?19, updated_at = ?20
                 WHERE id = {}",
                record.id
            ),
            values,
        )?;
        if updated == 0 {
            return Err(MigrateError::RecordNotFound(record.id));
        }
        Ok(())
    }

    fn publish(&mut self, id: u64) -> Result<()> {
        let record = self.get(id)?.ok_or(MigrateError::RecordNotFound(id))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO live (id, snapshot, published_at) VALUES (?1, ?2, ?3)",
            params![id, serde_json::to_string(&record)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn unpublish(&mut self, id: u64) -> Result<()> {
        self.conn
            .execute("DELETE FROM live WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn delete(&mut self, id: u64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM live WHERE id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(MigrateError::RecordNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    fn is_published(&self, id: u64) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM live WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(title: &str) -> TargetRecord {
        TargetRecord {
            title: title.into(),
            url_segment: title.to_lowercase(),
            ..TargetRecord::new(RecordKind::Page)
        }
    }

    #[test]
    fn write_assigns_ids_and_round_trips_stamp() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut record = page("About");
        record.stamp = MigrationStamp {
            source_table: Some(SourceTable::Posts),
            legacy_id: 5,
            legacy_parent_id: 0,
            payload: json!({"ID": 5, "post_title": "About"}),
            meta_payload: Value::Null,
            was_last_write_by_migration: true,
        };
        record.event = Some(EventSchedule {
            all_day: true,
            ..EventSchedule::default()
        });
        store.write(&mut record).unwrap();
        assert_ne!(record.id, 0);

        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn list_splits_pages_from_files() {
        let mut store = SiteStore::open_memory().unwrap();
        store.write(&mut page("Home")).unwrap();
        let mut file = TargetRecord::new(RecordKind::File);
        file.filename = Some("assets/Uploads/2019/04/photo.jpg".into());
        store.write(&mut file).unwrap();

        assert_eq!(store.list(Category::Page).unwrap().len(), 1);
        let files = store.list(Category::File).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, file.filename);
    }

    #[test]
    fn publish_snapshots_current_draft() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut record = page("Team");
        store.write(&mut record).unwrap();
        assert!(!store.is_published(record.id).unwrap());

        store.publish(record.id).unwrap();
        record.title = "Our Team".into();
        store.write(&mut record).unwrap();

        assert!(store.is_published(record.id).unwrap());
        assert_eq!(store.live(record.id).unwrap().unwrap().title, "Team");

        store.unpublish(record.id).unwrap();
        assert!(!store.is_published(record.id).unwrap());
    }

    #[test]
    fn updating_or_deleting_missing_record_fails() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut ghost = page("Ghost");
        ghost.id = 99;
        assert!(matches!(
            store.write(&mut ghost),
            Err(MigrateError::RecordNotFound(99))
        ));
        assert!(store.delete(99).is_err());
        assert!(store.publish(99).is_err());
    }

    #[test]
    fn summary_counts_published_and_migrated() {
        let mut store = SiteStore::open_memory().unwrap();
        let mut migrated = page("About");
        migrated.stamp.legacy_id = 5;
        store.write(&mut migrated).unwrap();
        store.publish(migrated.id).unwrap();
        store.write(&mut page("Local")).unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(
            summary,
            vec![KindSummary {
                kind: "page".into(),
                total: 2,
                published: 1,
                migrated: 1,
            }]
        );
    }
}
