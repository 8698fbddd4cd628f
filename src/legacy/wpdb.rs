use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use serde_json::{Map, Number, Value};

use crate::error::Result;
use crate::legacy::phpser::decode_meta_value;
use crate::legacy::{LegacySource, NavMenu};
use crate::model::{LegacyRecord, SourceTable};

/// A WordPress database exported to SQLite.
pub struct WpDatabase {
    conn: Connection,
    prefix: String,
}

impl WpDatabase {
    /// Open an existing export read-only.
    pub fn open(path: &Path, prefix: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Create (or open read-write) a database with the WordPress tables in place.
    pub fn create(path: &Path, prefix: &str) -> Result<Self> {
        let db = Self {
            conn: Connection::open(path)?,
            prefix: prefix.to_string(),
        };
        db.create_schema()?;
        Ok(db)
    }

    pub fn open_memory(prefix: &str) -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            prefix: prefix.to_string(),
        };
        db.create_schema()?;
        Ok(db)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }

    /// The subset of the WordPress schema the migration reads.
    pub fn create_schema(&self) -> Result<()> {
        let p = &self.prefix;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_posts (
                ID INTEGER PRIMARY KEY,
                post_author INTEGER NOT NULL DEFAULT 0,
                post_date TEXT NOT NULL DEFAULT '0000-00-00 00:00:00',
                post_content TEXT NOT NULL DEFAULT '',
                post_title TEXT NOT NULL DEFAULT '',
                post_excerpt TEXT NOT NULL DEFAULT '',
                post_status TEXT NOT NULL DEFAULT 'publish',
                post_name TEXT NOT NULL DEFAULT '',
                post_modified TEXT NOT NULL DEFAULT '0000-00-00 00:00:00',
                post_parent INTEGER NOT NULL DEFAULT 0,
                guid TEXT NOT NULL DEFAULT '',
                menu_order INTEGER NOT NULL DEFAULT 0,
                post_type TEXT NOT NULL DEFAULT 'post',
                post_mime_type TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS {p}_postmeta (
                meta_id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL DEFAULT 0,
                meta_key TEXT,
                meta_value TEXT
            );
            CREATE INDEX IF NOT EXISTS {p}_postmeta_post_id ON {p}_postmeta(post_id);
            CREATE TABLE IF NOT EXISTS {p}_options (
                option_id INTEGER PRIMARY KEY,
                option_name TEXT NOT NULL UNIQUE,
                option_value TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS {p}_terms (
                term_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                slug TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS {p}_term_taxonomy (
                term_taxonomy_id INTEGER PRIMARY KEY,
                term_id INTEGER NOT NULL DEFAULT 0,
                taxonomy TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS {p}_term_relationships (
                object_id INTEGER NOT NULL DEFAULT 0,
                term_taxonomy_id INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (object_id, term_taxonomy_id)
            );"
        ))?;
        Ok(())
    }

    /// Gravity Forms tables; only present on sites that ran the plugin.
    pub fn create_forms_schema(&self) -> Result<()> {
        let p = &self.prefix;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {p}_rg_form (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                date_created TEXT NOT NULL DEFAULT '0000-00-00 00:00:00',
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS {p}_rg_form_meta (
                form_id INTEGER PRIMARY KEY,
                display_meta TEXT
            );"
        ))?;
        Ok(())
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![self.table(name)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn rows<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Map<String, Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt
            .query_map(params, |row| row_to_map(row, &columns))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn post_meta(&self, ids: &[u64]) -> Result<HashMap<u64, BTreeMap<String, Value>>> {
        let mut meta: HashMap<u64, BTreeMap<String, Value>> = HashMap::new();
        // SQLite caps bound parameters; stay well under the limit.
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT post_id, meta_key, meta_value FROM {} WHERE post_id IN ({placeholders}) ORDER BY meta_id",
                self.table("postmeta")
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (post_id, key, value) in entries {
                let Some(key) = key else { continue };
                let value = value.map_or(Value::Null, |raw| decode_meta_value(&raw));
                meta.entry(post_id).or_default().insert(key, value);
            }
        }
        Ok(meta)
    }

    fn posts_with_meta(&self, rows: Vec<Map<String, Value>>) -> Result<Vec<LegacyRecord>> {
        let records = rows
            .into_iter()
            .map(|fields| LegacyRecord::new(SourceTable::Posts, fields))
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        let mut meta = self.post_meta(&ids)?;
        Ok(records
            .into_iter()
            .map(|record| {
                let entries = meta.remove(&record.id).unwrap_or_default();
                record.with_meta(entries)
            })
            .collect())
    }
}

fn row_to_map(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Map<String, Value>> {
    let mut map = Map::new();
    for (idx, name) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Number(i.into()),
            ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Value::String(String::from_utf8_lossy(t).into_owned())
            }
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}

impl LegacySource for WpDatabase {
    fn option(&self, name: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT option_value FROM {} WHERE option_name = ?1",
            self.table("options")
        ))?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn posts(&self, post_type: &str) -> Result<Vec<LegacyRecord>> {
        let rows = self.rows(
            &format!(
                "SELECT * FROM {} WHERE post_type = ?1 AND post_status NOT IN ('trash', 'auto-draft') ORDER BY ID",
                self.table("posts")
            ),
            params![post_type],
        )?;
        self.posts_with_meta(rows)
    }

    fn nav_menus(&self) -> Result<Vec<NavMenu>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT t.name, t.slug FROM {terms} t
             JOIN {tax} tt ON tt.term_id = t.term_id
             WHERE tt.taxonomy = 'nav_menu'
             ORDER BY t.name",
            terms = self.table("terms"),
            tax = self.table("term_taxonomy"),
        ))?;
        let menus = stmt
            .query_map([], |row| {
                Ok(NavMenu {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(menus)
    }

    fn nav_menu_items(&self, slug: &str) -> Result<Vec<LegacyRecord>> {
        let rows = self.rows(
            &format!(
                "SELECT p.* FROM {posts} p
                 JOIN {rel} tr ON tr.object_id = p.ID
                 JOIN {tax} tt ON tt.term_taxonomy_id = tr.term_taxonomy_id
                 JOIN {terms} t ON t.term_id = tt.term_id
                 WHERE tt.taxonomy = 'nav_menu' AND t.slug = ?1 AND p.post_type = 'nav_menu_item'
                 AND p.post_status NOT IN ('trash', 'auto-draft')
                 ORDER BY p.menu_order, p.ID",
                posts = self.table("posts"),
                rel = self.table("term_relationships"),
                tax = self.table("term_taxonomy"),
                terms = self.table("terms"),
            ),
            params![slug],
        )?;
        self.posts_with_meta(rows)
    }

    fn has_forms(&self) -> Result<bool> {
        Ok(self.table_exists("rg_form")? && self.table_exists("rg_form_meta")?)
    }

    fn forms(&self) -> Result<Vec<LegacyRecord>> {
        let rows = self.rows(
            &format!("SELECT * FROM {} ORDER BY id", self.table("rg_form")),
            [],
        )?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT display_meta FROM {} WHERE form_id = ?1",
            self.table("rg_form_meta")
        ))?;
        let mut forms = Vec::with_capacity(rows.len());
        for fields in rows {
            let record = LegacyRecord::new(SourceTable::RgForm, fields)?;
            let raw: Option<Option<String>> = stmt
                .query_map(params![record.id], |row| row.get(0))?
                .next()
                .transpose()?;
            let mut meta = BTreeMap::new();
            if let Some(Some(raw)) = raw {
                let decoded = serde_json::from_str(&raw).unwrap_or_else(|_| decode_meta_value(&raw));
                meta.insert("display_meta".to_string(), decoded);
            }
            forms.push(record.with_meta(meta));
        }
        Ok(forms)
    }
}
