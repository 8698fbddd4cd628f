use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MigrateError, Result};

/// Legacy table a record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Posts,
    Terms,
    RgForm,
}

impl SourceTable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Terms => "terms",
            Self::RgForm => "rg_form",
        }
    }

    /// Column carrying the numeric identity within the table.
    pub fn id_column(self) -> &'static str {
        match self {
            Self::Posts => "ID",
            Self::Terms => "term_id",
            Self::RgForm => "id",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "posts" => Some(Self::Posts),
            "terms" => Some(Self::Terms),
            "rg_form" => Some(Self::RgForm),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one legacy row plus its key/value meta.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub table: SourceTable,
    pub id: u64,
    pub fields: Map<String, Value>,
    pub meta: BTreeMap<String, Value>,
}

impl LegacyRecord {
    pub fn new(table: SourceTable, fields: Map<String, Value>) -> Result<Self> {
        let column = table.id_column();
        let id = fields
            .get(column)
            .and_then(value_as_u64)
            .ok_or_else(|| MigrateError::MissingField {
                table: table.to_string(),
                id: 0,
                field: column.to_string(),
            })?;
        Ok(Self {
            table,
            id,
            fields,
            meta: BTreeMap::new(),
        })
    }

    pub fn with_meta(mut self, meta: BTreeMap<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    fn missing(&self, field: &str) -> MigrateError {
        MigrateError::MissingField {
            table: self.table.to_string(),
            id: self.id,
            field: field.to_string(),
        }
    }

    pub fn opt_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn require_str(&self, field: &str) -> Result<&str> {
        self.opt_str(field).ok_or_else(|| self.missing(field))
    }

    pub fn opt_u64(&self, field: &str) -> Option<u64> {
        self.fields.get(field).and_then(value_as_u64)
    }

    pub fn require_u64(&self, field: &str) -> Result<u64> {
        self.opt_u64(field).ok_or_else(|| self.missing(field))
    }

    pub fn require_i64(&self, field: &str) -> Result<i64> {
        self.fields
            .get(field)
            .and_then(value_as_i64)
            .ok_or_else(|| self.missing(field))
    }

    pub fn title(&self) -> Result<&str> {
        match self.table {
            SourceTable::Posts => self.require_str("post_title"),
            SourceTable::Terms => self.require_str("name"),
            SourceTable::RgForm => self.require_str("title"),
        }
    }

    pub fn slug(&self) -> Result<&str> {
        match self.table {
            SourceTable::Posts => self.require_str("post_name"),
            _ => self.require_str("slug"),
        }
    }

    pub fn status(&self) -> Result<&str> {
        self.require_str("post_status")
    }

    /// True when the legacy row is live on the old site.
    pub fn is_published(&self) -> bool {
        match self.table {
            SourceTable::Posts => self.opt_str("post_status") == Some("publish"),
            SourceTable::RgForm => self.opt_u64("is_active").is_some_and(|v| v != 0),
            SourceTable::Terms => false,
        }
    }

    pub fn parent(&self) -> u64 {
        self.opt_u64("post_parent").unwrap_or(0)
    }

    pub fn menu_order(&self) -> Result<i64> {
        self.require_i64("menu_order")
    }

    pub fn post_type(&self) -> Result<&str> {
        self.require_str("post_type")
    }

    pub fn date(&self) -> Result<&str> {
        match self.table {
            SourceTable::RgForm => self.require_str("date_created"),
            _ => self.require_str("post_date"),
        }
    }

    pub fn modified(&self) -> Result<&str> {
        self.require_str("post_modified")
    }

    pub fn content(&self) -> &str {
        self.opt_str("post_content").unwrap_or("")
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.meta.get(key).and_then(value_as_u64)
    }

    pub fn require_meta(&self, key: &str) -> Result<&Value> {
        self.meta.get(key).ok_or_else(|| MigrateError::MissingMeta {
            table: self.table.to_string(),
            id: self.id,
            key: key.to_string(),
        })
    }
}

/// Numeric coercion for legacy columns, which arrive as integers or numeric text.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Correlates a target record back to its legacy origin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStamp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<SourceTable>,
    pub legacy_id: u64,
    pub legacy_parent_id: u64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub meta_payload: Value,
    #[serde(default)]
    pub was_last_write_by_migration: bool,
}

impl MigrationStamp {
    pub fn from_legacy(record: &LegacyRecord) -> Self {
        let meta_payload = if record.meta.is_empty() {
            Value::Null
        } else {
            Value::Object(record.meta.clone().into_iter().collect())
        };
        Self {
            source_table: Some(record.table),
            legacy_id: record.id,
            legacy_parent_id: record.parent(),
            payload: Value::Object(record.fields.clone()),
            meta_payload,
            was_last_write_by_migration: false,
        }
    }

    /// Stamp for records the migration owns that have no legacy row behind them.
    pub fn marker() -> Self {
        Self {
            payload: Value::Bool(true),
            ..Self::default()
        }
    }

    pub fn is_marker(&self) -> bool {
        self.legacy_id == 0 && self.payload == Value::Bool(true)
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy_id != 0
    }

    pub fn is_from(&self, table: SourceTable) -> bool {
        self.is_legacy() && self.source_table == Some(table)
    }

    /// Whether the captured legacy row was live on the old site.
    pub fn legacy_published(&self) -> bool {
        match self.source_table {
            Some(SourceTable::Posts) => {
                self.payload.get("post_status").and_then(Value::as_str) == Some("publish")
            }
            Some(SourceTable::RgForm) => self
                .payload
                .get("is_active")
                .and_then(value_as_u64)
                .is_some_and(|v| v != 0),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum Category {
    Page,
    File,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Page,
    Redirector,
    Calendar,
    CalendarEvent,
    UserForm,
    File,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Redirector => "redirector",
            Self::Calendar => "calendar",
            Self::CalendarEvent => "calendar_event",
            Self::UserForm => "user_form",
            Self::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "page" => Some(Self::Page),
            "redirector" => Some(Self::Redirector),
            "calendar" => Some(Self::Calendar),
            "calendar_event" => Some(Self::CalendarEvent),
            "user_form" => Some(Self::UserForm),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::File => Category::File,
            _ => Category::Page,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTML block of a block-structured page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub legacy_id: u64,
    pub html: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchedule {
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: String,
    pub lng: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFieldKind {
    Text,
    Email,
    Numeric,
    Radio,
    Checkbox,
    CheckboxGroup,
    Dropdown,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub kind: FormFieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub required: bool,
    pub sort: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// A node in the target tree. `id == 0` means not yet written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: u64,
    pub kind: RecordKind,
    pub parent_id: u64,
    pub sort: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_title: Option<String>,
    pub url_segment: String,
    pub show_in_menus: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form_fields: Vec<FormField>,
    /// Legacy form definition this page hosts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_id: Option<u64>,
    #[serde(default)]
    pub stamp: MigrationStamp,
}

impl TargetRecord {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn exists(&self) -> bool {
        self.id != 0
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Short human label used in outcome lines.
    pub fn label(&self) -> String {
        format!("\"{}\" ({}) #{}", self.title, self.kind, self.id)
    }
}
