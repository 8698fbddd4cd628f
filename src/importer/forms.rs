use std::collections::HashSet;

use serde_json::Value;

use super::Importer;
use crate::error::{MigrateError, Result};
use crate::legacy::process_title;
use crate::model::{
    Category, FormField, FormFieldKind, LegacyRecord, MigrationStamp, RecordKind, SourceTable,
    TargetRecord, value_as_i64,
};
use crate::reconcile::hierarchy::slugify;
use crate::reconcile::writer::{self, PublishPolicy, WriteOutcome};
use crate::report::Outcome;

const TEXTAREA_ROWS: u32 = 4;

fn text(field: &Value, key: &str) -> Option<String> {
    field.get(key).and_then(Value::as_str).map(String::from)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        _ => false,
    }
}

fn choices(field: &Value) -> &[Value] {
    field
        .get("choices")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Typed target fields for one form's `display_meta.fields`. Captcha fields
/// are dropped; unknown types fail the whole form.
pub fn map_fields(form_id: u64, fields: &[Value]) -> Result<Vec<FormField>> {
    let invalid = |reason: String| MigrateError::InvalidForm {
        form: form_id,
        reason,
    };
    let mut mapped = Vec::with_capacity(fields.len());

    for (i, data) in fields.iter().enumerate() {
        let field_type = data
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("field {} is missing \"type\"", i + 1)))?;
        let mut title = text(data, "label");
        let mut rows = None;
        let mut range = None;
        let mut content = None;

        let kind = match field_type {
            "textarea" => {
                rows = Some(TEXTAREA_ROWS);
                FormFieldKind::Text
            }
            "name" | "text" | "phone" => FormFieldKind::Text,
            "email" => FormFieldKind::Email,
            "number" => {
                let bound = |key: &str| data.get(key).and_then(value_as_i64).unwrap_or(0);
                range = Some((bound("rangeMin"), bound("rangeMax")));
                FormFieldKind::Numeric
            }
            "radio" => FormFieldKind::Radio,
            "checkbox" => match choices(data) {
                [] => return Err(invalid("cannot find \"choices\" on checkbox".into())),
                [only] => {
                    title = text(only, "text");
                    FormFieldKind::Checkbox
                }
                _ => FormFieldKind::CheckboxGroup,
            },
            "select" => FormFieldKind::Dropdown,
            "captcha" => continue,
            "html" => {
                content = Some(text(data, "content").unwrap_or_default());
                FormFieldKind::Literal
            }
            other => return Err(MigrateError::UnsupportedFormField(other.to_string())),
        };

        let options = match kind {
            FormFieldKind::Radio | FormFieldKind::CheckboxGroup | FormFieldKind::Dropdown => {
                choices(data)
                    .iter()
                    .filter_map(|choice| choice.get("value"))
                    .map(|value| match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        mapped.push(FormField {
            kind,
            title,
            placeholder: text(data, "placeholder"),
            error_message: text(data, "errorMessage"),
            required: truthy(data.get("isRequired")),
            sort: i as i64 + 1,
            rows,
            min_value: range.map(|(min, _)| min),
            max_value: range.map(|(_, max)| max),
            content,
            options,
        });
    }
    Ok(mapped)
}

fn embed_marker(form_id: u64) -> String {
    format!("[gravityform id=\"{form_id}\"")
}

/// Convert Gravity Forms definitions into form pages. A form embedded by
/// exactly one page (and alone on it) turns that page into the form page.
pub(super) fn run(imp: &mut Importer<'_>) -> Result<()> {
    if !imp.config.features.forms {
        return Err(MigrateError::PrerequisiteMissing(
            "form import is disabled (features.forms)".into(),
        ));
    }
    if !imp.legacy.has_forms()? {
        return Err(MigrateError::PrerequisiteMissing(
            "legacy dataset has no Gravity Forms tables".into(),
        ));
    }

    let mut pages = imp.store.list(Category::Page)?;
    let imported: HashSet<u64> = pages
        .iter()
        .filter_map(|p| {
            p.form_id
                .or_else(|| p.stamp.is_from(SourceTable::RgForm).then_some(p.stamp.legacy_id))
        })
        .collect();

    for form in imp.legacy.forms()? {
        if imported.contains(&form.id) {
            imp.report
                .record(Outcome::NoChange, &form, format!("form #{} already imported", form.id));
            continue;
        }
        let Some(fields) = form
            .meta("display_meta")
            .and_then(|meta| meta.get("fields"))
            .and_then(Value::as_array)
        else {
            imp.report
                .record(Outcome::NoChange, &form, format!("form #{} has no fields", form.id));
            continue;
        };
        let fields = map_fields(form.id, fields)?;

        let marker = embed_marker(form.id);
        let hosts: Vec<usize> = pages
            .iter()
            .enumerate()
            .filter(|(_, p)| imp.content.get(p).is_some_and(|body| body.contains(&marker)))
            .map(|(idx, _)| idx)
            .collect();
        let host = match hosts.as_slice() {
            [only] if imp
                .content
                .get(&pages[*only])
                .is_some_and(|body| body.matches("[gravityform").count() == 1) =>
            {
                Some(*only)
            }
            _ => None,
        };

        let mut record = match host {
            Some(idx) => {
                let mut page = pages[idx].clone();
                page.kind = RecordKind::UserForm;
                page
            }
            None => new_form_page(&form, imp.config.target.root_parent_id)?,
        };
        record.form_fields = fields;
        record.form_id = Some(form.id);

        let policy = PublishPolicy::IfLegacyPublished(form.is_published());
        if writer::upsert(&mut *imp.store, &mut record, policy, &mut imp.report)
            == WriteOutcome::Failed
        {
            continue;
        }
        match host {
            Some(idx) => pages[idx] = record,
            None => pages.push(record),
        }
    }
    Ok(())
}

fn new_form_page(form: &LegacyRecord, parent_id: u64) -> Result<TargetRecord> {
    let title = process_title(form.title()?);
    Ok(TargetRecord {
        url_segment: slugify(&title),
        title,
        parent_id,
        created: Some(form.date()?.to_string()),
        stamp: MigrationStamp::from_legacy(form),
        ..TargetRecord::new(RecordKind::UserForm)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::testing::{FailingTitle, config};
    use crate::legacy::WpDatabase;
    use crate::legacy::wpdb::fixtures::*;
    use crate::store::{SiteStore, TargetStore};
    use rusqlite::params;
    use serde_json::json;
    use tempfile::tempdir;

    fn add_form(db: &WpDatabase, id: u64, title: &str, display_meta: &Value) {
        let conn = db.connection();
        conn.execute(
            "INSERT INTO wp_rg_form (id, title, date_created, is_active) VALUES (?1, ?2, '2018-02-03 04:05:06', 1)",
            params![id, title],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO wp_rg_form_meta (form_id, display_meta) VALUES (?1, ?2)",
            params![id, display_meta.to_string()],
        )
        .unwrap();
    }

    #[test]
    fn maps_field_types() {
        let fields = json!([
            {"type": "textarea", "label": "Message", "isRequired": true},
            {"type": "number", "label": "Age", "rangeMin": "18", "rangeMax": 99},
            {"type": "checkbox", "label": "Consent", "choices": [{"text": "I agree", "value": "yes"}]},
            {"type": "checkbox", "label": "Topics", "choices": [{"text": "A", "value": "a"}, {"text": "B", "value": "b"}]},
            {"type": "captcha"},
            {"type": "select", "label": "Colour", "choices": [{"value": "red"}, {"value": "blue"}]},
            {"type": "html", "content": "<p>Thanks</p>"}
        ]);
        let mapped = map_fields(1, fields.as_array().unwrap()).unwrap();
        let kinds: Vec<FormFieldKind> = mapped.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FormFieldKind::Text,
                FormFieldKind::Numeric,
                FormFieldKind::Checkbox,
                FormFieldKind::CheckboxGroup,
                FormFieldKind::Dropdown,
                FormFieldKind::Literal,
            ]
        );
        assert_eq!(mapped[0].rows, Some(4));
        assert!(mapped[0].required);
        assert_eq!((mapped[1].min_value, mapped[1].max_value), (Some(18), Some(99)));
        assert_eq!(mapped[2].title.as_deref(), Some("I agree"));
        assert!(mapped[2].options.is_empty());
        assert_eq!(mapped[3].options, vec!["a", "b"]);
        assert_eq!(mapped[4].sort, 6);
        assert_eq!(mapped[5].content.as_deref(), Some("<p>Thanks</p>"));
    }

    #[test]
    fn unknown_or_untyped_fields_fail_the_form() {
        let err = map_fields(2, &[json!({"type": "fileupload"})]).unwrap_err();
        assert_eq!(err.code(), "unsupported_form_field");
        let err = map_fields(2, &[json!({"label": "x"})]).unwrap_err();
        assert_eq!(err.code(), "invalid_form");
        let err = map_fields(2, &[json!({"type": "checkbox"})]).unwrap_err();
        assert_eq!(err.code(), "invalid_form");
    }

    #[test]
    fn single_embedding_page_becomes_the_form() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.features.forms = true;
        let db = WpDatabase::open_memory("wp").unwrap();
        db.create_forms_schema().unwrap();
        let meta = json!({"fields": [{"type": "email", "label": "Email"}]});
        add_form(&db, 1, "Contact", &meta);
        add_form(&db, 2, "Newsletter", &meta);
        insert_post(
            &db,
            &Post {
                content: "<p>Write to us</p>[gravityform id=\"1\" title=\"false\"]",
                ..Post::page(5, "Contact us", "contact-us", 0)
            },
        );
        insert_post(
            &db,
            &Post {
                content: "[gravityform id=\"2\"]",
                ..Post::page(6, "Join", "join", 0)
            },
        );
        insert_post(
            &db,
            &Post {
                content: "[gravityform id=\"2\"]",
                ..Post::page(7, "Sign up", "sign-up", 0)
            },
        );
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_pages().unwrap();
        importer.import_forms().unwrap();
        drop(importer);

        let pages = store.list(Category::Page).unwrap();
        let contact = pages.iter().find(|p| p.stamp.legacy_id == 5).unwrap();
        assert_eq!(contact.kind, RecordKind::UserForm);
        assert_eq!(contact.form_id, Some(1));
        assert_eq!(contact.form_fields[0].kind, FormFieldKind::Email);

        let newsletter = pages
            .iter()
            .find(|p| p.stamp.is_from(SourceTable::RgForm))
            .unwrap();
        assert_eq!(newsletter.title, "Newsletter");
        assert_eq!(newsletter.url_segment, "newsletter");
        assert_eq!(newsletter.created.as_deref(), Some("2018-02-03 04:05:06"));
        assert!(store.is_published(newsletter.id).unwrap());
        assert_eq!(
            pages.iter().filter(|p| p.kind == RecordKind::UserForm).count(),
            2
        );

        let mut again = Importer::new(&config, &db, &mut store);
        again.import_pages().unwrap();
        again.import_forms().unwrap();
        let report = again.into_report();
        assert_eq!(report.count(Outcome::Created), 0);
        assert_eq!(report.count(Outcome::Changed), 0);
    }

    #[test]
    fn failed_form_write_moves_on_to_the_next_form() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.features.forms = true;
        let db = WpDatabase::open_memory("wp").unwrap();
        db.create_forms_schema().unwrap();
        let meta = json!({"fields": [{"type": "text", "label": "Name"}]});
        add_form(&db, 1, "Broken", &meta);
        add_form(&db, 2, "Survey", &meta);
        let mut store = FailingTitle {
            inner: SiteStore::open_memory().unwrap(),
            title: "Broken",
        };

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_forms().unwrap();
        let report = importer.into_report();
        assert_eq!(report.diagnostic_count(crate::report::DiagnosticKind::WriteFailed), 1);

        let pages = store.list(Category::Page).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Survey");
        assert_eq!(pages[0].form_id, Some(2));
    }

    #[test]
    fn missing_tables_are_a_prerequisite() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.features.forms = true;
        let db = WpDatabase::open_memory("wp").unwrap();
        let mut store = SiteStore::open_memory().unwrap();
        let err = Importer::new(&config, &db, &mut store)
            .import_forms()
            .unwrap_err();
        assert_eq!(err.code(), "prerequisite_missing");
    }
}
