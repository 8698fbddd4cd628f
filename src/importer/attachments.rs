use std::path::{Component, Path};

use serde_json::Value;

use super::Importer;
use crate::config::lexical;
use crate::error::{MigrateError, Result};
use crate::legacy::process_title;
use crate::model::{Category, LegacyRecord, MigrationStamp, RecordKind, SourceTable, TargetRecord};
use crate::reconcile::files::{CandidateFilePath, FileResolver, Resolution};
use crate::reconcile::identity::records_by_legacy_id;
use crate::reconcile::writer::{self, PublishPolicy};
use crate::report::{DiagnosticKind, Outcome};

/// `path` relative to `root` with forward slashes.
pub(crate) fn relative_link(path: &Path, root: &Path) -> Option<String> {
    let path = lexical(path);
    let relative = path.strip_prefix(lexical(root)).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

fn list_paths(candidates: &[CandidateFilePath]) -> String {
    candidates
        .iter()
        .map(|c| c.path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn file_record(post: &LegacyRecord, filename: String) -> Result<TargetRecord> {
    let cdn_file = post
        .meta("amazonS3_info")
        .and_then(|info| info.get("key"))
        .and_then(Value::as_str)
        .map(String::from);
    Ok(TargetRecord {
        title: process_title(post.title()?),
        filename: Some(filename),
        cdn_file,
        created: Some(post.date()?.to_string()),
        last_edited: Some(post.modified()?.to_string()),
        stamp: MigrationStamp::from_legacy(post),
        ..TargetRecord::new(RecordKind::File)
    })
}

pub(super) fn run(imp: &mut Importer<'_>) -> Result<()> {
    let attachments = imp.legacy.posts("attachment")?;
    if attachments.is_empty() {
        return Ok(());
    }
    let site_root = imp.config.target.site_root.clone();
    let mut resolver = FileResolver::new(imp.config.target.uploads_dir.clone());
    if resolver.file_count()? == 0 {
        imp.report.notice(
            DiagnosticKind::UnresolvedAttachment,
            crate::report::Subject::none(),
            format!("no files found under {}", resolver.root().display()),
        );
        return Ok(());
    }
    let existing = records_by_legacy_id(imp.store.list(Category::File)?, SourceTable::Posts)?;

    for post in &attachments {
        if existing.contains_key(&post.id) {
            imp.report
                .record(Outcome::NoChange, post, format!("attachment #{} already imported", post.id));
            continue;
        }
        let Some(attached) = post
            .meta_str("_wp_attached_file")
            .map(str::trim)
            .filter(|path| !path.is_empty())
        else {
            imp.report.notice(
                DiagnosticKind::MissingAttachmentPath,
                post,
                format!("attachment #{} has no _wp_attached_file", post.id),
            );
            continue;
        };

        let found = match resolver.resolve(attached)? {
            Resolution::Resolved(found) => found,
            Resolution::Missing => {
                imp.report.error(
                    DiagnosticKind::UnresolvedAttachment,
                    post,
                    format!("unable to find file for attachment #{}: {attached}", post.id),
                );
                continue;
            }
            Resolution::NoDateMatch(candidates) => {
                imp.report.notice(
                    DiagnosticKind::UnresolvedAttachment,
                    post,
                    format!(
                        "no file for {attached} in its year/month folder; candidates: {}",
                        list_paths(&candidates)
                    ),
                );
                continue;
            }
            Resolution::Ambiguous(candidates) => {
                imp.report.notice(
                    DiagnosticKind::AmbiguousAttachment,
                    post,
                    format!("{attached} matches several files: {}", list_paths(&candidates)),
                );
                continue;
            }
        };

        let filename = relative_link(&found.path, &site_root).ok_or_else(|| {
            MigrateError::OutsideAssetsRoot {
                path: found.path.display().to_string(),
                root: site_root.display().to_string(),
            }
        })?;
        let mut record = file_record(post, filename)?;
        writer::upsert(&mut *imp.store, &mut record, PublishPolicy::Never, &mut imp.report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::testing::config;
    use crate::legacy::WpDatabase;
    use crate::legacy::wpdb::fixtures::*;
    use crate::store::{SiteStore, TargetStore};
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn attachment(db: &WpDatabase, id: u64, title: &str, file: Option<&str>) {
        insert_post(
            db,
            &Post {
                post_type: "attachment",
                status: "inherit",
                ..Post::page(id, title, title, 0)
            },
        );
        if let Some(file) = file {
            insert_meta(db, id, "_wp_attached_file", file);
        }
    }

    #[test]
    fn resolves_files_and_reports_the_rest() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let uploads = dir.path().join("assets/Uploads");
        touch(&uploads, "2019/04/photo.jpg");
        touch(&uploads, "2019/03/photo.jpg");
        touch(&uploads, "2018/01/old.pdf");
        touch(&uploads, "2017/05/twin.png");
        touch(&uploads, "2017/05/01235537/twin.png");

        let db = WpDatabase::open_memory("wp").unwrap();
        attachment(&db, 10, "photo", Some("2019/04/photo.jpg"));
        insert_meta(
            &db,
            10,
            "amazonS3_info",
            r#"a:2:{s:6:"bucket";s:3:"cdn";s:3:"key";s:36:"wp-content/uploads/2019/04/photo.jpg";}"#,
        );
        attachment(&db, 11, "old", Some("2019/04/old.pdf"));
        attachment(&db, 12, "gone", Some("2019/04/gone.pdf"));
        attachment(&db, 13, "twin", Some("2017/05/twin.png"));
        attachment(&db, 14, "nameless", None);
        let mut store = SiteStore::open_memory().unwrap();

        let mut importer = Importer::new(&config, &db, &mut store);
        importer.import_attachments().unwrap();
        let report = importer.into_report();
        assert_eq!(report.count(Outcome::Created), 1);
        assert_eq!(report.count(Outcome::Published), 0);
        assert_eq!(report.diagnostic_count(DiagnosticKind::UnresolvedAttachment), 2);
        assert_eq!(report.diagnostic_count(DiagnosticKind::AmbiguousAttachment), 1);
        assert_eq!(report.diagnostic_count(DiagnosticKind::MissingAttachmentPath), 1);
        assert_eq!(report.count(Outcome::Error), 1);

        let files = store.list(Category::File).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename.as_deref(), Some("assets/Uploads/2019/04/photo.jpg"));
        assert_eq!(
            files[0].cdn_file.as_deref(),
            Some("wp-content/uploads/2019/04/photo.jpg")
        );
        assert!(!store.is_published(files[0].id).unwrap());

        let mut again = Importer::new(&config, &db, &mut store);
        again.import_attachments().unwrap();
        let report = again.into_report();
        assert_eq!(report.count(Outcome::Created), 0);
        assert_eq!(report.count(Outcome::NoChange), 1);
    }

    #[test]
    fn relative_link_uses_forward_slashes() {
        let root = Path::new("/srv/site/.");
        assert_eq!(
            relative_link(Path::new("/srv/site/assets/Uploads/a.pdf"), root).as_deref(),
            Some("assets/Uploads/a.pdf")
        );
        assert_eq!(relative_link(Path::new("/elsewhere/a.pdf"), root), None);
        assert_eq!(
            relative_link(Path::new("./assets/Uploads/2019/04/a.pdf"), Path::new(".")).as_deref(),
            Some("assets/Uploads/2019/04/a.pdf")
        );
    }
}
