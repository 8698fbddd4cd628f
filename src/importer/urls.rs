use super::Importer;
use super::attachments::relative_link;
use crate::error::{MigrateError, Result};
use crate::model::{Category, RecordKind, SourceTable};
use crate::reconcile::rewrite::{AssetMap, LinkIndex, LinkRewriter};
use crate::reconcile::writer::{self, PublishPolicy};
use crate::report::Outcome;

/// Replace absolute legacy links and upload URLs in migrated bodies with
/// target references.
pub(super) fn run(imp: &mut Importer<'_>) -> Result<()> {
    let site_url = match &imp.config.legacy.site_url {
        Some(url) => url.clone(),
        None => imp.legacy.site_url()?.ok_or(MigrateError::SiteUrlUnknown)?,
    };
    let target = &imp.config.target;
    let asset_prefix = relative_link(&target.uploads_dir, &target.site_root).unwrap_or_default();

    let pages = imp.store.list(Category::Page)?;
    let files = imp.store.list(Category::File)?;
    let links = LinkIndex::build(&pages, target.root_parent_id);
    let assets = AssetMap::build(&files);
    tracing::debug!(%site_url, assets = assets.len(), "rewriting content links");
    let rewriter = LinkRewriter::new(
        &site_url,
        &imp.config.legacy.storage_hosts,
        &asset_prefix,
        &links,
        &assets,
    );

    for mut page in pages.into_iter().filter(|p| {
        p.stamp.is_from(SourceTable::Posts) && p.kind != RecordKind::Redirector
    }) {
        let Some(body) = imp.content.get(&page).map(str::to_string) else {
            imp.report
                .record(Outcome::NoChange, &page, format!("{} has no content", page.label()));
            continue;
        };
        let (rewritten, unresolved) = rewriter.rewrite(&body);
        for reference in unresolved {
            imp.report.error(reference.kind, &page, reference.message);
        }
        if rewritten == body {
            imp.report.record(Outcome::NoChange, &page, page.label());
            continue;
        }
        imp.content.set(&mut page, &rewritten);
        writer::upsert(
            &mut *imp.store,
            &mut page,
            PublishPolicy::IfLegacyPublished(false),
            &mut imp.report,
        );
    }
    Ok(())
}
