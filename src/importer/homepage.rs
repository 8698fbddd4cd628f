use super::Importer;
use crate::error::Result;
use crate::model::{Category, SourceTable};
use crate::reconcile::rewrite::HOME_SEGMENT;
use crate::reconcile::writer::{self, PublishPolicy};
use crate::report::{DiagnosticKind, Outcome, Subject};
use crate::store::TargetStore;

fn remove(store: &mut dyn TargetStore, id: u64) -> Result<()> {
    if store.is_published(id)? {
        store.unpublish(id)?;
    }
    store.delete(id)
}

/// Give the legacy front page the `home` segment, removing placeholder home
/// pages that were not migrated.
pub(super) fn run(imp: &mut Importer<'_>) -> Result<()> {
    let Some(front_id) = imp.legacy.front_page_id()? else {
        imp.report.record(
            Outcome::NoChange,
            Subject::none(),
            "legacy site has no static front page",
        );
        return Ok(());
    };
    let pages = imp.store.list(Category::Page)?;
    let Some(mut front) = pages
        .iter()
        .find(|p| p.stamp.is_from(SourceTable::Posts) && p.stamp.legacy_id == front_id)
        .cloned()
    else {
        imp.report.error(
            DiagnosticKind::MissingLegacyRecord,
            Subject::legacy(SourceTable::Posts, front_id),
            format!("front page #{front_id} has not been imported"),
        );
        return Ok(());
    };

    for placeholder in pages
        .iter()
        .filter(|p| !p.stamp.is_legacy() && p.url_segment == HOME_SEGMENT && p.id != front.id)
    {
        match remove(&mut *imp.store, placeholder.id) {
            Ok(()) => imp.report.record(Outcome::Deleted, placeholder, placeholder.label()),
            Err(err) => imp.report.error(
                DiagnosticKind::DeleteFailed,
                placeholder,
                format!("unable to delete {}: {err}", placeholder.label()),
            ),
        }
    }

    front.url_segment = HOME_SEGMENT.to_string();
    writer::try_upsert(&mut *imp.store, &mut front, PublishPolicy::Always, &mut imp.report)?;
    Ok(())
}
