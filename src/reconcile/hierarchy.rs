//! Parent and sort-order reconciliation for migrated pages.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{MigrateError, Result};
use crate::legacy::process_title;
use crate::model::{Category, LegacyRecord, MigrationStamp, RecordKind, SourceTable, TargetRecord};
use crate::reconcile::identity::IdentityMap;
use crate::reconcile::rewrite::HOME_SEGMENT;
use crate::reconcile::writer::{self, PublishPolicy, WriteOutcome};
use crate::report::{BatchReport, DiagnosticKind, Outcome};
use crate::store::TargetStore;

/// Reparent every migrated page to the target counterpart of its legacy parent.
/// Pages in `menu_placed` belong to the navigation menu and keep their parent.
pub fn reconcile_ancestry(
    store: &mut dyn TargetStore,
    root_parent_id: u64,
    menu_placed: &HashSet<u64>,
    report: &mut BatchReport,
) -> Result<()> {
    let records = store.list(Category::Page)?;
    let identities = IdentityMap::from_records(&records, SourceTable::Posts, root_parent_id)?;

    for mut record in records
        .into_iter()
        .filter(|r| r.stamp.is_from(SourceTable::Posts))
    {
        if menu_placed.contains(&record.id) {
            report.record(
                Outcome::NoChange,
                &record,
                format!("{} is placed by the navigation menu", record.label()),
            );
            continue;
        }
        let legacy_parent = record.stamp.legacy_parent_id;
        if legacy_parent == 0 {
            report.record(Outcome::NoChange, &record, format!("{} is top-level", record.label()));
            continue;
        }
        match identities.resolve(legacy_parent) {
            None => report.notice(
                DiagnosticKind::NoParentMatch,
                &record,
                format!(
                    "{} has legacy parent #{legacy_parent} which was not imported",
                    record.label()
                ),
            ),
            Some(parent_id) if parent_id == record.parent_id => {
                report.record(Outcome::NoChange, &record, record.label());
            }
            Some(parent_id) => {
                record.parent_id = parent_id;
                let live = record.stamp.legacy_published();
                writer::upsert(store, &mut record, PublishPolicy::IfLegacyPublished(live), report);
            }
        }
    }
    Ok(())
}

/// One `nav_menu_item` row with its meta decoded.
#[derive(Debug, Clone)]
pub struct MenuItem {
    pub id: u64,
    pub parent_item: u64,
    pub object_id: u64,
    pub item_type: String,
    pub url: Option<String>,
    pub title: String,
    pub sort: i64,
    pub source: LegacyRecord,
}

impl MenuItem {
    pub fn from_legacy(record: LegacyRecord) -> Result<Self> {
        let item_type = record
            .require_meta("_menu_item_type")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        if item_type != "post_type" && item_type != "custom" {
            return Err(MigrateError::UnsupportedMenuItemType {
                item: record.id,
                item_type,
            });
        }
        Ok(Self {
            id: record.id,
            parent_item: record.meta_u64("_menu_item_menu_item_parent").unwrap_or(0),
            object_id: record.meta_u64("_menu_item_object_id").unwrap_or(0),
            url: record
                .meta_str("_menu_item_url")
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from),
            title: process_title(record.opt_str("post_title").unwrap_or_default()),
            sort: record.menu_order()?,
            item_type,
            source: record,
        })
    }
}

/// Menu items arranged parent-before-child.
#[derive(Debug)]
pub struct MenuForest {
    order: Vec<MenuItem>,
}

impl MenuForest {
    /// Validates every item up front: unknown types, parents missing from the
    /// menu and cyclic parent chains are all fatal.
    pub fn build(records: Vec<LegacyRecord>) -> Result<Self> {
        let mut items = records
            .into_iter()
            .map(MenuItem::from_legacy)
            .collect::<Result<Vec<_>>>()?;
        items.sort_by_key(|item| (item.sort, item.id));
        let ids: HashSet<u64> = items.iter().map(|i| i.id).collect();

        let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            if item.parent_item != 0 && !ids.contains(&item.parent_item) {
                return Err(MigrateError::MenuParentUnresolved {
                    item: item.id,
                    parent: item.parent_item,
                });
            }
            children.entry(item.parent_item).or_default().push(idx);
        }

        let mut visited = vec![false; items.len()];
        let mut order = Vec::with_capacity(items.len());
        let mut stack: Vec<usize> = children
            .get(&0)
            .map(|roots| roots.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut visited[idx], true) {
                continue;
            }
            order.push(idx);
            if let Some(kids) = children.get(&items[idx].id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        if let Some(stray) = visited.iter().position(|seen| !seen) {
            return Err(MigrateError::MenuCycle(items[stray].id));
        }

        let mut slots: Vec<Option<MenuItem>> = items.into_iter().map(Some).collect();
        let order = order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect();
        Ok(Self { order })
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Lowercase, dash-separated URL segment.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn single_slug(url: &str) -> Option<&str> {
    let path = url.strip_prefix('/')?.trim_end_matches('/');
    (!path.is_empty() && !path.contains('/')).then_some(path)
}

enum Target {
    Record(u64),
    NewRedirector(String),
    Skip,
    Missing(String),
}

struct MenuState {
    records: BTreeMap<u64, TargetRecord>,
}

impl MenuState {
    fn by_legacy_id(&self, legacy_id: u64) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.stamp.is_from(SourceTable::Posts) && r.stamp.legacy_id == legacy_id)
            .map(|r| r.id)
    }

    fn home(&self) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.stamp.is_from(SourceTable::Posts) && r.url_segment == HOME_SEGMENT)
            .map(|r| r.id)
    }

    fn unique_segment(&self, segment: &str) -> Option<u64> {
        let mut found = self
            .records
            .values()
            .filter(|r| r.kind != RecordKind::Redirector && r.url_segment == segment);
        match (found.next(), found.next()) {
            (Some(only), None) => Some(only.id),
            _ => None,
        }
    }

    fn redirector(&self, url: &str) -> Option<u64> {
        self.records
            .values()
            .find(|r| r.kind == RecordKind::Redirector && r.external_url.as_deref() == Some(url))
            .map(|r| r.id)
    }

    fn target_for(&self, item: &MenuItem) -> Target {
        if item.object_id > 0
            && let Some(id) = self.by_legacy_id(item.object_id)
        {
            return Target::Record(id);
        }
        let Some(url) = item.url.as_deref() else {
            return Target::Skip;
        };
        if url == "/" {
            return match self.home() {
                Some(id) => Target::Record(id),
                None => Target::Missing("no migrated page has the home segment".into()),
            };
        }
        if let Some(id) = single_slug(url).and_then(|slug| self.unique_segment(slug)) {
            return Target::Record(id);
        }
        match self.redirector(url) {
            Some(id) => Target::Record(id),
            None => Target::NewRedirector(url.to_string()),
        }
    }
}

/// Existing pages the menu will position.
pub fn menu_placements(store: &dyn TargetStore, forest: &MenuForest) -> Result<HashSet<u64>> {
    let records = store
        .list(Category::Page)?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    let state = MenuState { records };
    Ok(forest
        .items()
        .iter()
        .filter_map(|item| match state.target_for(item) {
            Target::Record(id) => Some(id),
            _ => None,
        })
        .collect())
}

/// Make the page tree follow a legacy navigation menu: parents come from the
/// parent menu item's resolved target, sort from `menu_order`.
pub fn reconcile_menu(
    store: &mut dyn TargetStore,
    forest: &MenuForest,
    root_parent_id: u64,
    report: &mut BatchReport,
) -> Result<()> {
    for mut record in store.list(Category::Page)? {
        if record.stamp.is_legacy() || !record.show_in_menus {
            continue;
        }
        record.show_in_menus = false;
        record.stamp = MigrationStamp::marker();
        writer::upsert(store, &mut record, PublishPolicy::IfLegacyPublished(false), report);
    }

    let records = store
        .list(Category::Page)?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    let mut state = MenuState { records };
    let mut resolved: HashMap<u64, u64> = HashMap::new();
    let mut used: HashSet<u64> = HashSet::new();

    for item in forest.items() {
        let parent_id = if item.parent_item == 0 {
            root_parent_id
        } else {
            *resolved
                .get(&item.parent_item)
                .ok_or(MigrateError::MenuParentUnresolved {
                    item: item.id,
                    parent: item.parent_item,
                })?
        };

        let mut record = match state.target_for(item) {
            Target::Record(id) => match state.records.get(&id) {
                Some(record) => record.clone(),
                None => continue,
            },
            Target::NewRedirector(url) => TargetRecord {
                url_segment: slugify(&item.title),
                external_url: Some(url),
                ..TargetRecord::new(RecordKind::Redirector)
            },
            Target::Skip => {
                report.notice(
                    DiagnosticKind::MenuItemSkipped,
                    &item.source,
                    format!(
                        "\"{}\" menu item #{} (sort {}) has no page or url; skipping",
                        item.item_type, item.id, item.sort
                    ),
                );
                continue;
            }
            Target::Missing(reason) => {
                report.error(
                    DiagnosticKind::MenuItemSkipped,
                    &item.source,
                    format!("unable to find a record for menu item #{}: {reason}", item.id),
                );
                continue;
            }
        };

        if record.exists() && !used.insert(record.id) {
            report.error(
                DiagnosticKind::MenuItemDuplicate,
                &record,
                format!("already used {} in this menu", record.label()),
            );
            resolved.insert(item.id, record.id);
            continue;
        }

        if record.kind == RecordKind::Redirector {
            record.stamp = MigrationStamp::from_legacy(&item.source);
        }
        record.parent_id = parent_id;
        record.menu_title = Some(item.title.clone());
        if record.kind == RecordKind::Redirector && record.title.is_empty() {
            record.title = item.title.clone();
        }
        record.show_in_menus = true;
        record.sort = item.sort;

        let outcome = writer::upsert(store, &mut record, PublishPolicy::Always, report);
        if outcome == WriteOutcome::Failed && !record.exists() {
            continue;
        }
        used.insert(record.id);
        resolved.insert(item.id, record.id);
        state.records.insert(record.id, record);
    }
    Ok(())
}
