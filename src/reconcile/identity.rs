use std::collections::HashMap;

use crate::error::{MigrateError, Result};
use crate::model::{Category, SourceTable, TargetRecord};
use crate::store::TargetStore;

/// Snapshot lookup from legacy identity to target identity for one source
/// table. Rebuild it in every pass that needs it.
#[derive(Debug, Clone)]
pub struct IdentityMap {
    table: SourceTable,
    root_parent_id: u64,
    entries: HashMap<u64, u64>,
}

impl IdentityMap {
    pub fn build(
        store: &dyn TargetStore,
        category: Category,
        table: SourceTable,
        root_parent_id: u64,
    ) -> Result<Self> {
        let records = store.list(category)?;
        Self::from_records(&records, table, root_parent_id)
    }

    pub fn from_records(
        records: &[TargetRecord],
        table: SourceTable,
        root_parent_id: u64,
    ) -> Result<Self> {
        let mut entries = HashMap::with_capacity(records.len());
        for record in records.iter().filter(|r| r.stamp.is_from(table)) {
            if let Some(first) = entries.insert(record.stamp.legacy_id, record.id) {
                return Err(MigrateError::IdentityCollision {
                    table: table.to_string(),
                    legacy_id: record.stamp.legacy_id,
                    first,
                    second: record.id,
                });
            }
        }
        Ok(Self {
            table,
            root_parent_id,
            entries,
        })
    }

    pub fn table(&self) -> SourceTable {
        self.table
    }

    /// Legacy id 0 is the reserved "no parent" identity and maps to the root.
    pub fn resolve(&self, legacy_id: u64) -> Option<u64> {
        if legacy_id == 0 {
            return Some(self.root_parent_id);
        }
        self.entries.get(&legacy_id).copied()
    }

    pub fn contains(&self, legacy_id: u64) -> bool {
        legacy_id != 0 && self.entries.contains_key(&legacy_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Existing migrated records of `table`, keyed by legacy id.
pub fn records_by_legacy_id(
    records: Vec<TargetRecord>,
    table: SourceTable,
) -> Result<HashMap<u64, TargetRecord>> {
    let mut by_id: HashMap<u64, TargetRecord> = HashMap::new();
    for record in records.into_iter().filter(|r| r.stamp.is_from(table)) {
        let legacy_id = record.stamp.legacy_id;
        let second = record.id;
        if let Some(first) = by_id.insert(legacy_id, record) {
            return Err(MigrateError::IdentityCollision {
                table: table.to_string(),
                legacy_id,
                first: first.id,
                second,
            });
        }
    }
    Ok(by_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MigrationStamp, RecordKind};

    fn migrated(id: u64, table: SourceTable, legacy_id: u64) -> TargetRecord {
        TargetRecord {
            id,
            stamp: MigrationStamp {
                source_table: Some(table),
                legacy_id,
                ..MigrationStamp::default()
            },
            ..TargetRecord::new(RecordKind::Page)
        }
    }

    #[test]
    fn resolves_only_its_own_table() {
        let records = vec![
            migrated(10, SourceTable::Posts, 5),
            migrated(11, SourceTable::RgForm, 5),
            TargetRecord {
                id: 12,
                ..TargetRecord::new(RecordKind::Page)
            },
        ];
        let map = IdentityMap::from_records(&records, SourceTable::Posts, 0).unwrap();
        assert_eq!(map.resolve(5), Some(10));
        assert_eq!(map.resolve(6), None);
        assert_eq!(map.len(), 1);
        assert!(map.contains(5));
    }

    #[test]
    fn reserved_zero_maps_to_root() {
        let map = IdentityMap::from_records(&[], SourceTable::Posts, 42).unwrap();
        assert_eq!(map.resolve(0), Some(42));
        assert!(!map.contains(0));
    }

    #[test]
    fn duplicate_claim_is_a_collision() {
        let records = vec![
            migrated(10, SourceTable::Posts, 5),
            migrated(20, SourceTable::Posts, 5),
        ];
        let err = IdentityMap::from_records(&records, SourceTable::Posts, 0).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::IdentityCollision { legacy_id: 5, first: 10, second: 20, .. }
        ));
        assert!(records_by_legacy_id(records, SourceTable::Posts).is_err());
    }
}
