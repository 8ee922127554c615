//! In-process peer collection
//!
//! Same semantics as the RocksDB engine, without persistence. Meant for
//! schedulers and services that want a registry in their own tests.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::query::sort_records;
use super::{
    natural_key, IndexSpec, PeerCollection, PeerQuery, PeerUpdate, SortKey, StorageError,
    UpdateResult,
};
use crate::peers::record::PeerRecord;

#[derive(Default)]
struct Inner {
    records: BTreeMap<(String, String), PeerRecord>,
    indexes: Vec<IndexSpec>,
}

impl Inner {
    /// Name of the first unique constraint `record` would violate
    fn unique_violation(&self, record: &PeerRecord, own_key: Option<&(String, String)>) -> Option<String> {
        let key = natural_key(record);
        if own_key != Some(&key) && self.records.contains_key(&key) {
            return Some("primary".to_string());
        }

        self.indexes
            .iter()
            .filter(|spec| spec.unique && spec.covers(record))
            .find(|spec| {
                let encoded = spec.encode(record);
                self.records.iter().any(|(other_key, other)| {
                    Some(other_key) != own_key && spec.covers(other) && spec.encode(other) == encoded
                })
            })
            .map(|spec| spec.name.clone())
    }

    fn update(&mut self, query: &PeerQuery, update: &PeerUpdate, many: bool) -> Result<UpdateResult, StorageError> {
        let keys: Vec<(String, String)> = self
            .records
            .iter()
            .filter(|(_, record)| query.matches(record))
            .map(|(key, _)| key.clone())
            .take(if many { usize::MAX } else { 1 })
            .collect();

        let mut result = UpdateResult::default();
        for key in keys {
            let Some(current) = self.records.get(&key) else {
                continue;
            };
            let mut next = current.clone();
            result.matched += 1;
            if !update.apply(&mut next) {
                continue;
            }
            if let Some(index) = self.unique_violation(&next, Some(&key)) {
                return Err(StorageError::DuplicateKey { index });
            }
            self.records.remove(&key);
            self.records.insert(natural_key(&next), next);
            result.modified += 1;
        }
        Ok(result)
    }
}

/// Peer collection held in memory
#[derive(Default)]
pub struct MemoryPeerCollection {
    inner: RwLock<Inner>,
}

impl MemoryPeerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.inner.read().indexes.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerCollection for MemoryPeerCollection {
    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for spec in indexes {
            match inner.indexes.iter().find(|existing| existing.name == spec.name) {
                Some(existing) if existing == spec => continue,
                Some(_) => {
                    return Err(StorageError::IndexConflict {
                        name: spec.name.clone(),
                    })
                }
                None => inner.indexes.push(spec.clone()),
            }
        }
        Ok(())
    }

    fn insert_one(&self, record: &PeerRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(index) = inner.unique_violation(record, None) {
            return Err(StorageError::DuplicateKey { index });
        }
        inner.records.insert(natural_key(record), record.clone());
        Ok(())
    }

    fn find_one(&self, query: &PeerQuery) -> Result<Option<PeerRecord>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.records.values().find(|record| query.matches(record)).cloned())
    }

    fn find(
        &self,
        query: &PeerQuery,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<PeerRecord>, StorageError> {
        let inner = self.inner.read();
        let mut records: Vec<PeerRecord> = inner
            .records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        sort_records(&mut records, sort);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn count(&self, query: &PeerQuery) -> Result<u64, StorageError> {
        let inner = self.inner.read();
        Ok(inner.records.values().filter(|record| query.matches(record)).count() as u64)
    }

    fn update_one(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError> {
        self.inner.write().update(query, update, false)
    }

    fn update_many(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError> {
        self.inner.write().update(query, update, true)
    }

    fn delete_one(&self, query: &PeerQuery) -> Result<u64, StorageError> {
        let mut inner = self.inner.write();
        let key = inner
            .records
            .iter()
            .find(|(_, record)| query.matches(record))
            .map(|(key, _)| key.clone());

        Ok(match key {
            Some(key) => {
                inner.records.remove(&key);
                1
            }
            None => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::record::Peer;
    use crate::storage::{IndexField, IndexKey};

    fn record(node: &str, id: &str) -> PeerRecord {
        PeerRecord::new(node, Peer::new(id), 1)
    }

    #[test]
    fn test_insert_duplicate_natural_key() {
        let collection = MemoryPeerCollection::new();
        collection.insert_one(&record("n", "p1")).unwrap();
        let err = collection.insert_one(&record("n", "p1")).unwrap_err();
        assert!(err.is_duplicate());

        // Same peer id under another node is a different record
        collection.insert_one(&record("m", "p1")).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_conflicting_index_definition() {
        let collection = MemoryPeerCollection::new();
        let spec = IndexSpec::new("idx", vec![IndexKey::asc(IndexField::PeerId)]);
        collection.create_indexes(&[spec.clone()]).unwrap();
        collection.create_indexes(&[spec.clone()]).unwrap();

        let err = collection.create_indexes(&[spec.unique()]).unwrap_err();
        assert!(matches!(err, StorageError::IndexConflict { .. }));
    }

    #[test]
    fn test_update_one_only_touches_first_match() {
        let collection = MemoryPeerCollection::new();
        collection.insert_one(&record("n", "a")).unwrap();
        collection.insert_one(&record("n", "b")).unwrap();

        let update = PeerUpdate {
            inc_sequence: 1,
            ..Default::default()
        };
        let result = collection.update_one(&PeerQuery::for_node("n"), &update).unwrap();
        assert_eq!(result.matched, 1);

        let result = collection.update_many(&PeerQuery::for_node("n"), &update).unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(result.modified, 2);

        let a = collection.find_one(&PeerQuery::for_node("n").peer_id("a")).unwrap().unwrap();
        assert_eq!(a.peer.sequence, 2);
    }

    #[test]
    fn test_delete_one_reports_count() {
        let collection = MemoryPeerCollection::new();
        collection.insert_one(&record("n", "a")).unwrap();
        let query = PeerQuery::for_node("n").peer_id("a");
        assert_eq!(collection.delete_one(&query).unwrap(), 1);
        assert_eq!(collection.delete_one(&query).unwrap(), 0);
        assert!(collection.is_empty());
    }
}
