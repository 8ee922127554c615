//! Peer Collection Storage (RocksDB)
//!
//! Persistent peer records plus their secondary index entries. A record and
//! its index entries are always written in one atomic batch, and mutations
//! are serialized so every conditional update is evaluated against the
//! latest committed document.
//!
//! Key layout, for a collection named `C`:
//!
//! ```text
//! C/doc/<ledgerNodeId><peerId>        bincode PeerRecord
//! C/idx/<index>/<encoded key>[<doc>]  doc key (doc suffix only on non-unique)
//! C/meta/indexes                      bincode Vec<IndexSpec>
//! ```
//!
//! Reads are planned against the declared indexes: flag queries walk a
//! partial index, reputation-bounded queries seek inside a reputation
//! ordered index and stop at the bound. Records that fail to decode are
//! errors, never skipped.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use tracing::{debug, info};

use super::index::encode_str;
use super::query::sort_records;
use super::{
    Database, IndexDirection, IndexField, IndexSpec, IndexValue, PartialFilter, PeerCollection,
    PeerQuery, PeerUpdate, RangeFilter, SortKey, StorageError, UpdateResult, WriteOp,
};
use crate::peers::record::PeerRecord;
use crate::types::Reputation;

const DOC_SEGMENT: &[u8] = b"/doc/";
const INDEX_SEGMENT: &[u8] = b"/idx/";
const META_INDEXES: &[u8] = b"/meta/indexes";

/// Peer collection backed by RocksDB
pub struct RocksPeerCollection {
    db: Database,

    /// Collection name, used as key namespace
    name: String,

    /// Declared indexes, mirrored from `C/meta/indexes`
    indexes: RwLock<Vec<IndexSpec>>,

    /// Serializes read-modify-write mutations
    write_lock: Mutex<()>,
}

impl RocksPeerCollection {
    /// Open the collection `name` inside an already opened database
    pub fn open(db: Database, name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();

        let indexes: Vec<IndexSpec> = match db.get(&namespaced(&name, META_INDEXES))? {
            Some(data) => bincode::deserialize(&data)
                .map_err(|e| StorageError::Deserialization(e.to_string()))?,
            None => Vec::new(),
        };

        info!("📦 Opened peer collection {} ({} indexes)", name, indexes.len());

        Ok(Self {
            db,
            name,
            indexes: RwLock::new(indexes),
            write_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently declared indexes
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.indexes.read().clone()
    }

    /// Number of entries materialized for index `name`
    pub fn index_entry_count(&self, name: &str) -> Result<usize, StorageError> {
        let prefix = self.index_prefix(name);
        let mut count = 0;
        for item in self.db.prefix_iterator(&prefix) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush all changes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()
    }

    fn doc_prefix(&self, ledger_node_id: &str) -> Vec<u8> {
        let mut key = namespaced(&self.name, DOC_SEGMENT);
        encode_str(ledger_node_id, &mut key);
        key
    }

    fn doc_key(&self, record: &PeerRecord) -> Vec<u8> {
        let mut key = self.doc_prefix(&record.meta.ledger_node_id);
        encode_str(&record.peer.id, &mut key);
        key
    }

    fn index_prefix(&self, index_name: &str) -> Vec<u8> {
        let mut key = namespaced(&self.name, INDEX_SEGMENT);
        key.extend_from_slice(index_name.as_bytes());
        key.push(b'/');
        key
    }

    fn index_entry_key(&self, spec: &IndexSpec, record: &PeerRecord) -> Vec<u8> {
        let mut key = self.index_prefix(&spec.name);
        key.extend_from_slice(&spec.encode(record));
        if !spec.unique {
            key.extend_from_slice(&self.doc_key(record));
        }
        key
    }

    fn index_ops(&self, indexes: &[IndexSpec], record: &PeerRecord, put: bool, ops: &mut Vec<WriteOp>) {
        for spec in indexes.iter().filter(|spec| spec.covers(record)) {
            let key = self.index_entry_key(spec, record);
            if put {
                ops.push(WriteOp::Put {
                    key,
                    value: self.doc_key(record),
                });
            } else {
                ops.push(WriteOp::Delete { key });
            }
        }
    }

    /// Reject `record` if a unique index entry already points at another document
    fn check_unique(
        &self,
        indexes: &[IndexSpec],
        record: &PeerRecord,
        own_doc_key: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        for spec in indexes.iter().filter(|spec| spec.unique && spec.covers(record)) {
            if let Some(owner) = self.db.get(&self.index_entry_key(spec, record))? {
                if Some(owner.as_slice()) != own_doc_key {
                    return Err(StorageError::DuplicateKey {
                        index: spec.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Choose how candidates for `query` are located
    ///
    /// A flag query uses a partial index over flagged records; a single id
    /// is a point lookup; a reputation filter seeks inside an index led by
    /// (ledger node, reputation). Anything else scans the node's documents.
    fn plan(&self, query: &PeerQuery) -> ScanPlan {
        let indexes = self.indexes.read();
        let node = IndexValue::Str(&query.ledger_node_id);

        if query.pulled_after_push == Some(true) {
            let flagged = indexes.iter().find(|spec| {
                spec.partial == Some(PartialFilter::PulledAfterPush(true))
                    && spec.leads_with(&[IndexField::LedgerNodeId])
            });
            if let Some(spec) = flagged {
                let mut values = vec![node];
                if let Some(peer_id) = query.single_peer_id() {
                    if spec.leads_with(&[IndexField::LedgerNodeId, IndexField::PeerId]) {
                        values.push(IndexValue::Str(peer_id));
                    }
                }
                let mut prefix = self.index_prefix(&spec.name);
                prefix.extend_from_slice(&spec.encode_prefix(&values));
                return ScanPlan::IndexPrefix {
                    index: spec.name.clone(),
                    prefix,
                };
            }
        }

        if let Some(peer_id) = query.single_peer_id() {
            let mut key = self.doc_prefix(&query.ledger_node_id);
            encode_str(peer_id, &mut key);
            return ScanPlan::Document(key);
        }

        if let Some(range) = &query.reputation {
            let ordered = indexes.iter().find(|spec| {
                spec.partial.is_none()
                    && spec.leads_with(&[IndexField::LedgerNodeId, IndexField::Reputation])
            });
            if let Some(spec) = ordered {
                let Some((lower, upper)) = inclusive_bounds(range) else {
                    return ScanPlan::Empty;
                };
                let mut node_prefix = self.index_prefix(&spec.name);
                node_prefix.extend_from_slice(&spec.encode_prefix(&[node]));
                return ScanPlan::ReputationRange {
                    index: spec.clone(),
                    node_prefix,
                    lower,
                    upper,
                };
            }
        }

        ScanPlan::NodeScan
    }

    /// Documents that may match `query`, in natural key order
    fn candidates(&self, query: &PeerQuery) -> Result<Vec<(Vec<u8>, PeerRecord)>, StorageError> {
        match self.plan(query) {
            ScanPlan::Empty => Ok(Vec::new()),
            ScanPlan::Document(key) => Ok(match self.db.get(&key)? {
                Some(data) => {
                    let record = decode(&key, &data)?;
                    vec![(key, record)]
                }
                None => Vec::new(),
            }),
            ScanPlan::NodeScan => {
                let prefix = self.doc_prefix(&query.ledger_node_id);
                let mut records = Vec::new();
                for item in self.db.prefix_iterator(&prefix) {
                    let (key, value) = item?;
                    let record = decode(&key, &value)?;
                    records.push((key, record));
                }
                Ok(records)
            }
            ScanPlan::IndexPrefix { index, prefix } => {
                let mut doc_keys = Vec::new();
                for item in self.db.prefix_iterator(&prefix) {
                    let (_, doc_key) = item?;
                    doc_keys.push(doc_key);
                }
                self.load(&index, doc_keys)
            }
            ScanPlan::ReputationRange {
                index,
                node_prefix,
                lower,
                upper,
            } => {
                let descending = index.keys[1].direction == IndexDirection::Descending;
                let seek = if descending { upper } else { lower };
                let start = match seek {
                    Some(reputation) => {
                        let mut start = self.index_prefix(&index.name);
                        start.extend_from_slice(&index.encode_prefix(&[
                            IndexValue::Str(&query.ledger_node_id),
                            IndexValue::Reputation(reputation),
                        ]));
                        start
                    }
                    None => node_prefix.clone(),
                };

                let mut doc_keys = Vec::new();
                for item in self.db.prefix_iterator_from(&node_prefix, &start) {
                    let (key, doc_key) = item?;
                    let reputation = index
                        .decode_reputation(1, &key, node_prefix.len())
                        .ok_or_else(|| {
                            StorageError::Deserialization(format!(
                                "malformed entry {} in index {}",
                                hex::encode(&key),
                                index.name
                            ))
                        })?;
                    let past_end = if descending {
                        lower.map_or(false, |lower| reputation < lower)
                    } else {
                        upper.map_or(false, |upper| reputation > upper)
                    };
                    if past_end {
                        break;
                    }
                    doc_keys.push(doc_key);
                }
                self.load(&index.name, doc_keys)
            }
        }
    }

    /// Fetch the documents referenced by index entries, in natural key order
    fn load(&self, index: &str, mut doc_keys: Vec<Vec<u8>>) -> Result<Vec<(Vec<u8>, PeerRecord)>, StorageError> {
        doc_keys.sort();
        doc_keys.dedup();

        let mut records = Vec::with_capacity(doc_keys.len());
        for key in doc_keys {
            let data = self.db.get(&key)?.ok_or_else(|| {
                StorageError::ReadFailed(format!(
                    "index {} references missing peer record {}",
                    index,
                    hex::encode(&key)
                ))
            })?;
            let record = decode(&key, &data)?;
            records.push((key, record));
        }
        Ok(records)
    }

    fn matching(&self, query: &PeerQuery) -> Result<Vec<(Vec<u8>, PeerRecord)>, StorageError> {
        Ok(self
            .candidates(query)?
            .into_iter()
            .filter(|(_, record)| query.matches(record))
            .collect())
    }

    fn update_matching(
        &self,
        query: &PeerQuery,
        update: &PeerUpdate,
        limit: usize,
    ) -> Result<UpdateResult, StorageError> {
        let _guard = self.write_lock.lock();
        let indexes = self.indexes.read().clone();
        let mut result = UpdateResult::default();

        for (key, current) in self.matching(query)?.into_iter().take(limit) {
            result.matched += 1;

            let mut next = current.clone();
            if !update.apply(&mut next) {
                continue;
            }

            let next_key = self.doc_key(&next);
            if next_key != key && self.db.exists(&next_key)? {
                return Err(StorageError::DuplicateKey {
                    index: "primary".to_string(),
                });
            }
            self.check_unique(&indexes, &next, Some(&key))?;

            let mut ops = Vec::new();
            self.index_ops(&indexes, &current, false, &mut ops);
            if next_key != key {
                ops.push(WriteOp::Delete { key });
            }
            ops.push(WriteOp::Put {
                key: next_key,
                value: encode(&next)?,
            });
            self.index_ops(&indexes, &next, true, &mut ops);

            self.db.batch_write(ops)?;
            result.modified += 1;
        }

        debug!(
            "Peer update on {}: matched={} modified={}",
            query.ledger_node_id, result.matched, result.modified
        );

        Ok(result)
    }
}

impl PeerCollection for RocksPeerCollection {
    fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut declared = self.indexes.read().clone();

        let mut added = Vec::new();
        for spec in indexes {
            match declared.iter().find(|existing| existing.name == spec.name) {
                Some(existing) if existing == spec => continue,
                Some(_) => {
                    return Err(StorageError::IndexConflict {
                        name: spec.name.clone(),
                    })
                }
                None => added.push(spec.clone()),
            }
        }

        if added.is_empty() {
            return Ok(());
        }

        // Backfill entries for documents already present
        let all_docs = namespaced(&self.name, DOC_SEGMENT);
        let mut ops = Vec::new();
        let mut seen_unique: HashSet<Vec<u8>> = HashSet::new();
        for item in self.db.prefix_iterator(&all_docs) {
            let (key, value) = item?;
            let record = decode(&key, &value)?;
            for spec in added.iter().filter(|spec| spec.covers(&record)) {
                let key = self.index_entry_key(spec, &record);
                if spec.unique && !seen_unique.insert(key.clone()) {
                    return Err(StorageError::DuplicateKey {
                        index: spec.name.clone(),
                    });
                }
                ops.push(WriteOp::Put {
                    key,
                    value: self.doc_key(&record),
                });
            }
        }

        for spec in &added {
            info!("🗂️  Created index {} on {} ({})", spec.name, self.name, spec.describe());
        }
        declared.extend(added);

        ops.push(WriteOp::Put {
            key: namespaced(&self.name, META_INDEXES),
            value: bincode::serialize(&declared)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        });
        self.db.batch_write(ops)?;

        *self.indexes.write() = declared;
        Ok(())
    }

    fn insert_one(&self, record: &PeerRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let indexes = self.indexes.read().clone();

        let key = self.doc_key(record);
        if self.db.exists(&key)? {
            return Err(StorageError::DuplicateKey {
                index: "primary".to_string(),
            });
        }
        self.check_unique(&indexes, record, None)?;

        let mut ops = vec![WriteOp::Put {
            key,
            value: encode(record)?,
        }];
        self.index_ops(&indexes, record, true, &mut ops);
        self.db.batch_write(ops)?;

        debug!(
            "Inserted peer {} for ledger node {}",
            record.peer.id, record.meta.ledger_node_id
        );
        Ok(())
    }

    fn find_one(&self, query: &PeerQuery) -> Result<Option<PeerRecord>, StorageError> {
        Ok(self.matching(query)?.into_iter().next().map(|(_, record)| record))
    }

    fn find(
        &self,
        query: &PeerQuery,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<PeerRecord>, StorageError> {
        let mut records: Vec<PeerRecord> = self
            .matching(query)?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        sort_records(&mut records, sort);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn count(&self, query: &PeerQuery) -> Result<u64, StorageError> {
        Ok(self.matching(query)?.len() as u64)
    }

    fn update_one(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError> {
        self.update_matching(query, update, 1)
    }

    fn update_many(&self, query: &PeerQuery, update: &PeerUpdate) -> Result<UpdateResult, StorageError> {
        self.update_matching(query, update, usize::MAX)
    }

    fn delete_one(&self, query: &PeerQuery) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock();
        let indexes = self.indexes.read().clone();

        let Some((key, record)) = self.matching(query)?.into_iter().next() else {
            return Ok(0);
        };

        let mut ops = vec![WriteOp::Delete { key }];
        self.index_ops(&indexes, &record, false, &mut ops);
        self.db.batch_write(ops)?;

        debug!(
            "Deleted peer {} for ledger node {}",
            record.peer.id, record.meta.ledger_node_id
        );
        Ok(1)
    }
}

fn namespaced(collection: &str, segment: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(collection.len() + segment.len() + 32);
    key.extend_from_slice(collection.as_bytes());
    key.extend_from_slice(segment);
    key
}

fn encode(record: &PeerRecord) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(record).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode(key: &[u8], data: &[u8]) -> Result<PeerRecord, StorageError> {
    bincode::deserialize(data)
        .map_err(|e| StorageError::Deserialization(format!("peer record {}: {}", hex::encode(key), e)))
}

/// Inclusive bounds of `range`, or `None` when no value can satisfy it
fn inclusive_bounds(range: &RangeFilter<Reputation>) -> Option<(Option<Reputation>, Option<Reputation>)> {
    let after = match range.gt {
        Some(value) => Some(value.checked_add(1)?),
        None => None,
    };
    let before = match range.lt {
        Some(value) => Some(value.checked_sub(1)?),
        None => None,
    };
    let lower = after.into_iter().chain(range.gte).max();
    let upper = before.into_iter().chain(range.lte).min();
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            return None;
        }
    }
    Some((lower, upper))
}

/// How candidate documents for a query are located
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanPlan {
    /// Nothing can match
    Empty,
    /// Point lookup of one document key
    Document(Vec<u8>),
    /// Every document of the ledger node
    NodeScan,
    /// Every entry of `index` under `prefix`
    IndexPrefix { index: String, prefix: Vec<u8> },
    /// Entries of a (ledger node, reputation, ..) index within inclusive bounds
    ReputationRange {
        index: IndexSpec,
        node_prefix: Vec<u8>,
        lower: Option<Reputation>,
        upper: Option<Reputation>,
    },
}
