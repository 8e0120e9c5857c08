//! Snapshot schema for persistence
//!
//! A versioned, serializable image of the live store: records, connections,
//! tier membership, and the last-indexed timestamp. The mapping between
//! store state and snapshot is pure and independent of any serialization
//! format; gateways choose the encoding.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::graph::Connection;
use crate::record::{MemoryRecord, RecordId};

/// Current snapshot schema version
///
/// Unknown versions are rejected wholesale; the store then starts empty
/// rather than partially applying a shape it does not understand.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of the whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub records: Vec<MemoryRecord>,
    pub connections: Vec<Connection>,
    pub short_term: Vec<RecordId>,
    pub long_term: Vec<RecordId>,
    pub last_indexed_at: DateTime<Utc>,
}

impl StoreSnapshot {
    /// An empty snapshot at the current version
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records: Vec::new(),
            connections: Vec::new(),
            short_term: Vec::new(),
            long_term: Vec::new(),
            last_indexed_at: Utc::now(),
        }
    }

    /// Structural validation
    ///
    /// Checks the version, record id uniqueness, that every connection
    /// endpoint and tier member refers to a snapshot record, and that each
    /// record sits in exactly one tier. A snapshot failing any check is
    /// rejected as a whole.
    pub fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(MemoryError::snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        let mut ids = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !ids.insert(record.id) {
                return Err(MemoryError::snapshot(format!(
                    "duplicate record id {}",
                    record.id
                )));
            }
        }

        for edge in &self.connections {
            if !ids.contains(&edge.a) || !ids.contains(&edge.b) {
                return Err(MemoryError::snapshot(format!(
                    "connection {}-{} references a missing record",
                    edge.a, edge.b
                )));
            }
        }

        let mut tiered = HashSet::with_capacity(ids.len());
        for id in self.short_term.iter().chain(self.long_term.iter()) {
            if !ids.contains(id) {
                return Err(MemoryError::snapshot(format!(
                    "tier member {id} references a missing record"
                )));
            }
            if !tiered.insert(*id) {
                return Err(MemoryError::snapshot(format!(
                    "record {id} appears in more than one tier"
                )));
            }
        }
        if tiered.len() != ids.len() {
            return Err(MemoryError::snapshot(
                "every record must belong to exactly one tier",
            ));
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;
    use serde_json::json;

    fn record() -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: RecordId::new(),
            kind: RecordKind::Knowledge,
            payload: json!({"text": "snapshot fixture"}),
            created_at: now,
            last_updated_at: now,
            connections: vec![],
            source: "system".into(),
            tags: vec![],
            importance: 0.5,
            confidence: 0.5,
            access_count: 0,
        }
    }

    fn valid_snapshot() -> StoreSnapshot {
        let a = record();
        let b = record();
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            short_term: vec![a.id],
            long_term: vec![b.id],
            connections: vec![Connection {
                a: a.id,
                b: b.id,
                kind: "related".into(),
                strength: 0.5,
                bidirectional: true,
                last_accessed: Utc::now(),
                access_count: 0,
            }],
            records: vec![a, b],
            last_indexed_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_snapshot_passes() {
        valid_snapshot().validate().unwrap();
    }

    #[test]
    fn test_empty_snapshot_passes() {
        StoreSnapshot::empty().validate().unwrap();
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.version = 99;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_dangling_connection_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.connections[0].b = RecordId::new();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_record_in_both_tiers_rejected() {
        let mut snapshot = valid_snapshot();
        let id = snapshot.records[0].id;
        snapshot.long_term.push(id);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_untiered_record_rejected() {
        let mut snapshot = valid_snapshot();
        snapshot.short_term.clear();
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_duplicate_record_id_rejected() {
        let mut snapshot = valid_snapshot();
        let duplicate = snapshot.records[0].clone();
        snapshot.records.push(duplicate);
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = valid_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: StoreSnapshot = serde_json::from_str(&json).unwrap();
        decoded.validate().unwrap();
        assert_eq!(decoded.records.len(), snapshot.records.len());
    }
}
