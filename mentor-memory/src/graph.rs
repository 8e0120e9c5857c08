//! Weighted connection graph between records
//!
//! Undirected adjacency with per-edge metadata. The graph holds only ids and
//! edge data; the record store owns the records and mirrors adjacency into
//! each record's `connections` back-reference list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// Canonicalized unordered pair of record ids
///
/// `key(a, b) == key(b, a)`, so one stored edge covers both orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EdgeKey(RecordId, RecordId);

impl EdgeKey {
    fn new(a: RecordId, b: RecordId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// A weighted relationship between two records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub a: RecordId,
    pub b: RecordId,
    /// Free-form relationship label
    pub kind: String,
    pub strength: f64,
    pub bidirectional: bool,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl Connection {
    /// The endpoint that is not `id`, if `id` is an endpoint at all
    pub fn other(&self, id: RecordId) -> Option<RecordId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConnectionGraph {
    edges: HashMap<EdgeKey, Connection>,
}

impl ConnectionGraph {
    pub(crate) fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// Create or refresh the edge between `a` and `b`
    ///
    /// A repeat connect overwrites the edge metadata rather than creating a
    /// duplicate. Returns true when the edge did not exist before.
    pub(crate) fn upsert(
        &mut self,
        a: RecordId,
        b: RecordId,
        kind: impl Into<String>,
        strength: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let key = EdgeKey::new(a, b);
        match self.edges.get_mut(&key) {
            Some(edge) => {
                edge.kind = kind.into();
                edge.strength = strength;
                edge.last_accessed = now;
                false
            }
            None => {
                self.edges.insert(
                    key,
                    Connection {
                        a,
                        b,
                        kind: kind.into(),
                        strength,
                        bidirectional: true,
                        last_accessed: now,
                        access_count: 0,
                    },
                );
                true
            }
        }
    }

    /// Edge strength between two records
    pub(crate) fn strength(&self, a: RecordId, b: RecordId) -> Option<f64> {
        self.edges.get(&EdgeKey::new(a, b)).map(|e| e.strength)
    }

    /// Bump access stats on the edge between two records
    pub(crate) fn touch(&mut self, a: RecordId, b: RecordId, now: DateTime<Utc>) {
        if let Some(edge) = self.edges.get_mut(&EdgeKey::new(a, b)) {
            edge.access_count += 1;
            edge.last_accessed = now;
        }
    }

    /// Drop every edge touching `id`, returning the affected neighbors
    ///
    /// Callers prune the neighbors' `connections` lists with the returned
    /// ids so deletion leaves no dangling back-references.
    pub(crate) fn remove_record(&mut self, id: RecordId) -> Vec<RecordId> {
        let mut neighbors = Vec::new();
        self.edges.retain(|_, edge| match edge.other(id) {
            Some(other) => {
                neighbors.push(other);
                false
            }
            None => true,
        });
        neighbors
    }

    pub(crate) fn len(&self) -> usize {
        self.edges.len()
    }

    /// All edges, for snapshot capture
    pub(crate) fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.edges.values()
    }

    /// Restore edges from a snapshot
    pub(crate) fn restore(&mut self, connections: Vec<Connection>) {
        self.edges.clear();
        for edge in connections {
            self.edges.insert(EdgeKey::new(edge.a, edge.b), edge);
        }
    }
}
