//! The memory store
//!
//! Single authoritative owner of record lifetime. Secondary indexes, the
//! connection graph, and the tier lists hold only ids; every mutation path
//! runs through here inside one critical section, so observers never see a
//! record in an index that the store no longer owns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::events::{EventBus, MemoryEvent};
use crate::gateway::PersistenceGateway;
use crate::graph::ConnectionGraph;
use crate::index::{IndexManager, IndexSizes};
use crate::record::{MemoryRecord, RecordDraft, RecordId, RecordPatch};
use crate::search::{self, SearchCriteria};
use crate::snapshot::{StoreSnapshot, SNAPSHOT_VERSION};
use crate::tier::{Tier, TierManager};

/// Counts exposed for observability
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub records: usize,
    pub short_term: usize,
    pub long_term: usize,
    pub connections: usize,
    pub by_kind: HashMap<String, usize>,
    pub indexes: IndexSizes,
}

/// What a maintenance pass evicted
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    pub short_term_evicted: usize,
    pub long_term_evicted: usize,
}

impl MaintenanceReport {
    pub fn evicted(&self) -> usize {
        self.short_term_evicted + self.long_term_evicted
    }
}

/// Everything behind the store's single consistency boundary
struct StoreInner {
    records: HashMap<RecordId, MemoryRecord>,
    indexes: IndexManager,
    graph: ConnectionGraph,
    tiers: TierManager,
    last_indexed_at: DateTime<Utc>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            indexes: IndexManager::new(),
            graph: ConnectionGraph::new(),
            tiers: TierManager::new(),
            last_indexed_at: Utc::now(),
        }
    }

    /// Remove a record and every derived reference to it
    ///
    /// Indexes, touching edges, neighbor back-references, and tier
    /// membership all go in the same call; this is the only deletion path.
    fn delete_record(&mut self, id: RecordId) -> bool {
        if self.records.remove(&id).is_none() {
            return false;
        }
        self.indexes.remove(id);
        for neighbor in self.graph.remove_record(id) {
            if let Some(record) = self.records.get_mut(&neighbor) {
                record.connections.retain(|c| *c != id);
            }
        }
        self.tiers.remove(id);
        true
    }
}

/// Tiered, indexed, in-process knowledge store
///
/// All operations are short, synchronous, in-memory critical sections;
/// events are published only after the write lock is released so handlers
/// may re-enter the store.
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
    events: EventBus,
    config: MemoryConfig,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner::new()),
            events: EventBus::new(),
            config,
        }
    }

    /// The store's event bus, for subscribing to notifications
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Create a record; it starts in the short-term tier
    pub fn create(&self, draft: RecordDraft) -> MemoryRecord {
        let now = Utc::now();
        let confidence = MemoryRecord::initial_confidence(
            &draft.payload,
            &draft.tags,
            self.config.is_trusted_source(&draft.source),
        );
        let record = MemoryRecord {
            id: RecordId::new(),
            kind: draft.kind,
            payload: draft.payload,
            created_at: now,
            last_updated_at: now,
            connections: vec![],
            source: draft.source,
            tags: draft.tags,
            importance: draft.importance,
            confidence,
            access_count: 0,
        };

        let mut guard = self.inner.write();
        guard.indexes.insert(&record);
        guard.tiers.insert_short_term(record.id);
        guard.records.insert(record.id, record.clone());
        drop(guard);

        tracing::debug!(id = %record.id, kind = %record.kind, "record created");
        self.events
            .publish(&MemoryEvent::RecordCreated { id: record.id, at: now });
        record
    }

    /// Fetch a record without touching its access stats
    pub fn get(&self, id: RecordId) -> Option<MemoryRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Read a record, counting the access
    ///
    /// Bumps the access count, recomputes confidence, and re-indexes, since
    /// the access and confidence buckets may have shifted. Unknown ids are
    /// an expected outcome, not an error.
    pub fn read(&self, id: RecordId) -> Option<MemoryRecord> {
        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let record = inner.records.get_mut(&id)?;
        record.access_count += 1;
        record.refresh_confidence(now);
        let updated = record.clone();
        inner.indexes.update(&updated);
        drop(guard);
        Some(updated)
    }

    /// Merge a partial update into a record
    pub fn update(&self, id: RecordId, patch: RecordPatch) -> Option<MemoryRecord> {
        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let record = inner.records.get_mut(&id)?;
        if let Some(payload) = patch.payload {
            record.payload = payload;
        }
        if let Some(source) = patch.source {
            record.source = source;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        if let Some(importance) = patch.importance {
            record.importance = importance;
        }
        record.last_updated_at = now;
        let updated = record.clone();
        inner.indexes.update(&updated);
        drop(guard);

        self.events
            .publish(&MemoryEvent::RecordUpdated { id, at: now });
        Some(updated)
    }

    /// Delete a record and all derived references
    pub fn delete(&self, id: RecordId) -> bool {
        let deleted = self.inner.write().delete_record(id);
        if deleted {
            tracing::debug!(id = %id, "record deleted");
            self.events
                .publish(&MemoryEvent::RecordDeleted { id, at: Utc::now() });
        }
        deleted
    }

    /// Connect two records with a weighted, undirected edge
    ///
    /// Returns false with no side effect when either endpoint is missing or
    /// the endpoints are the same record. Repeat connects refresh the edge
    /// metadata instead of duplicating it.
    pub fn connect(
        &self,
        a: RecordId,
        b: RecordId,
        kind: impl Into<String>,
        strength: f64,
    ) -> bool {
        if a == b {
            return false;
        }
        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if !inner.records.contains_key(&a) || !inner.records.contains_key(&b) {
            return false;
        }
        inner.graph.upsert(a, b, kind, strength, now);
        let record_a = inner.records.get_mut(&a).expect("endpoint checked above");
        if !record_a.connections.contains(&b) {
            record_a.connections.push(b);
        }
        let record_b = inner.records.get_mut(&b).expect("endpoint checked above");
        if !record_b.connections.contains(&a) {
            record_b.connections.push(a);
        }
        drop(guard);

        self.events
            .publish(&MemoryEvent::RecordsConnected { a, b, at: now });
        true
    }

    /// Neighbors of a record, strongest edges first
    pub fn related(&self, id: RecordId, limit: usize) -> Vec<(MemoryRecord, f64)> {
        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(record) = inner.records.get(&id) else {
            return Vec::new();
        };
        let neighbors = record.connections.clone();

        let mut entries = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(strength) = inner.graph.strength(id, neighbor) else {
                continue;
            };
            inner.graph.touch(id, neighbor, now);
            if let Some(neighbor_record) = inner.records.get(&neighbor) {
                entries.push((neighbor_record.clone(), strength));
            }
        }
        drop(guard);

        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(limit);
        entries
    }

    /// Promote a short-term record to long-term
    ///
    /// Recomputes importance for long-term retention and re-indexes.
    /// Returns false (membership unchanged) unless the record is currently
    /// short-term.
    pub fn promote(&self, id: RecordId) -> bool {
        let now = Utc::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(record) = inner.records.get(&id) else {
            return false;
        };
        if inner.tiers.tier_of(id) != Some(Tier::ShortTerm) {
            return false;
        }
        let importance = record.long_term_importance(now);
        inner.tiers.promote(id);
        let record = inner.records.get_mut(&id).expect("record checked above");
        record.importance = importance;
        let updated = record.clone();
        inner.indexes.update(&updated);
        drop(guard);

        tracing::debug!(id = %id, importance, "promoted to long-term");
        self.events
            .publish(&MemoryEvent::PromotedToLongTerm { id, at: now });
        true
    }

    /// Run both tiers' eviction policies
    ///
    /// Every drop is a full delete: the record disappears from the store,
    /// the indexes, and the graph in one critical section.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let short_victims = inner.tiers.plan_short_term_eviction(&inner.records, &self.config);
        for id in &short_victims {
            inner.delete_record(*id);
        }
        let long_victims = inner.tiers.plan_long_term_eviction(&inner.records, &self.config);
        for id in &long_victims {
            inner.delete_record(*id);
        }
        drop(guard);

        let report = MaintenanceReport {
            short_term_evicted: short_victims.len(),
            long_term_evicted: long_victims.len(),
        };
        let now = Utc::now();
        for id in short_victims.into_iter().chain(long_victims) {
            self.events
                .publish(&MemoryEvent::RecordDeleted { id, at: now });
        }
        self.events.publish(&MemoryEvent::StoreOptimized {
            evicted: report.evicted(),
            at: now,
        });
        if report.evicted() > 0 {
            tracing::info!(
                short_term = report.short_term_evicted,
                long_term = report.long_term_evicted,
                "maintenance evicted records"
            );
        }
        report
    }

    /// Search the store, best matches first
    ///
    /// Candidates come from the secondary indexes; scoring never mutates
    /// the store, so identical calls against an unchanged store return
    /// identical orderings. `limit` defaults to the configured bound.
    pub fn search(&self, criteria: &SearchCriteria, limit: Option<usize>) -> Vec<MemoryRecord> {
        let guard = self.inner.read();
        let candidates: Vec<MemoryRecord> = guard
            .indexes
            .candidates(criteria)
            .into_iter()
            .filter_map(|id| guard.records.get(&id).cloned())
            .collect();
        drop(guard);

        search::rank(candidates, criteria, limit.unwrap_or(self.config.search_limit))
    }

    /// Counts and index sizes for observability
    pub fn stats(&self) -> MemoryStats {
        let guard = self.inner.read();
        debug_assert_eq!(guard.indexes.len(), guard.records.len());
        let mut by_kind: HashMap<String, usize> = HashMap::new();
        for record in guard.records.values() {
            *by_kind.entry(record.kind.as_str().to_string()).or_insert(0) += 1;
        }
        MemoryStats {
            records: guard.records.len(),
            short_term: guard.tiers.short_term_len(),
            long_term: guard.tiers.long_term_len(),
            connections: guard.graph.len(),
            by_kind,
            indexes: guard.indexes.sizes(),
        }
    }

    /// Rebuild every secondary index from the record map
    ///
    /// Recovery hatch: callable at any time without data loss.
    pub fn rebuild(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.indexes.rebuild(&inner.records);
        inner.last_indexed_at = Utc::now();
    }

    /// Drop every record and derived structure
    pub fn clear(&self) {
        *self.inner.write() = StoreInner::new();
    }

    /// Capture a serializable image of the store
    pub fn snapshot(&self) -> StoreSnapshot {
        let guard = self.inner.read();
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            records: guard.records.values().cloned().collect(),
            connections: guard.graph.connections().cloned().collect(),
            short_term: guard.tiers.short_term().to_vec(),
            long_term: guard.tiers.long_term().to_vec(),
            last_indexed_at: guard.last_indexed_at,
        }
    }

    /// Save a snapshot through the persistence gateway
    pub async fn save_to(&self, gateway: &dyn PersistenceGateway, scope: &str) -> Result<()> {
        let snapshot = self.snapshot();
        gateway.save(scope, &snapshot).await
    }

    /// Load store state through the persistence gateway
    ///
    /// A missing, unreadable, or structurally invalid snapshot leaves the
    /// store empty rather than failing: persistence problems are
    /// recoverable by design. Returns the number of records loaded.
    pub async fn load_from(&self, gateway: &dyn PersistenceGateway, scope: &str) -> usize {
        let loaded = match gateway.load(scope).await {
            Ok(Some(snapshot)) => match snapshot.validate() {
                Ok(()) => {
                    let count = snapshot.records.len();
                    self.apply_snapshot(snapshot);
                    tracing::info!(records = count, scope, "loaded store snapshot");
                    count
                }
                Err(e) => {
                    tracing::warn!(scope, error = %e, "snapshot failed validation; starting empty");
                    0
                }
            },
            Ok(None) => {
                tracing::debug!(scope, "no snapshot found; starting empty");
                0
            }
            Err(e) => {
                tracing::warn!(scope, error = %e, "snapshot load failed; starting empty");
                0
            }
        };

        self.events.publish(&MemoryEvent::StoreInitialized {
            records: loaded,
            at: Utc::now(),
        });
        loaded
    }

    fn apply_snapshot(&self, snapshot: StoreSnapshot) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.records = snapshot
            .records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        inner.graph.restore(snapshot.connections);
        inner.tiers.restore(snapshot.short_term, snapshot.long_term);
        // Indexes are derived state; rebuilding from the loaded records
        // guarantees index/store consistency regardless of snapshot age.
        inner.indexes.rebuild(&inner.records);
        inner.last_indexed_at = Utc::now();
    }
}
