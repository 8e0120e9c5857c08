//! Secondary indexes over the record store
//!
//! Eight index families map derived key values to sets of record ids:
//! kind, tag, source, importance bucket, confidence bucket, access bucket,
//! creation-hour bucket, and payload token. Indexes never own records; every
//! id they hold must refer to a live record, which the single
//! insert/update/remove mutation path preserves mechanically by remembering
//! the exact keys each record is filed under.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{MemoryRecord, RecordId, RecordKind};
use crate::search::SearchCriteria;

/// Tokenize text for the token index and free-text queries
///
/// Lower-cased, whitespace-split, words shorter than three characters
/// dropped.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|s| s.len() > 2)
        .map(String::from)
        .collect()
}

/// Importance/confidence values are bucketed to one decimal
fn decile(value: f64) -> i64 {
    (value * 10.0).round() as i64
}

/// Access counts are bucketed by floor-to-10
fn access_bucket(count: u64) -> u64 {
    (count / 10) * 10
}

/// Timestamps are bucketed by floor-to-hour
fn hour_bucket(at: DateTime<Utc>) -> i64 {
    let ts = at.timestamp();
    ts - ts.rem_euclid(3600)
}

/// One index family: key value to id set, empty buckets dropped
#[derive(Debug)]
struct ValueIndex<K> {
    buckets: HashMap<K, HashSet<RecordId>>,
}

impl<K: Eq + std::hash::Hash> ValueIndex<K> {
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    fn add(&mut self, key: K, id: RecordId) {
        self.buckets.entry(key).or_default().insert(id);
    }

    fn remove(&mut self, key: &K, id: &RecordId) {
        if let Some(set) = self.buckets.get_mut(key) {
            set.remove(id);
            if set.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    fn collect_into(&self, key: &K, out: &mut BTreeSet<RecordId>) {
        if let Some(set) = self.buckets.get(key) {
            out.extend(set.iter().copied());
        }
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

impl<K: Eq + std::hash::Hash + Ord> ValueIndex<K> {
    /// Union every bucket whose key is at least `min` into `out`
    fn collect_at_least(&self, min: &K, out: &mut BTreeSet<RecordId>) {
        for (key, set) in &self.buckets {
            if key >= min {
                out.extend(set.iter().copied());
            }
        }
    }
}

/// The exact keys a record is currently filed under
///
/// Kept per id so that update/remove reconcile set membership without
/// consulting stale record state.
#[derive(Debug, Clone, PartialEq)]
struct RecordKeys {
    kind: RecordKind,
    tags: Vec<String>,
    source: String,
    importance: i64,
    confidence: i64,
    access: u64,
    hour: i64,
    tokens: Vec<String>,
}

impl RecordKeys {
    fn of(record: &MemoryRecord) -> Self {
        let mut tags: Vec<String> = record.tags.clone();
        tags.sort_unstable();
        tags.dedup();

        let mut tokens = tokenize(&record.payload_text());
        tokens.sort_unstable();
        tokens.dedup();

        Self {
            kind: record.kind,
            tags,
            source: record.source.clone(),
            importance: decile(record.importance),
            confidence: decile(record.confidence),
            access: access_bucket(record.access_count),
            hour: hour_bucket(record.created_at),
            tokens,
        }
    }
}

/// Bucket counts per index family, for observability
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexSizes {
    pub kinds: usize,
    pub tags: usize,
    pub sources: usize,
    pub importance: usize,
    pub confidence: usize,
    pub access: usize,
    pub hours: usize,
    pub tokens: usize,
}

/// Maintains every secondary index; never the source of truth
#[derive(Debug)]
pub(crate) struct IndexManager {
    kinds: ValueIndex<RecordKind>,
    tags: ValueIndex<String>,
    sources: ValueIndex<String>,
    importance: ValueIndex<i64>,
    confidence: ValueIndex<i64>,
    access: ValueIndex<u64>,
    hours: ValueIndex<i64>,
    tokens: ValueIndex<String>,
    /// id -> keys the id is currently indexed under
    current: HashMap<RecordId, RecordKeys>,
}

impl IndexManager {
    pub(crate) fn new() -> Self {
        Self {
            kinds: ValueIndex::new(),
            tags: ValueIndex::new(),
            sources: ValueIndex::new(),
            importance: ValueIndex::new(),
            confidence: ValueIndex::new(),
            access: ValueIndex::new(),
            hours: ValueIndex::new(),
            tokens: ValueIndex::new(),
            current: HashMap::new(),
        }
    }

    /// Index a newly created record
    pub(crate) fn insert(&mut self, record: &MemoryRecord) {
        let keys = RecordKeys::of(record);
        self.add_keys(record.id, &keys);
        self.current.insert(record.id, keys);
    }

    /// Re-index a record whose fields may have shifted buckets
    pub(crate) fn update(&mut self, record: &MemoryRecord) {
        let keys = RecordKeys::of(record);
        if let Some(old) = self.current.get(&record.id) {
            if *old == keys {
                return;
            }
        }
        if let Some(old) = self.current.remove(&record.id) {
            self.remove_keys(record.id, &old);
        }
        self.add_keys(record.id, &keys);
        self.current.insert(record.id, keys);
    }

    /// Drop every index entry for the id
    pub(crate) fn remove(&mut self, id: RecordId) {
        if let Some(keys) = self.current.remove(&id) {
            self.remove_keys(id, &keys);
        }
    }

    /// Clear everything and reinsert from the record map
    ///
    /// Recovery hatch after bulk load: guarantees index/store consistency
    /// regardless of what the indexes held before.
    pub(crate) fn rebuild(&mut self, records: &HashMap<RecordId, MemoryRecord>) {
        self.kinds.clear();
        self.tags.clear();
        self.sources.clear();
        self.importance.clear();
        self.confidence.clear();
        self.access.clear();
        self.hours.clear();
        self.tokens.clear();
        self.current.clear();
        for record in records.values() {
            self.insert(record);
        }
        tracing::debug!(records = records.len(), "rebuilt secondary indexes");
    }

    /// Candidate ids for the given criteria
    ///
    /// Each present criterion contributes a union-merged subset from its
    /// index. A time range is not an index scan here; the retrieval engine
    /// applies it as a post-filter since hour buckets are coarse. With no
    /// index-relevant criteria at all, every known id is a candidate. The
    /// returned set is ordered so downstream ranking is deterministic.
    pub(crate) fn candidates(&self, criteria: &SearchCriteria) -> BTreeSet<RecordId> {
        if !criteria.has_index_terms() {
            return self.current.keys().copied().collect();
        }

        let mut out = BTreeSet::new();
        if let Some(kind) = criteria.kind {
            self.kinds.collect_into(&kind, &mut out);
        }
        for tag in &criteria.tags {
            self.tags.collect_into(tag, &mut out);
        }
        if let Some(source) = &criteria.source {
            self.sources.collect_into(source, &mut out);
        }
        if let Some(min) = criteria.min_importance {
            self.importance.collect_at_least(&decile(min), &mut out);
        }
        if let Some(min) = criteria.min_confidence {
            self.confidence.collect_at_least(&decile(min), &mut out);
        }
        if let Some(text) = &criteria.text {
            for token in tokenize(text) {
                self.tokens.collect_into(&token, &mut out);
            }
        }
        out
    }

    /// Number of indexed records
    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether the id is present in the type index
    #[cfg(test)]
    pub(crate) fn contains(&self, id: &RecordId) -> bool {
        self.current.contains_key(id)
    }

    pub(crate) fn sizes(&self) -> IndexSizes {
        IndexSizes {
            kinds: self.kinds.len(),
            tags: self.tags.len(),
            sources: self.sources.len(),
            importance: self.importance.len(),
            confidence: self.confidence.len(),
            access: self.access.len(),
            hours: self.hours.len(),
            tokens: self.tokens.len(),
        }
    }

    fn add_keys(&mut self, id: RecordId, keys: &RecordKeys) {
        self.kinds.add(keys.kind, id);
        for tag in &keys.tags {
            self.tags.add(tag.clone(), id);
        }
        self.sources.add(keys.source.clone(), id);
        self.importance.add(keys.importance, id);
        self.confidence.add(keys.confidence, id);
        self.access.add(keys.access, id);
        self.hours.add(keys.hour, id);
        for token in &keys.tokens {
            self.tokens.add(token.clone(), id);
        }
    }

    fn remove_keys(&mut self, id: RecordId, keys: &RecordKeys) {
        self.kinds.remove(&keys.kind, &id);
        for tag in &keys.tags {
            self.tags.remove(tag, &id);
        }
        self.sources.remove(&keys.source, &id);
        self.importance.remove(&keys.importance, &id);
        self.confidence.remove(&keys.confidence, &id);
        self.access.remove(&keys.access, &id);
        self.hours.remove(&keys.hour, &id);
        for token in &keys.tokens {
            self.tokens.remove(token, &id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(kind: RecordKind, text: &str, tags: &[&str]) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: RecordId::new(),
            kind,
            payload: json!({ "text": text }),
            created_at: now,
            last_updated_at: now,
            connections: vec![],
            source: "user_input".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            importance: 0.5,
            confidence: 0.5,
            access_count: 0,
        }
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("The User Prefers dark mode on mobile");
        assert!(tokens.contains(&"user".to_string()));
        assert!(tokens.contains(&"prefers".to_string()));
        assert!(tokens.contains(&"mobile".to_string()));
        // Short words are dropped
        assert!(!tokens.contains(&"on".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
    }

    #[test]
    fn test_insert_and_candidates_by_kind() {
        let mut indexes = IndexManager::new();
        let record = sample(RecordKind::Knowledge, "dark mode preference", &["ui"]);
        indexes.insert(&record);

        let criteria = SearchCriteria::new().kind(RecordKind::Knowledge);
        assert!(indexes.candidates(&criteria).contains(&record.id));

        let criteria = SearchCriteria::new().kind(RecordKind::Feedback);
        assert!(indexes.candidates(&criteria).is_empty());
    }

    #[test]
    fn test_candidates_union_across_criteria() {
        let mut indexes = IndexManager::new();
        let a = sample(RecordKind::Knowledge, "likes espresso", &["coffee"]);
        let b = sample(RecordKind::Feedback, "too verbose", &["style"]);
        indexes.insert(&a);
        indexes.insert(&b);

        // Kind matches only `a`, tag matches only `b`; candidates are the union.
        let criteria = SearchCriteria::new()
            .kind(RecordKind::Knowledge)
            .tag("style");
        let candidates = indexes.candidates(&criteria);
        assert!(candidates.contains(&a.id));
        assert!(candidates.contains(&b.id));
    }

    #[test]
    fn test_no_criteria_returns_all() {
        let mut indexes = IndexManager::new();
        let a = sample(RecordKind::Knowledge, "one", &[]);
        let b = sample(RecordKind::Pattern, "two", &[]);
        indexes.insert(&a);
        indexes.insert(&b);

        let candidates = indexes.candidates(&SearchCriteria::new());
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_min_importance_spans_buckets() {
        let mut indexes = IndexManager::new();
        let mut low = sample(RecordKind::Knowledge, "low", &[]);
        low.importance = 0.2;
        let mut high = sample(RecordKind::Knowledge, "high", &[]);
        high.importance = 0.9;
        indexes.insert(&low);
        indexes.insert(&high);

        let criteria = SearchCriteria::new().min_importance(0.5);
        let candidates = indexes.candidates(&criteria);
        assert!(candidates.contains(&high.id));
        assert!(!candidates.contains(&low.id));
    }

    #[test]
    fn test_update_moves_buckets() {
        let mut indexes = IndexManager::new();
        let mut record = sample(RecordKind::Knowledge, "bucket shift", &[]);
        record.access_count = 9;
        indexes.insert(&record);

        record.access_count = 10;
        indexes.update(&record);

        // Still exactly one index entry for the id
        assert_eq!(indexes.len(), 1);
        let criteria = SearchCriteria::new().kind(RecordKind::Knowledge);
        assert_eq!(indexes.candidates(&criteria).len(), 1);
    }

    #[test]
    fn test_remove_leaves_no_empty_buckets() {
        let mut indexes = IndexManager::new();
        let record = sample(RecordKind::Knowledge, "ephemeral entry", &["tmp"]);
        indexes.insert(&record);
        indexes.remove(record.id);

        assert_eq!(indexes.len(), 0);
        let sizes = indexes.sizes();
        assert_eq!(sizes.kinds, 0);
        assert_eq!(sizes.tags, 0);
        assert_eq!(sizes.tokens, 0);
    }

    #[test]
    fn test_rebuild_matches_store() {
        let mut indexes = IndexManager::new();
        let stale = sample(RecordKind::Pattern, "stale", &[]);
        indexes.insert(&stale);

        let mut records = HashMap::new();
        let live = sample(RecordKind::Knowledge, "live", &[]);
        records.insert(live.id, live.clone());
        indexes.rebuild(&records);

        assert_eq!(indexes.len(), 1);
        assert!(indexes.contains(&live.id));
        assert!(!indexes.contains(&stale.id));
    }

    #[test]
    fn test_free_text_candidates() {
        let mut indexes = IndexManager::new();
        let record = sample(RecordKind::Knowledge, "prefers concise answers", &[]);
        indexes.insert(&record);

        let criteria = SearchCriteria::new().text("concise");
        assert!(indexes.candidates(&criteria).contains(&record.id));

        let criteria = SearchCriteria::new().text("verbose");
        assert!(indexes.candidates(&criteria).is_empty());
    }
}
