//! Retrieval: filter criteria and relevance ranking
//!
//! Candidates come from the index manager; each candidate is scored against
//! the criteria and results are returned best-first. Scoring is stateless
//! with respect to the store, so identical searches against an unchanged
//! store return identical orderings.

use chrono::{DateTime, Utc};

use crate::index::tokenize;
use crate::record::{MemoryRecord, RecordKind};

/// Simultaneously-applicable retrieval filters
///
/// Every field is optional; empty criteria match the whole store. The time
/// range applies to `created_at` and is enforced during scoring, not during
/// candidate generation.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub kind: Option<RecordKind>,
    /// Any-of tag filter
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub min_importance: Option<f64>,
    pub min_confidence: Option<f64>,
    /// Free-text query matched against payload tokens
    pub text: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether any criterion can be answered from an index
    ///
    /// The time range is excluded: hour buckets are too coarse to filter on,
    /// so a range-only search still starts from every known id.
    pub(crate) fn has_index_terms(&self) -> bool {
        self.kind.is_some()
            || !self.tags.is_empty()
            || self.source.is_some()
            || self.min_importance.is_some()
            || self.min_confidence.is_some()
            || self.text.is_some()
    }
}

/// Composite relevance of a record against the criteria
///
/// Kind match +10, each matching requested tag +5, source match +3,
/// 5·importance, 3·confidence, min(0.5·accesses, 5), and +2 per query token
/// found in the payload. A record outside a requested time range scores 0
/// and is excluded by the ranking.
pub(crate) fn relevance(record: &MemoryRecord, criteria: &SearchCriteria) -> f64 {
    if let Some(since) = criteria.since {
        if record.created_at < since {
            return 0.0;
        }
    }
    if let Some(until) = criteria.until {
        if record.created_at > until {
            return 0.0;
        }
    }

    let mut score = 0.0;

    if criteria.kind == Some(record.kind) {
        score += 10.0;
    }
    for tag in &criteria.tags {
        if record.tags.contains(tag) {
            score += 5.0;
        }
    }
    if criteria.source.as_deref() == Some(record.source.as_str()) {
        score += 3.0;
    }

    score += 5.0 * record.importance;
    score += 3.0 * record.confidence;
    score += (0.5 * record.access_count as f64).min(5.0);

    if let Some(text) = &criteria.text {
        let payload_tokens = tokenize(&record.payload_text());
        for token in tokenize(text) {
            if payload_tokens.contains(&token) {
                score += 2.0;
            }
        }
    }

    score
}

/// Score, order, and truncate candidates
///
/// Zero and negative scores are discarded; ties on score break toward
/// higher importance. Candidates must arrive in a deterministic order for
/// the stable sort to guarantee search determinism.
pub(crate) fn rank(
    candidates: Vec<MemoryRecord>,
    criteria: &SearchCriteria,
    limit: usize,
) -> Vec<MemoryRecord> {
    let mut scored: Vec<(f64, MemoryRecord)> = candidates
        .into_iter()
        .filter_map(|record| {
            let score = relevance(&record, criteria);
            (score > 0.0).then_some((score, record))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.1.importance
                    .partial_cmp(&a.1.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    scored.truncate(limit);
    scored.into_iter().map(|(_, record)| record).collect()
}
