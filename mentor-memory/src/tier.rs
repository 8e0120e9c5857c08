//! Short-term / long-term tier management
//!
//! Partitions active ids into a bounded short-term list and a bounded
//! long-term list and plans eviction. The tier manager holds only ids and
//! never deletes records itself; the store executes the planned drops so
//! index and graph cleanup happen in the same critical section.

use std::collections::HashMap;

use crate::config::MemoryConfig;
use crate::record::{MemoryRecord, RecordId};

/// Which tier a record currently lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    ShortTerm,
    LongTerm,
}

/// Retention score used when the short-term tier is over capacity
fn short_term_score(record: &MemoryRecord) -> f64 {
    0.7 * record.importance + 0.3 * (record.access_count as f64 / 100.0)
}

/// Retention score used when the long-term tier is over capacity
fn long_term_score(record: &MemoryRecord) -> f64 {
    0.5 * record.importance + 0.3 * record.confidence + 0.2 * (record.access_count as f64 / 100.0)
}

#[derive(Debug)]
pub(crate) struct TierManager {
    short_term: Vec<RecordId>,
    long_term: Vec<RecordId>,
}

impl TierManager {
    pub(crate) fn new() -> Self {
        Self {
            short_term: Vec::new(),
            long_term: Vec::new(),
        }
    }

    /// New records start short-term
    pub(crate) fn insert_short_term(&mut self, id: RecordId) {
        self.short_term.push(id);
    }

    pub(crate) fn tier_of(&self, id: RecordId) -> Option<Tier> {
        if self.short_term.contains(&id) {
            Some(Tier::ShortTerm)
        } else if self.long_term.contains(&id) {
            Some(Tier::LongTerm)
        } else {
            None
        }
    }

    /// Move a short-term member to long-term
    ///
    /// Returns false (and changes nothing) when the id is not a short-term
    /// member.
    pub(crate) fn promote(&mut self, id: RecordId) -> bool {
        match self.short_term.iter().position(|m| *m == id) {
            Some(pos) => {
                self.short_term.remove(pos);
                self.long_term.push(id);
                true
            }
            None => false,
        }
    }

    /// Remove an id from whichever tier holds it
    pub(crate) fn remove(&mut self, id: RecordId) {
        self.short_term.retain(|m| *m != id);
        self.long_term.retain(|m| *m != id);
    }

    pub(crate) fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    pub(crate) fn long_term_len(&self) -> usize {
        self.long_term.len()
    }

    pub(crate) fn short_term(&self) -> &[RecordId] {
        &self.short_term
    }

    pub(crate) fn long_term(&self) -> &[RecordId] {
        &self.long_term
    }

    /// Restore tier membership from a snapshot
    pub(crate) fn restore(&mut self, short_term: Vec<RecordId>, long_term: Vec<RecordId>) {
        self.short_term = short_term;
        self.long_term = long_term;
    }

    /// Ids the short-term eviction policy wants dropped
    ///
    /// Over capacity, members are ranked by `0.7·importance +
    /// 0.3·(accesses/100)` and everything beyond the cap is planned for a
    /// hard delete, not a demotion.
    pub(crate) fn plan_short_term_eviction(
        &self,
        records: &HashMap<RecordId, MemoryRecord>,
        config: &MemoryConfig,
    ) -> Vec<RecordId> {
        if self.short_term.len() <= config.max_short_term {
            return Vec::new();
        }

        let mut ranked: Vec<(RecordId, f64)> = self
            .short_term
            .iter()
            .filter_map(|id| records.get(id).map(|r| (*id, short_term_score(r))))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .skip(config.max_short_term)
            .map(|(id, _)| id)
            .collect()
    }

    /// Ids the long-term eviction policy wants dropped
    ///
    /// Two passes: first, members below the importance, confidence, and
    /// access thresholds at once fail retention outright (the three
    /// conditions are conjunctive); then, if the remainder still exceeds the
    /// cap, the lowest-ranked by `0.5·importance + 0.3·confidence +
    /// 0.2·(accesses/100)` make up the excess.
    pub(crate) fn plan_long_term_eviction(
        &self,
        records: &HashMap<RecordId, MemoryRecord>,
        config: &MemoryConfig,
    ) -> Vec<RecordId> {
        let mut dropped = Vec::new();
        let mut kept: Vec<(RecordId, f64)> = Vec::new();

        for id in &self.long_term {
            let Some(record) = records.get(id) else {
                continue;
            };
            let below_all = record.importance < config.importance_threshold
                && record.confidence < config.confidence_threshold
                && record.access_count < config.access_threshold;
            if below_all {
                dropped.push(*id);
            } else {
                kept.push((*id, long_term_score(record)));
            }
        }

        if kept.len() > config.max_long_term {
            kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            dropped.extend(kept.into_iter().skip(config.max_long_term).map(|(id, _)| id));
        }

        dropped
    }
}
