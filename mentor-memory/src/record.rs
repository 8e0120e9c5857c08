//! Memory record types
//!
//! Core types for representing memories in the Mentor assistant, plus the
//! confidence/importance heuristics applied at creation, read, and promotion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for memory records
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Create a new random RecordId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Types of memories that can be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A single exchange with the user
    Interaction,
    /// Durable facts about the user or domain
    Knowledge,
    /// Recurring behavior observed across interactions
    Pattern,
    /// Explicit user feedback on assistant output
    Feedback,
}

impl RecordKind {
    /// Stable name used in stats and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interaction => "interaction",
            Self::Knowledge => "knowledge",
            Self::Pattern => "pattern",
            Self::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored memory with metadata
///
/// The payload is opaque structured data; the store only introspects it to
/// extract text for the token index and to probe for a `timestamp` field.
/// `connections` is a back-reference list maintained by the connection
/// graph, not an ownership relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier
    pub id: RecordId,
    /// Record type
    pub kind: RecordKind,
    /// Opaque structured content
    pub payload: Value,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub last_updated_at: DateTime<Utc>,
    /// Neighbor ids in the connection graph
    #[serde(default)]
    pub connections: Vec<RecordId>,
    /// Free-form provenance tag
    pub source: String,
    /// Searchable tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Retention priority heuristic
    pub importance: f64,
    /// Trust heuristic, adjusted by usage and age
    pub confidence: f64,
    /// Number of reads so far
    #[serde(default)]
    pub access_count: u64,
}

/// Payload text shorter than this does not count as real content when
/// seeding confidence.
const TRIVIAL_TEXT_LEN: usize = 10;

/// Confidence floor/ceiling applied on read and promotion
const CONFIDENCE_MIN: f64 = 0.1;
const CONFIDENCE_MAX: f64 = 1.0;

impl MemoryRecord {
    /// Concatenated text content of the payload
    ///
    /// Walks the payload depth-first, collecting every string leaf. Numbers
    /// and booleans are ignored; the token index only cares about text.
    pub fn payload_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.payload, &mut out);
        out.trim_end().to_string()
    }

    /// How long ago this record was created
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Seed confidence for a new record
    ///
    /// Base 0.5, plus: 0.2 for a trusted source, 0.1 for non-trivial payload
    /// text, 0.05 if the payload carries its own `timestamp`, and 0.02 per
    /// tag up to 5 tags. Deliberately not clamped here; the read-time
    /// recomputation clamps into [0.1, 1.0].
    pub(crate) fn initial_confidence(
        payload: &Value,
        tags: &[String],
        source_trusted: bool,
    ) -> f64 {
        let mut confidence = 0.5;
        if source_trusted {
            confidence += 0.2;
        }
        let mut text = String::new();
        collect_text(payload, &mut text);
        if text.trim_end().len() >= TRIVIAL_TEXT_LEN {
            confidence += 0.1;
        }
        if payload.get("timestamp").is_some() {
            confidence += 0.05;
        }
        confidence += 0.02 * tags.len().min(5) as f64;
        confidence
    }

    /// Recompute confidence on read
    ///
    /// Applied after the access count has been bumped: heavily-read records
    /// gain trust, stale records lose a little, and high-importance records
    /// get a small bonus. The result is clamped into [0.1, 1.0].
    pub(crate) fn refresh_confidence(&mut self, now: DateTime<Utc>) {
        let mut confidence = self.confidence;
        if self.access_count > 10 {
            confidence += 0.1;
        } else if self.access_count > 5 {
            confidence += 0.05;
        }
        if self.age(now) > Duration::days(30) {
            confidence -= 0.01;
        }
        if self.importance > 0.8 {
            confidence += 0.05;
        }
        self.confidence = confidence.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX);
    }

    /// Importance recomputed for long-term retention
    ///
    /// Starts from the current importance and rewards access frequency,
    /// connectivity, and high confidence; very old records are docked.
    /// Clamped into [0.1, 1.0].
    pub(crate) fn long_term_importance(&self, now: DateTime<Utc>) -> f64 {
        let mut importance = self.importance;
        if self.access_count > 20 {
            importance += 0.2;
        } else if self.access_count > 10 {
            importance += 0.1;
        }
        if self.connections.len() > 5 {
            importance += 0.1;
        } else if self.connections.len() > 2 {
            importance += 0.05;
        }
        if self.confidence > 0.8 {
            importance += 0.1;
        }
        if self.age(now) > Duration::days(365) {
            importance -= 0.1;
        }
        importance.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
    }
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_text(item, out);
            }
        }
        _ => {}
    }
}

/// Input for creating a new record
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub kind: RecordKind,
    pub payload: Value,
    pub source: String,
    pub tags: Vec<String>,
    pub importance: f64,
}

impl RecordDraft {
    pub fn new(kind: RecordKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            source: String::new(),
            tags: vec![],
            importance: 0.5,
        }
    }

    /// Set the provenance tag
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set multiple tags
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the importance heuristic
    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }
}

/// Partial update applied by `MemoryStore::update`
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub payload: Option<Value>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    pub importance: Option<f64>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }
}
