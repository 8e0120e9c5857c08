//! Mentor Memory Layer
//!
//! In-process tiered knowledge store for the Mentor assistant: typed memory
//! records, secondary indexes for candidate generation, a weighted
//! connection graph, short-term/long-term tier management, and heuristic
//! relevance ranking.
//!
//! ## Features
//!
//! - **Secondary indexes** - kind, tag, source, importance/confidence/access
//!   buckets, hour buckets, and payload tokens, so retrieval scans a
//!   candidate set instead of the whole store
//! - **Tiered retention** - records start short-term and are promoted or
//!   evicted by documented importance/confidence/access heuristics
//! - **Connection graph** - weighted, undirected relationships with
//!   symmetric back-references
//! - **Pluggable persistence** - a narrow async save/load/delete gateway
//!   with RocksDB and in-memory adapters
//! - **Typed notifications** - synchronous in-process pub/sub with RAII
//!   subscriptions
//!
//! ## Example
//!
//! ```ignore
//! use mentor_memory::{MemoryConfig, MemoryStore, RecordDraft, RecordKind, SearchCriteria};
//!
//! let store = MemoryStore::new(MemoryConfig::default());
//!
//! let record = store.create(
//!     RecordDraft::new(RecordKind::Knowledge, serde_json::json!({
//!         "text": "prefers concise answers on mobile",
//!     }))
//!     .source("user_input")
//!     .tag("preference")
//!     .importance(0.8),
//! );
//!
//! let results = store.search(
//!     &SearchCriteria::new().kind(RecordKind::Knowledge).tag("preference"),
//!     None,
//! );
//! assert_eq!(results[0].id, record.id);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod graph;
pub mod index;
pub mod jobs;
pub mod record;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod tier;

// Re-exports for convenience
pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use events::{EventBus, EventTopic, MemoryEvent, Subscription};
pub use gateway::{InMemoryGateway, PersistenceGateway, RocksGateway};
pub use graph::Connection;
pub use index::IndexSizes;
pub use jobs::{JobConfig, JobScheduler};
pub use record::{MemoryRecord, RecordDraft, RecordId, RecordKind, RecordPatch};
pub use search::SearchCriteria;
pub use snapshot::{StoreSnapshot, SNAPSHOT_VERSION};
pub use store::{MaintenanceReport, MemoryStats, MemoryStore};
pub use tier::Tier;
