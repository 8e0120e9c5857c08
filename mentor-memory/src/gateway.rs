//! Persistence gateway
//!
//! The store reaches its durable backing through this narrow save/load/
//! delete interface and does not know or care what implements it. Failures
//! are recoverable by contract: callers log and retry saves on the next
//! scheduled tick, and treat a failed load as an empty store.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{Options, DB};

use crate::error::Result;
use crate::snapshot::StoreSnapshot;

/// External collaborator that persists store snapshots
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist a snapshot under the scope
    async fn save(&self, scope: &str, snapshot: &StoreSnapshot) -> Result<()>;

    /// Load the snapshot stored under the scope, if any
    async fn load(&self, scope: &str) -> Result<Option<StoreSnapshot>>;

    /// Remove the snapshot stored under the scope
    async fn delete(&self, scope: &str) -> Result<()>;
}

/// RocksDB-backed gateway
///
/// One snapshot per scope, JSON-encoded under a `snap:` key, flushed after
/// every write. JSON rather than a compact binary format: record payloads
/// are arbitrary self-describing values.
pub struct RocksGateway {
    db: DB,
}

impl RocksGateway {
    /// Open (or create) the gateway database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        tracing::info!(path = %path.display(), "snapshot gateway opened");
        Ok(Self { db })
    }

    fn key(scope: &str) -> String {
        format!("snap:{scope}")
    }
}

#[async_trait]
impl PersistenceGateway for RocksGateway {
    async fn save(&self, scope: &str, snapshot: &StoreSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.db.put(Self::key(scope).as_bytes(), bytes)?;
        self.db.flush()?;
        tracing::debug!(scope, records = snapshot.records.len(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, scope: &str) -> Result<Option<StoreSnapshot>> {
        match self.db.get(Self::key(scope).as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, scope: &str) -> Result<()> {
        self.db.delete(Self::key(scope).as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// Gateway that keeps snapshots in process memory
///
/// Backs tests and hosts that opt out of durability.
#[derive(Default)]
pub struct InMemoryGateway {
    snapshots: Mutex<HashMap<String, StoreSnapshot>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn save(&self, scope: &str, snapshot: &StoreSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .insert(scope.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, scope: &str) -> Result<Option<StoreSnapshot>> {
        Ok(self.snapshots.lock().get(scope).cloned())
    }

    async fn delete(&self, scope: &str) -> Result<()> {
        self.snapshots.lock().remove(scope);
        Ok(())
    }
}
