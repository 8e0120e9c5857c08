//! Background maintenance jobs
//!
//! Three recurring tasks run independently of request flow: periodic
//! snapshot saves, periodic tier maintenance, and an optional periodic sync
//! push to a second gateway. Each is a cancellable tokio task driven by an
//! interval and a shutdown signal; none of them ever fails a store caller.
//! In-memory work never suspends — the only await points are at the
//! gateway boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::PersistenceGateway;
use crate::store::MemoryStore;

/// Scheduling knobs for the background jobs
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// How often the snapshot is saved to the primary gateway
    pub save_interval: Duration,
    /// How often tier eviction runs
    pub maintenance_interval: Duration,
    /// How often the snapshot is pushed to the sync gateway
    pub sync_interval: Duration,
    /// Scope the snapshot is filed under
    pub scope: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(300),
            sync_interval: Duration::from_secs(600),
            scope: "default".to_string(),
        }
    }
}

/// Owns the background tasks for one store
///
/// Tasks start on [`JobScheduler::start`] and run until
/// [`JobScheduler::shutdown`] signals them and awaits their exit. A save
/// already in flight when shutdown arrives is allowed to finish; the next
/// one simply never starts.
pub struct JobScheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Spawn the save, maintenance, and (optionally) sync jobs
    pub fn start(
        store: Arc<MemoryStore>,
        gateway: Arc<dyn PersistenceGateway>,
        sync_gateway: Option<Arc<dyn PersistenceGateway>>,
        config: JobConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::new();

        handles.push(spawn_save_job(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.scope.clone(),
            config.save_interval,
            shutdown.subscribe(),
            "save",
        ));
        handles.push(spawn_maintenance_job(
            Arc::clone(&store),
            config.maintenance_interval,
            shutdown.subscribe(),
        ));
        if let Some(sync) = sync_gateway {
            handles.push(spawn_save_job(
                store,
                sync,
                config.scope.clone(),
                config.sync_interval,
                shutdown.subscribe(),
                "sync",
            ));
        }

        tracing::info!(scope = %config.scope, jobs = handles.len(), "background jobs started");
        Self { shutdown, handles }
    }

    /// Stop every job and wait for it to exit
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }
        tracing::info!("background jobs stopped");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        // Signal tasks even if the owner never called shutdown
        let _ = self.shutdown.send(true);
    }
}

fn spawn_save_job(
    store: Arc<MemoryStore>,
    gateway: Arc<dyn PersistenceGateway>,
    scope: String,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: &'static str,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.save_to(gateway.as_ref(), &scope).await {
                        Ok(()) => tracing::debug!(job, scope = %scope, "snapshot pushed"),
                        // Recoverable: the store keeps serving from memory
                        // and the next tick retries.
                        Err(e) => tracing::warn!(job, scope = %scope, error = %e, "snapshot push failed; retrying next tick"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_maintenance_job(
    store: Arc<MemoryStore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = store.run_maintenance();
                    if report.evicted() > 0 {
                        tracing::debug!(evicted = report.evicted(), "maintenance tick");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::error::{MemoryError, Result};
    use crate::gateway::InMemoryGateway;
    use crate::record::{RecordDraft, RecordKind};
    use crate::snapshot::StoreSnapshot;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn draft(importance: f64) -> RecordDraft {
        RecordDraft::new(RecordKind::Knowledge, json!({"text": "scheduled work"}))
            .source("system")
            .importance(importance)
    }

    /// Fails the first N saves, then delegates to an in-memory gateway
    struct FlakyGateway {
        attempts: AtomicUsize,
        failures: usize,
        inner: InMemoryGateway,
    }

    impl FlakyGateway {
        fn new(failures: usize) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                failures,
                inner: InMemoryGateway::new(),
            }
        }
    }

    #[async_trait]
    impl PersistenceGateway for FlakyGateway {
        async fn save(&self, scope: &str, snapshot: &StoreSnapshot) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(MemoryError::gateway("simulated outage"));
            }
            self.inner.save(scope, snapshot).await
        }

        async fn load(&self, scope: &str) -> Result<Option<StoreSnapshot>> {
            self.inner.load(scope).await
        }

        async fn delete(&self, scope: &str) -> Result<()> {
            self.inner.delete(scope).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_persists_snapshot() {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        store.create(draft(0.5));
        let gateway = Arc::new(InMemoryGateway::new());

        let scheduler = JobScheduler::start(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn PersistenceGateway>,
            None,
            JobConfig {
                save_interval: Duration::from_millis(50),
                maintenance_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.shutdown().await;

        let snapshot = gateway.load("default").await.unwrap().unwrap();
        assert_eq!(snapshot.records.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_job_evicts_over_capacity() {
        let store = Arc::new(MemoryStore::new(MemoryConfig {
            max_short_term: 1,
            ..Default::default()
        }));
        store.create(draft(0.9));
        store.create(draft(0.1));

        let scheduler = JobScheduler::start(
            Arc::clone(&store),
            Arc::new(InMemoryGateway::new()),
            None,
            JobConfig {
                save_interval: Duration::from_secs(3600),
                maintenance_interval: Duration::from_millis(50),
                ..Default::default()
            },
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.shutdown().await;

        assert_eq!(store.stats().records, 1);
        assert_eq!(store.stats().short_term, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_retried_next_tick() {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        store.create(draft(0.5));
        let gateway = Arc::new(FlakyGateway::new(2));

        let scheduler = JobScheduler::start(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn PersistenceGateway>,
            None,
            JobConfig {
                save_interval: Duration::from_millis(50),
                maintenance_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.shutdown().await;

        // Two outages, then a retry landed the snapshot
        assert!(gateway.attempts.load(Ordering::SeqCst) >= 3);
        assert!(gateway.load("default").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_job_pushes_to_second_gateway() {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        store.create(draft(0.5));
        let primary = Arc::new(InMemoryGateway::new());
        let sync = Arc::new(InMemoryGateway::new());

        let scheduler = JobScheduler::start(
            Arc::clone(&store),
            Arc::clone(&primary) as Arc<dyn PersistenceGateway>,
            Some(Arc::clone(&sync) as Arc<dyn PersistenceGateway>),
            JobConfig {
                save_interval: Duration::from_secs(3600),
                maintenance_interval: Duration::from_secs(3600),
                sync_interval: Duration::from_millis(50),
                ..Default::default()
            },
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.shutdown().await;

        assert!(sync.load("default").await.unwrap().is_some());
        assert!(primary.load("default").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
        store.create(draft(0.5));
        let gateway = Arc::new(FlakyGateway::new(0));

        let scheduler = JobScheduler::start(
            Arc::clone(&store),
            Arc::clone(&gateway) as Arc<dyn PersistenceGateway>,
            None,
            JobConfig {
                save_interval: Duration::from_millis(50),
                maintenance_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;
        let saves_at_shutdown = gateway.attempts.load(Ordering::SeqCst);
        assert!(saves_at_shutdown >= 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(gateway.attempts.load(Ordering::SeqCst), saves_at_shutdown);
    }
}
