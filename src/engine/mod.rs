mod conflict;
mod error;
mod ledger;
mod locks;
mod mutations;
mod queries;
mod registry;
#[cfg(test)]
mod tests;

pub use error::{EngineError, Entity, LockScope};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::model::Day;
use crate::store::Storage;

use ledger::Ledger;
use locks::{CatalogGuard, LockTable};
use registry::Registry;

/// Source of "today" for occupancy. Tests pin it; production reads the local date.
pub type Clock = Arc<dyn Fn() -> Day + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a mutation waits for its room (or the catalog) before failing `Busy`.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let lock_timeout_ms: u64 = std::env::var("HOTEL_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);
        Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
        }
    }
}

/// The allocation service. Construct one per property and share it behind an `Arc`.
pub struct Engine {
    registry: Arc<Registry>,
    ledger: Arc<Ledger>,
    locks: Arc<LockTable>,
}

/// Held while the catalog is exclusively locked; no mutation can start until it drops.
pub struct WritePause {
    _guard: CatalogGuard,
}

impl Engine {
    pub fn new(store: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, Arc::new(conflict::today))
    }

    pub fn with_clock(store: Arc<dyn Storage>, config: EngineConfig, clock: Clock) -> Self {
        let registry = Arc::new(Registry::new(store.clone(), clock.clone()));
        let ledger = Arc::new(Ledger::new(store, registry.clone(), clock));
        Self {
            registry,
            ledger,
            locks: Arc::new(LockTable::new(config.lock_timeout)),
        }
    }

    /// Wait for in-flight mutations to finish and block new ones, e.g. around compaction.
    pub async fn pause_writes(&self) -> Result<WritePause, EngineError> {
        Ok(WritePause {
            _guard: self.locks.catalog().await?,
        })
    }
}

/// Run a critical section on its own task, holding `guard` until it completes.
/// Dropping the caller's future does not interrupt the write.
async fn detached<G, T, F>(guard: G, work: F) -> Result<T, EngineError>
where
    G: Send + 'static,
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    tokio::spawn(async move {
        let _guard = guard;
        work.await
    })
    .await
    .map_err(|e| EngineError::Aborted(e.to_string()))?
}
