use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;

use crate::model::RoomId;
use crate::observability::{LOCK_BUSY_TOTAL, LOCK_WAIT_SECONDS};

use super::{EngineError, LockScope};

/// Exclusivity for one room's reservation set. Holds the catalog shared so the room
/// cannot be deleted (nor a referenced guest removed) underneath it.
pub(super) struct RoomGuard {
    _catalog: OwnedRwLockReadGuard<()>,
    _room: OwnedMutexGuard<()>,
}

pub(super) type CatalogGuard = OwnedRwLockWriteGuard<()>;

/// Catalog held shared: excludes deletions and `pause_writes`, not room writers.
pub(super) type SharedCatalogGuard = OwnedRwLockReadGuard<()>;

/// Per-room mutexes plus one catalog RwLock. Acquisition order is always
/// catalog, then room, and no operation holds two rooms, so there is no cycle.
pub(super) struct LockTable {
    catalog: Arc<RwLock<()>>,
    rooms: DashMap<RoomId, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl LockTable {
    pub(super) fn new(timeout: Duration) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(())),
            rooms: DashMap::new(),
            timeout,
        }
    }

    pub(super) async fn room(&self, room_id: RoomId) -> Result<RoomGuard, EngineError> {
        let started = Instant::now();
        let scope = LockScope::Room(room_id);

        let catalog = tokio::time::timeout(self.timeout, self.catalog.clone().read_owned())
            .await
            .map_err(|_| busy(scope, started))?;

        let mutex = self.rooms.entry(room_id).or_default().value().clone();
        let remaining = self.timeout.saturating_sub(started.elapsed());
        let room = tokio::time::timeout(remaining, mutex.lock_owned())
            .await
            .map_err(|_| busy(scope, started))?;

        metrics::histogram!(LOCK_WAIT_SECONDS, "scope" => "room").record(started.elapsed().as_secs_f64());
        Ok(RoomGuard {
            _catalog: catalog,
            _room: room,
        })
    }

    pub(super) async fn catalog(&self) -> Result<CatalogGuard, EngineError> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.timeout, self.catalog.clone().write_owned())
            .await
            .map_err(|_| busy(LockScope::Catalog, started))?;
        metrics::histogram!(LOCK_WAIT_SECONDS, "scope" => "catalog")
            .record(started.elapsed().as_secs_f64());
        Ok(guard)
    }

    pub(super) async fn catalog_shared(&self) -> Result<SharedCatalogGuard, EngineError> {
        let started = Instant::now();
        let guard = tokio::time::timeout(self.timeout, self.catalog.clone().read_owned())
            .await
            .map_err(|_| busy(LockScope::Catalog, started))?;
        metrics::histogram!(LOCK_WAIT_SECONDS, "scope" => "catalog_shared")
            .record(started.elapsed().as_secs_f64());
        Ok(guard)
    }

    /// Drop the mutex of a deleted room. Caller holds the catalog exclusively.
    pub(super) fn forget(&self, room_id: &RoomId) {
        self.rooms.remove(room_id);
    }
}

fn busy(scope: LockScope, started: Instant) -> EngineError {
    let label = match scope {
        LockScope::Catalog => "catalog",
        LockScope::Room(_) => "room",
    };
    metrics::counter!(LOCK_BUSY_TOTAL, "scope" => label).increment(1);
    warn!("{scope} busy after {:?}", started.elapsed());
    EngineError::Busy(scope)
}
