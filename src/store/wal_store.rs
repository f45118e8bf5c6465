use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::model::*;
use crate::wal::{Batch, Wal};

use super::{MemoryStore, Storage, StoreError, Txn};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        batch: Batch,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole group.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { batch, response } => {
                let mut group = vec![(batch, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { batch, response }) => {
                            group.push((batch, response));
                        }
                        Ok(other) => {
                            // Flush current group first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut group);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty
                    }
                }

                if !group.is_empty() {
                    flush_and_respond(&mut wal, &mut group);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    debug!("WAL writer for {} stopped", wal.path().display());
}

fn flush_and_respond(wal: &mut Wal, group: &mut Vec<(Batch, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(group.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_group(wal, group);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in group.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All or nothing for the whole group: on any error every caller is told the commit failed,
/// so none of the group's bytes may survive in the file or the buffer.
fn flush_group(wal: &mut Wal, group: &[(Batch, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = group
        .iter()
        .try_for_each(|(batch, _)| wal.append_buffered(batch))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        warn!("WAL group of {} failed, rolling back: {e}", group.len());
        if let Err(rollback_err) = wal.rollback() {
            error!("WAL rollback failed, refusing writes until compaction: {rollback_err}");
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// [`MemoryStore`] made durable: every committed [`Txn`] becomes one WAL record before it is
/// applied in memory. State is rebuilt by replaying the log on open.
pub struct WalStore {
    memory: MemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    /// Replay `path` and start the writer task. Must be called inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let batches = Wal::replay(path)?;
        let memory = MemoryStore::new();
        for batch in &batches {
            memory.apply_all(batch);
        }
        info!(
            "replayed {} WAL records from {} ({} rooms, {} guests)",
            batches.len(),
            path.display(),
            memory.rooms().len(),
            memory.guests().len()
        );

        let wal = Wal::open(path, batches.len() as u64)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self { memory, wal_tx })
    }

    /// Rewrite the log as a single snapshot record of the current state.
    /// Callers must hold off writers (the engine takes its catalog lock).
    pub async fn compact(&self) -> Result<(), StoreError> {
        let snapshot = self.memory.snapshot();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { snapshot, response: tx })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::ResponseDropped)??;
        info!("WAL compacted");
        Ok(())
    }

    /// Records written since the last compaction (including those replayed at open).
    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    async fn wal_append(&self, batch: Batch) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { batch, response: tx })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::ResponseDropped)??;
        Ok(())
    }
}

#[async_trait]
impl Storage for WalStore {
    async fn load_reservations_for_room(&self, room_id: RoomId) -> Result<Vec<Reservation>, StoreError> {
        self.memory.load_reservations_for_room(room_id).await
    }

    async fn load_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.memory.load_reservation(id).await
    }

    async fn load_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        self.memory.load_reservations().await
    }

    async fn load_room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        self.memory.load_room(id).await
    }

    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.memory.load_rooms().await
    }

    async fn load_guest(&self, id: GuestId) -> Result<Option<Guest>, StoreError> {
        self.memory.load_guest(id).await
    }

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.memory.load_guests().await
    }

    /// Durable first, visible second: a failed append leaves memory untouched.
    async fn commit(&self, txn: Txn) -> Result<(), StoreError> {
        if txn.is_empty() {
            return Ok(());
        }
        let events = txn.into_events();
        self.wal_append(events.clone()).await?;
        self.memory.apply_all(&events);
        Ok(())
    }
}
