use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// One committed storage transaction. Replayed all-or-nothing.
pub type Batch = Vec<Event>;

/// Encode a single batch to [len][bincode][crc32] format.
fn encode_batch(writer: &mut impl Write, batch: &[Event]) -> io::Result<()> {
    let payload =
        bincode::serialize(batch).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only Write-Ahead Log.
///
/// Format per entry: `[u32: len][bincode: Vec<Event>][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded as a whole via length-prefix + CRC check,
///   so a transaction is either fully replayed or not at all.
/// - A group whose `flush_sync` fails is cut back out with [`Wal::rollback`]; if that fails too
///   the log is poisoned and refuses appends until a compaction rewrites it.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length and record count as of the last successful `flush_sync`.
    synced_len: u64,
    synced_appends: u64,
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the WAL file at `path`. `existing` is the number of records already in it.
    pub fn open(path: &Path, existing: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let synced_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: existing,
            synced_len,
            synced_appends: existing,
            poisoned: false,
        })
    }

    /// Append a single batch and fsync. Used by tests only;
    /// production code uses `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, batch: &[Event]) -> io::Result<()> {
        self.append_buffered(batch)?;
        self.flush_sync()
    }

    /// Append a batch to the BufWriter without flushing or syncing.
    /// Call `flush_sync()` after the group to durably commit everything buffered.
    pub fn append_buffered(&mut self, batch: &[Event]) -> io::Result<()> {
        self.check_poisoned()?;
        encode_batch(&mut self.writer, batch)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.check_poisoned()?;
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.sync_all()?;
        self.synced_len = file.metadata()?.len();
        self.synced_appends = self.appends_since_compact;
        Ok(())
    }

    /// Discard everything appended since the last successful `flush_sync`: bytes still in the
    /// buffer and bytes that reached the file. Poisons the log if the file cannot be cut back.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.appends_since_compact = self.synced_appends;
        let result = self.truncate_to_synced();
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn truncate_to_synced(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unwritten buffer instead of flushing it on drop
        let (file, _unwritten) = stale.into_parts();
        file.set_len(self.synced_len)?;
        file.sync_all()
    }

    fn check_poisoned(&self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(format!(
                "WAL {} poisoned by a failed rollback",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[cfg(test)]
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot as a single record to a temp file and fsync.
    pub fn write_compact_file(path: &Path, snapshot: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        encode_batch(&mut writer, snapshot)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename temp file over the WAL and reopen.
    /// The snapshot replaces whatever the old file held, so this also clears a poisoned log.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let _ = stale.into_parts();
        self.synced_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact = 0;
        self.synced_appends = 0;
        self.poisoned = false;
        Ok(())
    }

    /// Replace the WAL with a single snapshot record. Both phases at once; used by tests.
    #[cfg(test)]
    pub fn compact(&mut self, snapshot: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, snapshot)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all intact batches in commit order.
    /// Truncated/corrupt trailing entries are discarded and cut from the file,
    /// so the next append follows the last intact record.
    pub fn replay(path: &Path) -> io::Result<Vec<Batch>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut batches = Vec::new();
        let mut intact_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            let stored_crc = u32::from_le_bytes(crc_buf);
            if stored_crc != crc32fast::hash(&payload) {
                tracing::warn!("WAL {}: CRC mismatch after {} records, discarding tail", path.display(), batches.len());
                break;
            }

            match bincode::deserialize::<Batch>(&payload) {
                Ok(batch) => batches.push(batch),
                Err(_) => break, // corrupt payload
            }
            intact_len += 8 + len as u64;
        }

        if intact_len < file_len {
            tracing::warn!(
                "WAL {}: dropping {} trailing bytes after {} records",
                path.display(),
                file_len - intact_len,
                batches.len()
            );
            OpenOptions::new().write(true).open(path)?.set_len(intact_len)?;
        }

        Ok(batches)
    }
}
