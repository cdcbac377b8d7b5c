//! # Commit Journal
//!
//! **Crash-Safe Multi-Update Log**
//!
//! Before a multi-update is applied in memory, the whole batch is appended
//! here and synced. If the process dies mid-commit, recovery:
//! - Committed batches: replayed
//! - Batches without COMMIT, or torn records: discarded (nothing was acknowledged)
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "SKJL"]
//! [4 bytes: version]
//! [8 bytes: reserved (0)]
//!
//! Record format:
//! [8 bytes: LSN]
//! [1 byte: record type (BEGIN/OP/COMMIT)]
//! [4 bytes: payload length]
//! [N bytes: payload (JSON operation)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! All integers are little-endian. A batch holds the file lock from BEGIN to
//! COMMIT, so its records are always contiguous.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};
use crate::store::StorageKey;

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"SKJL";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_LEN: u64 = 16;

/// Larger payloads are treated as corruption.
const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    Begin = 1,
    Operation = 2,
    /// The batch is durable.
    Commit = 3,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Begin),
            2 => Some(Self::Operation),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// One state mutation, as journaled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalOp {
    /// Object write, with the version it was assigned.
    Write {
        /// Target record.
        key: StorageKey,
        /// JSON document.
        value: String,
        /// Assigned version number.
        version: u64,
    },
    /// Object delete.
    Delete {
        /// Target record.
        key: StorageKey,
    },
    /// Ledger deltas for one owner.
    Ledger {
        /// Owning player.
        owner: String,
        /// Currency -> signed delta.
        changes: BTreeMap<String, i64>,
    },
}

/// A journal record read back from disk.
#[derive(Clone, Debug)]
struct JournalRecord {
    lsn: u64,
    record_type: RecordType,
    payload: Vec<u8>,
}

/// What recovery found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Committed batches, oldest first.
    pub batches: Vec<Vec<JournalOp>>,
    /// Batches dropped because they never committed.
    pub discarded: usize,
    /// Bytes cut off the tail (torn or uncommitted records).
    pub truncated_bytes: u64,
}

/// Append-only journal of committed multi-updates.
pub struct CommitJournal {
    /// Path to the journal file.
    path: PathBuf,
    /// Next Log Sequence Number.
    lsn: AtomicU64,
    /// File handle (protected by mutex for writes).
    file: Mutex<BufWriter<File>>,
}

impl CommitJournal {
    /// Opens or creates a journal and recovers its committed batches.
    ///
    /// Torn or uncommitted tails are cut off so new records follow the last
    /// committed one.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::StorageRead`] if the file cannot be opened or
    /// carries a foreign header.
    pub fn open(path: impl AsRef<Path>) -> EconomyResult<(Self, Recovery)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| EconomyError::StorageRead(format!("failed to open journal: {e}")))?;

        let len = file
            .metadata()
            .map_err(|e| EconomyError::StorageRead(format!("failed to stat journal: {e}")))?
            .len();

        if len == 0 {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(JOURNAL_MAGIC);
            header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
            header.extend_from_slice(&0u64.to_le_bytes());
            file.write_all(&header)
                .and_then(|()| file.sync_all())
                .map_err(|e| EconomyError::StorageWrite(format!("failed to write header: {e}")))?;
        }

        let (recovery, valid_len, max_lsn) = Self::recover(&path)?;

        file.set_len(valid_len)
            .map_err(|e| EconomyError::StorageWrite(format!("failed to truncate journal: {e}")))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| EconomyError::StorageWrite(format!("failed to seek journal: {e}")))?;

        if recovery.discarded > 0 || recovery.truncated_bytes > 0 {
            tracing::warn!(
                "Journal recovery: {} uncommitted batches discarded, {} bytes truncated",
                recovery.discarded,
                recovery.truncated_bytes
            );
        }

        let journal = Self {
            path,
            lsn: AtomicU64::new(max_lsn.map_or(0, |l| l + 1)),
            file: Mutex::new(BufWriter::new(file)),
        };

        Ok((journal, recovery))
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Journals a whole batch and syncs it. After this returns the batch
    /// survives a crash.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::StorageWrite`] on any I/O failure. A batch that
    /// never got its COMMIT record is discarded on recovery.
    pub fn append_batch(&self, ops: &[JournalOp]) -> EconomyResult<()> {
        let mut file = self.file.lock();

        write_record(&mut file, self.next_lsn(), RecordType::Begin, &[])?;
        for op in ops {
            let payload = serde_json::to_vec(op)?;
            write_record(&mut file, self.next_lsn(), RecordType::Operation, &payload)?;
        }
        write_record(&mut file, self.next_lsn(), RecordType::Commit, &[])?;

        file.flush()
            .map_err(|e| EconomyError::StorageWrite(format!("journal flush failed: {e}")))?;
        file.get_ref()
            .sync_all()
            .map_err(|e| EconomyError::StorageWrite(format!("journal sync failed: {e}")))
    }

    fn next_lsn(&self) -> u64 {
        self.lsn.fetch_add(1, Ordering::SeqCst)
    }

    /// Scans the file. Returns recovery, the length to keep, and the highest LSN.
    fn recover(path: &Path) -> EconomyResult<(Recovery, u64, Option<u64>)> {
        let file = File::open(path)
            .map_err(|e| EconomyError::StorageRead(format!("failed to open journal: {e}")))?;
        let total_len = file
            .metadata()
            .map_err(|e| EconomyError::StorageRead(format!("failed to stat journal: {e}")))?
            .len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| EconomyError::StorageRead(format!("failed to read header: {e}")))?;
        if &header[0..4] != JOURNAL_MAGIC {
            return Err(EconomyError::StorageRead("invalid journal magic".to_string()));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != JOURNAL_VERSION {
            return Err(EconomyError::StorageRead(format!(
                "unsupported journal version: {version}"
            )));
        }

        let mut recovery = Recovery::default();
        let mut current: Option<Vec<JournalOp>> = None;
        let mut offset = HEADER_LEN;
        let mut valid_len = HEADER_LEN;
        let mut max_lsn = None;

        while let Some((record, size)) = read_record(&mut reader) {
            offset += size;
            max_lsn = Some(max_lsn.map_or(record.lsn, |m: u64| m.max(record.lsn)));

            match record.record_type {
                RecordType::Begin => {
                    if current.replace(Vec::new()).is_some() {
                        recovery.discarded += 1;
                    }
                }
                RecordType::Operation => {
                    let Ok(op) = serde_json::from_slice::<JournalOp>(&record.payload) else {
                        break;
                    };
                    if let Some(ops) = current.as_mut() {
                        ops.push(op);
                    }
                }
                RecordType::Commit => {
                    if let Some(ops) = current.take() {
                        recovery.batches.push(ops);
                    }
                    valid_len = offset;
                }
            }
        }

        if current.is_some() {
            recovery.discarded += 1;
        }
        recovery.truncated_bytes = total_len.saturating_sub(valid_len);

        Ok((recovery, valid_len, max_lsn))
    }
}

/// Frames, checksums and writes one record.
fn write_record(
    file: &mut BufWriter<File>,
    lsn: u64,
    record_type: RecordType,
    payload: &[u8],
) -> EconomyResult<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| EconomyError::StorageWrite("journal payload too large".to_string()))?;

    let mut frame = Vec::with_capacity(8 + 1 + 4 + payload.len() + 4);
    frame.extend_from_slice(&lsn.to_le_bytes());
    frame.push(record_type as u8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);

    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    file.write_all(&frame)
        .map_err(|e| EconomyError::StorageWrite(format!("journal write failed: {e}")))
}

/// Reads one record. `None` on end of file, a torn frame, or a CRC mismatch.
fn read_record(reader: &mut impl Read) -> Option<(JournalRecord, u64)> {
    let mut head = [0u8; 13];
    reader.read_exact(&mut head).ok()?;

    let lsn = u64::from_le_bytes(head[0..8].try_into().ok()?);
    let record_type = RecordType::from_u8(head[8])?;
    let payload_len = u32::from_le_bytes(head[9..13].try_into().ok()?) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return None;
    }

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).ok()?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes).ok()?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&head);
    hasher.update(&payload);
    if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
        return None;
    }

    let size = (head.len() + payload_len + crc_bytes.len()) as u64;
    Some((
        JournalRecord {
            lsn,
            record_type,
            payload,
        },
        size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_journal_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_journal_{id}.jnl"))
    }

    fn ledger_op(owner: &str, gold: i64) -> JournalOp {
        JournalOp::Ledger {
            owner: owner.to_string(),
            changes: BTreeMap::from([("gold".to_string(), gold)]),
        }
    }

    #[test]
    fn test_journal_create_and_open() {
        let path = temp_journal_path();
        {
            let (_journal, recovery) = CommitJournal::open(&path).unwrap();
            assert!(recovery.batches.is_empty());
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_LEN);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_committed_batches_are_recovered_in_order() {
        let path = temp_journal_path();
        {
            let (journal, _) = CommitJournal::open(&path).unwrap();
            journal.append_batch(&[ledger_op("a", 10)]).unwrap();
            journal
                .append_batch(&[ledger_op("b", 20), ledger_op("b", -5)])
                .unwrap();
        }

        let (_journal, recovery) = CommitJournal::open(&path).unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.batches[1].len(), 2);
        assert_eq!(recovery.batches[0][0], ledger_op("a", 10));
        assert_eq!(recovery.discarded, 0);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_abandoned_batch_is_not_replayed() {
        let path = temp_journal_path();
        {
            let (journal, _) = CommitJournal::open(&path).unwrap();

            // A batch that died before COMMIT, followed by a committed one.
            {
                let mut file = journal.file.lock();
                write_record(&mut file, journal.next_lsn(), RecordType::Begin, &[]).unwrap();
                let op = serde_json::to_vec(&ledger_op("a", 2)).unwrap();
                write_record(&mut file, journal.next_lsn(), RecordType::Operation, &op).unwrap();
            }
            journal.append_batch(&[ledger_op("a", 3)]).unwrap();
        }

        let (_journal, recovery) = CommitJournal::open(&path).unwrap();
        assert_eq!(recovery.batches, vec![vec![ledger_op("a", 3)]]);
        assert_eq!(recovery.discarded, 1);
        assert_eq!(recovery.truncated_bytes, 0);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_uncommitted_tail_is_truncated() {
        let path = temp_journal_path();
        {
            let (journal, _) = CommitJournal::open(&path).unwrap();
            journal.append_batch(&[ledger_op("a", 5)]).unwrap();

            // Crash after BEGIN + OP, before COMMIT.
            let mut file = journal.file.lock();
            write_record(&mut file, 100, RecordType::Begin, &[]).unwrap();
            let op = serde_json::to_vec(&ledger_op("a", 999)).unwrap();
            write_record(&mut file, 101, RecordType::Operation, &op).unwrap();
            file.flush().unwrap();
        }

        let (journal, recovery) = CommitJournal::open(&path).unwrap();
        assert_eq!(recovery.batches, vec![vec![ledger_op("a", 5)]]);
        assert_eq!(recovery.discarded, 1);
        assert!(recovery.truncated_bytes > 0);

        // New batches land after the last committed record.
        journal.append_batch(&[ledger_op("a", 7)]).unwrap();
        drop(journal);

        let (_journal, recovery) = CommitJournal::open(&path).unwrap();
        assert_eq!(recovery.batches.len(), 2);
        assert_eq!(recovery.discarded, 0);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupted_record_stops_replay() {
        let path = temp_journal_path();
        {
            let (journal, _) = CommitJournal::open(&path).unwrap();
            journal.append_batch(&[ledger_op("a", 5)]).unwrap();
            journal.append_batch(&[ledger_op("a", 6)]).unwrap();
        }

        // Flip one byte in the last record's CRC.
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let (_journal, recovery) = CommitJournal::open(&path).unwrap();
        assert_eq!(recovery.batches, vec![vec![ledger_op("a", 5)]]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_rejects_foreign_file() {
        let path = temp_journal_path();
        fs::write(&path, b"NOPE0000000000000000").unwrap();

        assert!(CommitJournal::open(&path).is_err());

        fs::remove_file(&path).ok();
    }
}
