//! Durable version store backed by a single JSON snapshot file
//!
//! Every commit rewrites the whole table:
//! 1. serialize rows and compute CRC32 over them
//! 2. write `<path>.tmp` and fsync it
//! 3. rename over `<path>`
//!
//! A reader therefore sees either the previous or the next committed state,
//! never a partial one. On open the checksum is verified; a mismatch is a
//! fatal `StorageUnavailable`.
//!
//! Several handles may share one file. Commits take `<path>.lock` and
//! reload the snapshot if its checksum differs from the one this handle
//! last read or wrote, so a unit staged against older state fails with
//! `ConcurrentModification` instead of overwriting the newer rows.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::memory::{SnapshotSink, Table};
use super::{MemoryStore, Transaction, VersionReader, VersionStore};
use crate::errors::{EvcError, EvcResult};
use crate::events::EventPublisher;
use crate::model::{RecordKey, RootId, VersionId, VersionRecord, VersionedEntity};
use crate::observability::{log_event_with_fields, Event};

const FORMAT_VERSION: u32 = 1;

const LOCK_ATTEMPTS: u32 = 500;
const LOCK_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    format: u32,
    table: String,
    checksum: String,
    rows: Value,
}

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// `crc32:xxxxxxxx`
fn format_checksum(checksum: u32) -> String {
    format!("crc32:{:08x}", checksum)
}

fn rows_checksum(rows: &Value) -> EvcResult<String> {
    let bytes = serde_json::to_vec(rows).map_err(|e| EvcError::storage(e.to_string()))?;
    Ok(format_checksum(compute_checksum(&bytes)))
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

fn lock_path(path: &Path) -> PathBuf {
    sibling_path(path, ".lock")
}

/// Exclusive `<path>.lock`, removed on drop.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> EvcResult<Self> {
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => thread::sleep(LOCK_BACKOFF),
                Err(e) => return Err(e.into()),
            }
        }
        Err(EvcError::storage(format!(
            "{} is held by another writer",
            path.display()
        )))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[derive(Debug)]
struct JsonFileSink {
    path: PathBuf,
    table: &'static str,
    /// Checksum of the snapshot this handle last read or wrote; `None` while
    /// no file exists
    seen: Mutex<Option<String>>,
}

impl<E: VersionedEntity> SnapshotSink<E> for JsonFileSink {
    fn lock(&self) -> EvcResult<Box<dyn Send>> {
        Ok(Box::new(LockFile::acquire(lock_path(&self.path))?))
    }

    fn refresh(&self) -> EvcResult<Option<Vec<VersionRecord<E>>>> {
        let mut seen = self.seen.lock().map_err(|_| EvcError::poisoned())?;
        let stored = if self.path.exists() {
            Some(read_snapshot(&self.path, E::TABLE)?)
        } else {
            None
        };
        if stored.as_ref().map(|s| &s.checksum) == seen.as_ref() {
            return Ok(None);
        }

        let (records, checksum) = match stored {
            Some(snapshot) => {
                let checksum = snapshot.checksum.clone();
                (decode_rows(&self.path, snapshot)?, Some(checksum))
            }
            None => (Vec::new(), None),
        };
        log_event_with_fields(
            Event::StoreRefreshed,
            &[
                ("table", self.table),
                ("rows", &records.len().to_string()),
                ("path", &self.path.display().to_string()),
            ],
        );
        *seen = checksum;
        Ok(Some(records))
    }

    fn persist(&self, records: &[VersionRecord<E>]) -> EvcResult<()> {
        let mut seen = self.seen.lock().map_err(|_| EvcError::poisoned())?;
        let rows = serde_json::to_value(records).map_err(|e| EvcError::storage(e.to_string()))?;
        let snapshot = SnapshotFile {
            format: FORMAT_VERSION,
            table: self.table.to_string(),
            checksum: rows_checksum(&rows)?,
            rows,
        };
        let bytes =
            serde_json::to_vec_pretty(&snapshot).map_err(|e| EvcError::storage(e.to_string()))?;

        let tmp = temp_path(&self.path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        *seen = Some(snapshot.checksum);

        log_event_with_fields(
            Event::StorePersisted,
            &[
                ("table", self.table),
                ("rows", &records.len().to_string()),
                ("path", &self.path.display().to_string()),
            ],
        );
        Ok(())
    }
}

/// Version store persisted to a JSON file.
///
/// Reads are served from memory; commits are durable before they become
/// visible.
#[derive(Debug, Clone)]
pub struct JsonFileStore<E> {
    path: PathBuf,
    inner: MemoryStore<E>,
}

impl<E: VersionedEntity> JsonFileStore<E> {
    /// Opens `path`, creating an empty store if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> EvcResult<Self> {
        Self::open_inner(path.as_ref(), None)
    }

    pub fn open_with_publisher(
        path: impl AsRef<Path>,
        publisher: Arc<dyn EventPublisher>,
    ) -> EvcResult<Self> {
        Self::open_inner(path.as_ref(), Some(publisher))
    }

    fn open_inner(path: &Path, publisher: Option<Arc<dyn EventPublisher>>) -> EvcResult<Self> {
        let (table, seen) = if path.exists() {
            let snapshot = read_snapshot(path, E::TABLE)?;
            let checksum = snapshot.checksum.clone();
            let records = decode_rows(path, snapshot)?;
            let table = Table::from_records(records).map_err(|e| corrupt(path, e.to_string()))?;
            (table, Some(checksum))
        } else {
            (Table::default(), None)
        };

        log_event_with_fields(
            Event::StoreLoaded,
            &[
                ("table", E::TABLE),
                ("rows", &table.len().to_string()),
                ("path", &path.display().to_string()),
            ],
        );

        let sink = JsonFileSink {
            path: path.to_path_buf(),
            table: E::TABLE,
            seen: Mutex::new(seen),
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::with_sink(table, Box::new(sink), publisher),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view of the committed state.
    pub fn memory(&self) -> &MemoryStore<E> {
        &self.inner
    }
}

fn corrupt(path: &Path, reason: String) -> EvcError {
    log_event_with_fields(
        Event::StoreCorrupt,
        &[("path", &path.display().to_string()), ("reason", &reason)],
    );
    EvcError::storage(format!("{}: {}", path.display(), reason))
}

/// Reads the snapshot at `path`, verifying format, table and checksum.
fn read_snapshot(path: &Path, table: &str) -> EvcResult<SnapshotFile> {
    let bytes = fs::read(path)?;
    let snapshot: SnapshotFile =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e.to_string()))?;

    if snapshot.format != FORMAT_VERSION {
        return Err(corrupt(
            path,
            format!("unsupported format {}", snapshot.format),
        ));
    }
    if snapshot.table != table {
        return Err(corrupt(
            path,
            format!(
                "file holds table '{}', expected '{}'",
                snapshot.table, table
            ),
        ));
    }
    let actual = rows_checksum(&snapshot.rows)?;
    if actual != snapshot.checksum {
        return Err(corrupt(
            path,
            format!(
                "checksum mismatch: stored {}, computed {}",
                snapshot.checksum, actual
            ),
        ));
    }
    Ok(snapshot)
}

fn decode_rows<E: VersionedEntity>(
    path: &Path,
    snapshot: SnapshotFile,
) -> EvcResult<Vec<VersionRecord<E>>> {
    serde_json::from_value(snapshot.rows).map_err(|e| corrupt(path, e.to_string()))
}

impl<E: VersionedEntity> VersionReader<E> for JsonFileStore<E> {
    fn get(&self, id: VersionId) -> EvcResult<Option<VersionRecord<E>>> {
        self.inner.get(id)
    }

    fn head(&self, key: &RecordKey) -> EvcResult<Option<VersionRecord<E>>> {
        self.inner.head(key)
    }

    fn versions_of(&self, root_id: RootId) -> EvcResult<Vec<VersionRecord<E>>> {
        self.inner.versions_of(root_id)
    }

    fn root_ids(&self) -> EvcResult<Vec<RootId>> {
        self.inner.root_ids()
    }
}

impl<E: VersionedEntity> VersionStore<E> for JsonFileStore<E> {
    type Unit = Transaction<E>;

    fn begin(&self) -> EvcResult<Transaction<E>> {
        self.inner.begin()
    }
}
