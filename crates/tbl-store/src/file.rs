//! Crash-recoverable file store.
//!
//! Every successful compare-and-swap appends one framed record to
//! `<dir>/store.log`:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of length bytes + payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized StoreRecord)]
//! ```
//!
//! The in-memory index is rebuilt by replaying the log on open. Only an
//! incomplete frame at the very end of the file (a crash mid-write) is cut
//! off. Any other damage fails the open with [`StoreError::Corrupt`]:
//! dropping a record would roll a counter back and re-issue its numbers.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{StoreConfig, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::lock::{read_within, write_within};
use crate::traits::{validate_key, CasOutcome, KvStore, Versioned};

const LOG_FILE: &str = "store.log";
const COMPACT_FILE: &str = "store.log.compact";
const HEADER_SIZE: usize = 8;
/// Frames longer than this are treated as a damaged length field.
const MAX_PAYLOAD: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct StoreRecord {
    key: String,
    version: u64,
    value: Vec<u8>,
}

struct FileState {
    entries: HashMap<String, Versioned>,
    file: File,
    /// Length of the valid prefix of the log.
    offset: u64,
}

/// Log sizes around a [`FileStore::compact`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionStats {
    pub before: u64,
    pub after: u64,
    pub keys: usize,
}

/// Key-value store persisted to an append-only log file.
///
/// Writes are serialized through one lock and published to readers only
/// after the record has reached the file (and the disk, under
/// [`SyncMode::EveryWrite`]). Intended for a single process.
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    state: RwLock<FileState>,
}

impl FileStore {
    /// Open (or create) the store in `dir`, replaying any existing log.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let (entries, valid_len) = replay(&path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn tail of store log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), keys = entries.len(), "file store opened");
        Ok(Self {
            path,
            config,
            state: RwLock::new(FileState {
                entries,
                file,
                offset: valid_len,
            }),
        })
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn log_len(&self) -> StoreResult<u64> {
        Ok(read_within(&self.state, self.config.operation_timeout(), "log_len")?.offset)
    }

    /// Rewrite the log so it holds only the latest version of each key.
    ///
    /// The compacted log is written and synced beside the live one, then
    /// renamed over it. The handle opened on the new file stays valid across
    /// the rename, so a failure at any step leaves the store usable.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut state = write_within(&self.state, self.config.operation_timeout(), "compact")?;
        let tmp = self.path.with_file_name(COMPACT_FILE);

        let mut keys: Vec<&String> = state.entries.keys().collect();
        keys.sort();

        let mut buf = Vec::new();
        for key in keys {
            let entry = &state.entries[key];
            let record = StoreRecord {
                key: key.clone(),
                version: entry.version,
                value: entry.value.clone(),
            };
            buf.extend_from_slice(&frame(&record)?);
        }

        let written = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&tmp)
            .and_then(|mut out| {
                // Left over from an earlier failed run.
                out.set_len(0)?;
                out.write_all(&buf)?;
                out.sync_all()?;
                Ok(out)
            })
            .and_then(|out| fs::rename(&tmp, &self.path).map(|()| out));
        let out = match written {
            Ok(out) => out,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&tmp) {
                    debug!(error = %cleanup, "no compaction file to clean up");
                }
                return Err(e.into());
            }
        };

        let stats = CompactionStats {
            before: state.offset,
            after: buf.len() as u64,
            keys: state.entries.len(),
        };
        state.file = out;
        state.offset = stats.after;
        sync_dir(&self.path)?;

        info!(
            before = stats.before,
            after = stats.after,
            keys = stats.keys,
            "store log compacted"
        );
        Ok(stats)
    }

    fn append(&self, state: &mut FileState, bytes: &[u8]) -> io::Result<()> {
        let result = state.file.write_all(bytes).and_then(|()| match self.config.sync_mode {
            SyncMode::EveryWrite => state.file.sync_data(),
            SyncMode::OsDefault => Ok(()),
        });

        if let Err(e) = result {
            // Drop any partial frame so the next append starts clean.
            if let Err(trunc) = state.file.set_len(state.offset) {
                warn!(error = %trunc, "failed to roll back partial store record");
            }
            return Err(e);
        }
        state.offset += bytes.len() as u64;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        validate_key(key)?;
        let state = read_within(&self.state, self.config.operation_timeout(), "get")?;
        Ok(state.entries.get(key).cloned())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: Vec<u8>,
    ) -> StoreResult<CasOutcome> {
        validate_key(key)?;
        let mut state = write_within(
            &self.state,
            self.config.operation_timeout(),
            "compare_and_swap",
        )?;

        let current = state.entries.get(key).map(|v| v.version);
        if current != expected {
            debug!(key, ?expected, ?current, "compare-and-swap conflict");
            return Ok(CasOutcome::Conflict { current });
        }

        let record = StoreRecord {
            key: key.to_string(),
            version: current.unwrap_or(0) + 1,
            value,
        };
        let bytes = frame(&record)?;
        self.append(&mut state, &bytes)?;

        let version = record.version;
        state.entries.insert(
            record.key,
            Versioned {
                version,
                value: record.value,
            },
        );
        Ok(CasOutcome::Swapped { version })
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Versioned)>> {
        let state = read_within(&self.state, self.config.operation_timeout(), "scan")?;
        let mut result: Vec<(String, Versioned)> = state
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn frame(record: &StoreRecord) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if payload.len() > MAX_PAYLOAD {
        return Err(StoreError::Serialization(format!(
            "record of {} bytes exceeds {MAX_PAYLOAD}",
            payload.len()
        )));
    }
    let length = (payload.len() as u32).to_le_bytes();

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&length);
    out.extend_from_slice(&checksum(length, &payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn checksum(length: [u8; 4], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&length);
    hasher.update(payload);
    hasher.finalize()
}

/// A frame starting at `offset` that is complete and passes its checksum.
/// Returns the payload range.
fn valid_frame(bytes: &[u8], offset: usize) -> Option<(usize, usize)> {
    let header = bytes.get(offset..offset.checked_add(HEADER_SIZE)?)?;
    let length = [header[0], header[1], header[2], header[3]];
    let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let len = u32::from_le_bytes(length) as usize;
    if len == 0 || len > MAX_PAYLOAD {
        return None;
    }
    let start = offset + HEADER_SIZE;
    let payload = bytes.get(start..start + len)?;
    (checksum(length, payload) == expected).then_some((start, start + len))
}

/// Whether the bytes from `offset` on can be the remains of one interrupted
/// append: no intact frame starts anywhere after it, and the damaged frame
/// does not fit inside the file.
fn is_torn_tail(bytes: &[u8], offset: usize) -> bool {
    let rest = &bytes[offset..];
    if rest.iter().all(|&b| b == 0) {
        return true;
    }
    let incomplete = match rest.get(..4) {
        Some(h) => {
            let len = u32::from_le_bytes([h[0], h[1], h[2], h[3]]) as usize;
            len > 0 && len <= MAX_PAYLOAD && HEADER_SIZE + len > rest.len()
        }
        None => true,
    };
    incomplete && !(offset + 1..bytes.len()).any(|at| valid_frame(bytes, at).is_some())
}

fn corrupt(offset: usize, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        offset: offset as u64,
        reason: reason.into(),
    }
}

/// Rebuild the index from the log. Returns the index and the length of the
/// valid prefix of the file.
fn replay(path: &Path) -> StoreResult<(HashMap<String, Versioned>, u64)> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let mut entries: HashMap<String, Versioned> = HashMap::new();
    let mut offset = 0usize;
    let mut records = 0usize;

    while offset < bytes.len() {
        let Some((start, end)) = valid_frame(&bytes, offset) else {
            if is_torn_tail(&bytes, offset) {
                warn!(
                    offset,
                    remaining = bytes.len() - offset,
                    "incomplete store record at end of log"
                );
                break;
            }
            return Err(corrupt(offset, "damaged record header or checksum"));
        };

        let record: StoreRecord = bincode::deserialize(&bytes[start..end])
            .map_err(|e| corrupt(offset, format!("undecodable record: {e}")))?;
        let current = entries.get(&record.key).map_or(0, |v| v.version);
        if record.version != current + 1 {
            return Err(corrupt(
                offset,
                format!(
                    "key {:?} jumps from version {current} to {}",
                    record.key, record.version
                ),
            ));
        }
        entries.insert(
            record.key,
            Versioned {
                version: record.version,
                value: record.value,
            },
        );
        records += 1;
        offset = end;
    }

    debug!(records, keys = entries.len(), "store log replayed");
    Ok((entries, offset as u64))
}

/// Persist a rename inside the directory holding `path`.
#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
