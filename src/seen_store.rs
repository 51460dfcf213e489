//! C2: Seen-Hash Store. An append-only binary log of `(timestamp, hash)`
//! pairs backing the dedup layer (§3, §4.2). A single shared store covers
//! every group (§6: `seen_ids.bin`), not one file per group. Uses plain
//! synchronous file I/O that opens and rewrites the file directly rather
//! than pooling connections; the "database" is a flat file of fixed-size
//! records.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

const RECORD_LEN: u64 = 12;

pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the full set of known hashes, discarding timestamps. Absent or
    /// empty files load as empty. A file whose size is not a multiple of the
    /// 12-byte record is corrupt: delete it and start fresh (§4.2).
    pub fn load(&self) -> Result<HashSet<u64>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        if bytes.is_empty() {
            return Ok(HashSet::new());
        }

        if bytes.len() as u64 % RECORD_LEN != 0 {
            tracing::warn!(path = %self.path.display(), len = bytes.len(), "seen-hash store corrupt, resetting");
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(self.io_err(e));
                }
            }
            return Ok(HashSet::new());
        }

        let mut hashes = HashSet::with_capacity(bytes.len() / RECORD_LEN as usize);
        for chunk in bytes.chunks_exact(RECORD_LEN as usize) {
            let hash = u64::from_le_bytes(chunk[4..12].try_into().unwrap());
            hashes.insert(hash);
        }
        Ok(hashes)
    }

    /// Append one record per new hash, stamped with the current time.
    /// Per §4.2, a failure here is logged and swallowed: a skipped append
    /// only risks a duplicate article on a later run, never corruption.
    pub fn append(&self, new_hashes: &[u64]) {
        if new_hashes.is_empty() {
            return;
        }
        if let Err(e) = self.try_append(new_hashes) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append seen hashes");
        }
    }

    fn try_append(&self, new_hashes: &[u64]) -> Result<()> {
        let now = now_u32();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.seek(SeekFrom::End(0)).map_err(|e| self.io_err(e))?;

        let mut buf = Vec::with_capacity(new_hashes.len() * RECORD_LEN as usize);
        for hash in new_hashes {
            buf.extend_from_slice(&now.to_le_bytes());
            buf.extend_from_slice(&hash.to_le_bytes());
        }
        file.write_all(&buf).map_err(|e| self.io_err(e))
    }

    /// Drop entries older than `retention_days`. If retention is longer than
    /// the store's age, or nothing qualifies for pruning, the file is left
    /// untouched (no rewrite on a no-op, §4.2).
    pub fn prune(&self, retention_days: u32) -> Result<()> {
        let mut file = match std::fs::OpenOptions::new().read(true).open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(self.io_err(e)),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| self.io_err(e))?;
        drop(file);

        if bytes.len() as u64 % RECORD_LEN != 0 {
            tracing::warn!(path = %self.path.display(), "seen-hash store corrupt during prune, resetting");
            std::fs::remove_file(&self.path).map_err(|e| self.io_err(e))?;
            return Ok(());
        }

        let now = now_u32();
        let cutoff = now.saturating_sub(retention_days.saturating_mul(86_400));

        let mut kept = Vec::with_capacity(bytes.len());
        let mut dropped_any = false;
        for chunk in bytes.chunks_exact(RECORD_LEN as usize) {
            let ts = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            if ts >= cutoff {
                kept.extend_from_slice(chunk);
            } else {
                dropped_any = true;
            }
        }

        if !dropped_any {
            return Ok(());
        }

        let mut out = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        out.write_all(&kept).map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> Error {
        Error::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// The single shared seen-hash store path for the whole core (§6):
/// `<state_dir>/seen_ids.bin`, a content-addressed history of every hash
/// emitted across every group, not one file per group.
pub fn default_path(state_dir: &Path) -> PathBuf {
    state_dir.join("seen_ids.bin")
}

fn now_u32() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, SeenStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("group.seen");
        (dir, SeenStore::new(path))
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn append_then_load_round_trips_hashes() {
        let (_dir, store) = temp_store();
        store.append(&[1, 2, 3]);
        let loaded = store.load().unwrap();
        assert_eq!(loaded, [1u64, 2, 3].into_iter().collect());
    }

    #[test]
    fn load_detects_and_heals_corrupt_file() {
        let (dir, store) = temp_store();
        std::fs::write(dir.path().join("group.seen"), [0u8; 13]).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());
        assert!(!dir.path().join("group.seen").exists());
    }

    #[test]
    fn prune_keeps_entries_within_retention() {
        let (dir, store) = temp_store();
        let path = dir.path().join("group.seen");
        let now = now_u32();
        let old_ts = now.saturating_sub(200 * 86_400);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&old_ts.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&now.to_le_bytes());
        bytes.extend_from_slice(&2u64.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        store.prune(50).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, [2u64].into_iter().collect());
    }

    #[test]
    fn prune_is_noop_when_nothing_expires() {
        let (dir, store) = temp_store();
        store.append(&[42]);
        let before = std::fs::read(dir.path().join("group.seen")).unwrap();
        store.prune(365).unwrap();
        let after = std::fs::read(dir.path().join("group.seen")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn prune_missing_file_is_ok() {
        let (_dir, store) = temp_store();
        assert!(store.prune(10).is_ok());
    }
}
