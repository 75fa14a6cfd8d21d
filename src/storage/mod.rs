// src/storage/mod.rs

//! Filesystem-backed thread state.
//!
//! There is no index file: the directory tree is the durable state and
//! [`ThreadStateStore::load`] reconstructs everything from it, so a fresh
//! start and a resume go through the same path.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! └── {board}/
//!     ├── threads_on_boards.json         # roster of known ids (convenience)
//!     └── {no}_{first_seen}/
//!         ├── meta.json                 # first_seen, last_modified, status
//!         └── posts_{timestamp}.json    # one snapshot per successful fetch
//! ```
//!
//! All writes go through temp-file-plus-rename, so an interrupted write
//! leaves at most a `.tmp` file, which `load` ignores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ThreadKey, ThreadRecord, ThreadStatus};

const META_FILE: &str = "meta.json";
const ROSTER_FILE: &str = "threads_on_boards.json";

/// One line of the per-board roster file.
#[derive(Debug, Serialize)]
struct RosterEntry {
    no: u64,
    first_seen: i64,
    last_modified: i64,
    status: ThreadStatus,
}

/// Durable mapping from (board, thread id) to lifecycle metadata.
///
/// Owns all `ThreadRecord` mutation; everything else reads.
pub struct ThreadStateStore {
    root: PathBuf,
    records: HashMap<ThreadKey, ThreadRecord>,
}

impl ThreadStateStore {
    /// Rebuild state by scanning the storage tree, creating the root if
    /// this is a fresh start.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut records = HashMap::new();
        let mut boards = fs::read_dir(&root).await?;
        while let Some(board_entry) = boards.next_entry().await? {
            if !board_entry.file_type().await?.is_dir() {
                continue;
            }
            let board = board_entry.file_name().to_string_lossy().to_string();

            let mut threads = fs::read_dir(board_entry.path()).await?;
            while let Some(thread_entry) = threads.next_entry().await? {
                if !thread_entry.file_type().await?.is_dir() {
                    continue;
                }
                let dir_name = thread_entry.file_name().to_string_lossy().to_string();
                let Some((no, first_seen)) = parse_thread_dir(&dir_name) else {
                    log::warn!(
                        "Skipping unrecognized directory {:?} under /{}/",
                        dir_name,
                        board
                    );
                    continue;
                };

                let record = match read_meta(&thread_entry.path().join(META_FILE)).await {
                    Some(meta) => ThreadRecord {
                        // The directory name is the authoritative key.
                        first_seen,
                        last_modified: meta.last_modified,
                        status: meta.status,
                    },
                    // A partially written thread directory resumes as
                    // alive with no recorded last-modified.
                    None => ThreadRecord::new(first_seen),
                };
                records.insert(ThreadKey::new(board.clone(), no), record);
            }
        }

        Ok(Self { root, records })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ThreadKey) -> Option<&ThreadRecord> {
        self.records.get(key)
    }

    /// Records for one board, keyed by thread id.
    pub fn board_view(&self, board: &str) -> HashMap<u64, ThreadRecord> {
        self.records
            .iter()
            .filter(|(key, _)| key.board == board)
            .map(|(key, record)| (key.no, record.clone()))
            .collect()
    }

    /// Count of records for one board, alive and dead.
    pub fn board_counts(&self, board: &str) -> (usize, usize) {
        self.records
            .iter()
            .filter(|(key, _)| key.board == board)
            .fold((0, 0), |(alive, dead), (_, record)| {
                if record.is_dead() {
                    (alive, dead + 1)
                } else {
                    (alive + 1, dead)
                }
            })
    }

    /// Storage directory of one thread. Deterministic in (board, id,
    /// first_seen); never changes for the life of the record.
    pub fn thread_dir(&self, key: &ThreadKey, first_seen: i64) -> PathBuf {
        self.root
            .join(&key.board)
            .join(format!("{}_{}", key.no, first_seen))
    }

    /// Insert or update a record and durably rewrite its `meta.json`.
    ///
    /// This is the only path that advances `last_modified`. For an
    /// existing record `first_seen` is taken from the stored value, never
    /// from the argument.
    pub async fn upsert(&mut self, key: &ThreadKey, mut record: ThreadRecord) -> Result<()> {
        if let Some(existing) = self.records.get(key) {
            record.first_seen = existing.first_seen;
            // Dead is terminal; a late successful fetch does not revive.
            if existing.is_dead() {
                record.status = ThreadStatus::Dead;
            }
        }

        self.write_meta(key, &record).await?;
        self.records.insert(key.clone(), record);
        Ok(())
    }

    /// Flip a record to dead and persist the transition. Idempotent;
    /// unknown keys are ignored.
    pub async fn mark_dead(&mut self, key: &ThreadKey) -> Result<()> {
        let Some(record) = self.records.get(key) else {
            return Ok(());
        };
        if record.is_dead() {
            return Ok(());
        }

        let mut updated = record.clone();
        updated.status = ThreadStatus::Dead;
        self.write_meta(key, &updated).await?;
        self.records.insert(key.clone(), updated);
        Ok(())
    }

    /// Rewrite the per-board roster file from current records.
    pub async fn write_roster(&self, board: &str) -> Result<()> {
        let mut entries: Vec<RosterEntry> = self
            .records
            .iter()
            .filter(|(key, _)| key.board == board)
            .map(|(key, record)| RosterEntry {
                no: key.no,
                first_seen: record.first_seen,
                last_modified: record.last_modified,
                status: record.status,
            })
            .collect();
        entries.sort_by_key(|e| e.no);

        let path = self.root.join(board).join(ROSTER_FILE);
        let bytes = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&path, &bytes).await
    }

    async fn write_meta(&self, key: &ThreadKey, record: &ThreadRecord) -> Result<()> {
        let path = self.thread_dir(key, record.first_seen).join(META_FILE);
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|e| AppError::storage(path.display().to_string(), e))
    }
}

/// Write one post-collection snapshot into a thread's directory.
///
/// Snapshots accumulate; earlier captures are never rewritten, so the
/// history of edits and deletions survives.
pub async fn write_snapshot(dir: &Path, body: &str) -> Result<PathBuf> {
    let name = format!("posts_{}.json", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let path = dir.join(name);
    write_atomic(&path, body.as_bytes()).await?;
    Ok(path)
}

/// Parse `{no}_{first_seen}` directory names.
fn parse_thread_dir(name: &str) -> Option<(u64, i64)> {
    let (no, first_seen) = name.split_once('_')?;
    Some((no.parse().ok()?, first_seen.parse().ok()?))
}

async fn read_meta(path: &Path) -> Option<ThreadRecord> {
    let bytes = fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Unreadable {:?}: {}", path, e);
            None
        }
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    Ok(())
}
