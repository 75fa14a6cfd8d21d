// src/models/thread.rs

//! Thread lifecycle state and catalog payloads.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key identifying one thread: board code plus platform-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey {
    pub board: String,
    pub no: u64,
}

impl ThreadKey {
    pub fn new(board: impl Into<String>, no: u64) -> Self {
        Self {
            board: board.into(),
            no,
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.board, self.no)
    }
}

/// Lifecycle status of a tracked thread.
///
/// Dead is terminal: a thread id reappearing in a later catalog is never
/// revived under the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Alive,
    Dead,
}

/// Durable per-thread metadata, persisted as `meta.json` inside the
/// thread's storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Capture timestamp (unix seconds), set once when the thread is first
    /// observed. Part of the storage path, never rewritten.
    pub first_seen: i64,
    /// Remote last-modified (unix seconds) as of the latest successful
    /// archival. Zero when unknown.
    pub last_modified: i64,
    pub status: ThreadStatus,
}

impl ThreadRecord {
    /// Fresh record for a thread first observed now.
    pub fn new(first_seen: i64) -> Self {
        Self {
            first_seen,
            last_modified: 0,
            status: ThreadStatus::Alive,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status == ThreadStatus::Dead
    }
}

/// One entry of the per-board thread catalog.
///
/// The catalog carries more (reply counts, page position); only id and
/// last-modified matter for reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogThread {
    pub no: u64,
    pub last_modified: i64,
}

/// One page of the per-board thread catalog payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    pub page: u32,
    pub threads: Vec<CatalogThread>,
}

/// Ephemeral per-board, per-cycle view of live threads.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Live thread id -> remote last-modified.
    pub threads: HashMap<u64, i64>,
}

impl CatalogSnapshot {
    /// Flatten the paged catalog payload into a lookup map.
    pub fn from_pages(pages: Vec<CatalogPage>) -> Self {
        let threads = pages
            .into_iter()
            .flat_map(|p| p.threads)
            .map(|t| (t.no, t.last_modified))
            .collect();
        Self { threads }
    }

    pub fn contains(&self, no: u64) -> bool {
        self.threads.contains_key(&no)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// Result of reconciling a catalog snapshot against stored state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// In the catalog, unknown locally: first-time archival.
    pub new: Vec<u64>,
    /// Known and alive, remote last-modified advanced: re-archival.
    pub changed: Vec<u64>,
    /// Known and alive, absent from the catalog: one final archival
    /// attempt, then the record flips to dead.
    pub newly_dead: Vec<u64>,
}

impl CatalogDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.newly_dead.is_empty()
    }

    pub fn work_count(&self) -> usize {
        self.new.len() + self.changed.len() + self.newly_dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_pages_flattens() {
        let pages = vec![
            CatalogPage {
                page: 1,
                threads: vec![
                    CatalogThread {
                        no: 100,
                        last_modified: 1_700_000_000,
                    },
                    CatalogThread {
                        no: 101,
                        last_modified: 1_700_000_050,
                    },
                ],
            },
            CatalogPage {
                page: 2,
                threads: vec![CatalogThread {
                    no: 102,
                    last_modified: 1_700_000_010,
                }],
            },
        ];

        let snap = CatalogSnapshot::from_pages(pages);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.threads[&101], 1_700_000_050);
        assert!(snap.contains(102));
        assert!(!snap.contains(999));
    }

    #[test]
    fn test_thread_key_display() {
        let key = ThreadKey::new("g", 570368);
        assert_eq!(key.to_string(), "/g/570368");
    }

    #[test]
    fn test_record_roundtrip_json() {
        let record = ThreadRecord {
            first_seen: 1_700_000_000,
            last_modified: 1_700_000_123,
            status: ThreadStatus::Dead,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"dead\""));
        let back: ThreadRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
