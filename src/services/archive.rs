// src/services/archive.rs

//! Thread archival.
//!
//! Fetches one thread's full post list through the conditional client and
//! persists it as a new snapshot file. Record mutation stays with the
//! crawl loop; the archiver only reports what happened.

use std::path::PathBuf;

use crate::error::Result;
use crate::models::ThreadKey;
use crate::services::fetch::{ConditionalClient, FetchOutcome};
use crate::storage;

/// Why a thread is being archived this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// First catalog appearance.
    New,
    /// Known thread whose remote last-modified advanced.
    Changed,
    /// Vanished from the catalog; one last capture before the record
    /// flips to dead.
    Final,
}

/// One unit of archival work, fully resolved before dispatch so in-flight
/// jobs hold no reference to the state store.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub key: ThreadKey,
    pub kind: JobKind,
    /// Capture timestamp for the record (existing value for known
    /// threads, the cycle's observation time for new ones).
    pub first_seen: i64,
    /// Stored last-modified, for the conditional header.
    pub prior_last_modified: Option<i64>,
    /// Last-modified the catalog reported this cycle, if any.
    pub catalog_last_modified: Option<i64>,
    /// Thread storage directory, derived from (board, id, first_seen).
    pub dir: PathBuf,
}

/// Result of one archival attempt, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Snapshot written; the record's last-modified should advance to
    /// this value.
    Fetched { last_modified: Option<i64> },
    /// 304: nothing new since the stored last-modified.
    Unchanged,
    /// The platform no longer serves the thread.
    Gone,
    /// Attempts exhausted or the snapshot could not be written; the
    /// record is left untouched and the next cycle retries naturally.
    Failed,
}

/// Fetches and persists single-thread snapshots.
pub struct ThreadArchiver<'a> {
    client: &'a ConditionalClient,
    max_attempts: u32,
}

impl<'a> ThreadArchiver<'a> {
    pub fn new(client: &'a ConditionalClient, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
        }
    }

    /// Run one job to completion, retrying transient fetch failures.
    /// Every attempt passes the shared rate gate again.
    pub async fn archive(&self, job: ArchiveJob) -> (ArchiveJob, ArchiveOutcome) {
        let outcome = match self.fetch_with_retry(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Archival of {} failed: {}", job.key, e);
                ArchiveOutcome::Failed
            }
        };
        (job, outcome)
    }

    async fn fetch_with_retry(&self, job: &ArchiveJob) -> Result<ArchiveOutcome> {
        let url = self.client.thread_url(&job.key.board, job.key.no);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.fetch(&url, job.prior_last_modified).await {
                Ok(FetchOutcome::Fetched {
                    body,
                    last_modified,
                }) => {
                    let path = storage::write_snapshot(&job.dir, &body).await?;
                    log::debug!("Archived {} to {:?}", job.key, path);
                    return Ok(ArchiveOutcome::Fetched { last_modified });
                }
                Ok(FetchOutcome::NotModified) => return Ok(ArchiveOutcome::Unchanged),
                Ok(FetchOutcome::Gone) => return Ok(ArchiveOutcome::Gone),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log::warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        job.key,
                        attempt,
                        self.max_attempts,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
