// src/services/catalog.rs

//! Per-board catalog polling and reconciliation.
//!
//! The catalog is the platform's summary of live threads. Each cycle the
//! poller fetches it conditionally (the previous `Last-Modified` is kept
//! in memory per board) and the diff decides which threads need work.

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{CatalogDiff, CatalogPage, CatalogSnapshot, ThreadRecord};
use crate::services::fetch::{ConditionalClient, FetchOutcome};

/// Fetches per-board catalogs, remembering each board's catalog
/// `Last-Modified` for conditional polling. That clock is ephemeral by
/// design: after a restart the first poll of each board is unconditional.
pub struct CatalogPoller<'a> {
    client: &'a ConditionalClient,
    max_attempts: u32,
    last_poll: HashMap<String, i64>,
}

impl<'a> CatalogPoller<'a> {
    pub fn new(client: &'a ConditionalClient, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
            last_poll: HashMap::new(),
        }
    }

    /// Poll one board's catalog.
    ///
    /// `Ok(None)` means the catalog is unchanged since the previous poll
    /// and the whole board can be skipped this cycle. Transient failures
    /// are retried up to the attempt bound, then bubbled up so the board
    /// is retried next cycle.
    pub async fn poll(&mut self, board: &str) -> Result<Option<CatalogSnapshot>> {
        let url = self.client.catalog_url(board);
        let prior = self.last_poll.get(board).copied();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.fetch(&url, prior).await {
                Ok(FetchOutcome::Fetched {
                    body,
                    last_modified,
                }) => {
                    let pages: Vec<CatalogPage> = serde_json::from_str(&body)?;
                    if let Some(ts) = last_modified {
                        self.last_poll.insert(board.to_string(), ts);
                    }
                    return Ok(Some(CatalogSnapshot::from_pages(pages)));
                }
                Ok(FetchOutcome::NotModified) => return Ok(None),
                Ok(FetchOutcome::Gone) => {
                    log::warn!("Catalog for /{}/ not found, skipping board", board);
                    return Ok(None);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log::warn!(
                        "Catalog poll for /{}/ failed (attempt {}/{}): {}",
                        board,
                        attempt,
                        self.max_attempts,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Forget the board's conditional clock so the next poll is
    /// unconditional. Called when a cycle leaves work undone on the
    /// board: a 304 next cycle would otherwise hide the pending items
    /// until some unrelated catalog change.
    pub fn invalidate(&mut self, board: &str) {
        self.last_poll.remove(board);
    }
}

/// Reconcile a catalog snapshot against the stored records of one board.
///
/// Threads present on both sides with an unchanged last-modified produce
/// no work; threads already dead are ignored entirely, including ids that
/// reappear in the catalog.
pub fn diff(snapshot: &CatalogSnapshot, prior: &HashMap<u64, ThreadRecord>) -> CatalogDiff {
    let mut out = CatalogDiff::default();

    for (&no, &remote_lm) in &snapshot.threads {
        match prior.get(&no) {
            None => out.new.push(no),
            Some(record) if record.is_dead() => {}
            Some(record) if remote_lm > record.last_modified => out.changed.push(no),
            Some(_) => {}
        }
    }

    for (&no, record) in prior {
        if !record.is_dead() && !snapshot.contains(no) {
            out.newly_dead.push(no);
        }
    }

    // Stable order for logging and per-cycle determinism.
    out.new.sort_unstable();
    out.changed.sort_unstable();
    out.newly_dead.sort_unstable();
    out
}
