// src/pipeline/crawl.rs

//! The crawl loop.
//!
//! One cycle polls every board's catalog, reconciles it against stored
//! thread state, and archives whatever the diff demands. The loop then
//! sleeps for the configured cadence and starts over, forever, until the
//! shutdown signal fires.
//!
//! Archival fetches for one board may be in flight concurrently; every
//! store mutation happens here, on the consumer side of the stream, so
//! no two tasks ever touch the same record.

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{CatalogDiff, CatalogSnapshot, ThreadKey, ThreadRecord, ThreadStatus};
use crate::services::catalog::{self, CatalogPoller};
use crate::services::{
    ArchiveJob, ArchiveOutcome, BoardRegistry, ConditionalClient, JobKind, ThreadArchiver,
};
use crate::storage::ThreadStateStore;

use super::shutdown::ShutdownSignal;

/// Per-cycle counters for the summary log line.
#[derive(Debug, Default)]
struct CycleStats {
    boards_polled: usize,
    boards_unchanged: usize,
    fetched: usize,
    unchanged: usize,
    died: usize,
    failed: usize,
}

/// Run the crawler until shutdown. Returns `Err` only for fatal
/// conditions; per-item and per-board failures are logged and retried on
/// later cycles.
pub async fn run_crawl(config: &Config, mut shutdown: ShutdownSignal) -> Result<()> {
    // INIT: resume whatever the storage tree already holds.
    let client = ConditionalClient::new(config)?;
    let mut store = ThreadStateStore::load(&config.output_path).await?;
    log::info!(
        "Resumed {} thread record(s) from {:?}",
        store.len(),
        store.root()
    );

    // RESOLVING_BOARDS: once per process; the set is fixed afterwards.
    let registry = BoardRegistry::new(&client, config.http.max_attempts);
    let boards = tokio::select! {
        resolved = registry.resolve_boards(&config.boards, config.exclude) => resolved?,
        _ = shutdown.wait() => return Ok(()),
    };
    if boards.is_empty() {
        return Err(AppError::config("no boards selected after filtering"));
    }

    log::info!("Crawling {} board(s): {}", boards.len(), boards.join(", "));
    for board in &boards {
        let (alive, dead) = store.board_counts(board);
        if alive + dead > 0 {
            log::info!("/{}/: resuming {} alive, {} dead", board, alive, dead);
        }
    }

    let mut poller = CatalogPoller::new(&client, config.http.max_attempts);
    let archiver = ThreadArchiver::new(&client, config.http.max_attempts);

    let mut cycle: u64 = 0;
    while !shutdown.is_shutdown() {
        cycle += 1;
        let mut stats = CycleStats::default();

        // POLLING -> RECONCILING -> ARCHIVING, board by board in fixed
        // order. Board failures never abort the cycle.
        for board in &boards {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                result = process_board(
                    board,
                    &mut poller,
                    &archiver,
                    &mut store,
                    config.http.max_concurrent,
                    &mut stats,
                ) => {
                    if let Err(e) = result {
                        log::error!("/{}/ skipped this cycle: {}", board, e);
                        stats.failed += 1;
                        poller.invalidate(board);
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        log::info!(
            "Cycle {}: {} board(s) polled ({} unchanged), {} archived, {} unchanged, {} died, {} failed",
            cycle,
            stats.boards_polled,
            stats.boards_unchanged,
            stats.fetched,
            stats.unchanged,
            stats.died,
            stats.failed,
        );

        // CYCLE_END: sleep out the cadence, unless shutdown interrupts.
        tokio::select! {
            _ = tokio::time::sleep(config.cycle_interval()) => {}
            _ = shutdown.wait() => break,
        }
    }

    log::info!("Shutting down after {} cycle(s)", cycle);
    Ok(())
}

/// Poll, reconcile and archive one board.
async fn process_board(
    board: &str,
    poller: &mut CatalogPoller<'_>,
    archiver: &ThreadArchiver<'_>,
    store: &mut ThreadStateStore,
    concurrency: usize,
    stats: &mut CycleStats,
) -> Result<()> {
    stats.boards_polled += 1;
    let Some(snapshot) = poller.poll(board).await? else {
        stats.boards_unchanged += 1;
        return Ok(());
    };

    let prior = store.board_view(board);
    let diff = catalog::diff(&snapshot, &prior);
    if diff.is_empty() {
        return Ok(());
    }

    log::info!(
        "/{}/: {} live in catalog, {} new, {} changed, {} vanished",
        board,
        snapshot.len(),
        diff.new.len(),
        diff.changed.len(),
        diff.newly_dead.len(),
    );

    let now = Utc::now().timestamp();
    let jobs = plan_jobs(store, board, &diff, &snapshot, now);

    let mut results = stream::iter(jobs.into_iter().map(|job| archiver.archive(job)))
        .buffer_unordered(concurrency.max(1));

    let mut work_left_undone = false;
    while let Some((job, outcome)) = results.next().await {
        match outcome {
            ArchiveOutcome::Fetched { .. } => stats.fetched += 1,
            ArchiveOutcome::Unchanged => stats.unchanged += 1,
            ArchiveOutcome::Gone => {}
            ArchiveOutcome::Failed => {
                stats.failed += 1;
                work_left_undone = true;
            }
        }
        let dies = outcome == ArchiveOutcome::Gone
            || (job.kind == JobKind::Final && outcome != ArchiveOutcome::Failed);
        if dies {
            stats.died += 1;
        }

        // A failed record write loses nothing: the record keeps its old
        // durable value and the next cycle redoes the work.
        if let Err(e) = apply_outcome(store, &job, outcome, now).await {
            log::error!("State update for {} failed: {}", job.key, e);
            work_left_undone = true;
        }
    }

    // A quiet catalog must not hide the pending items behind a 304: the
    // diff only re-plans them if the next poll actually runs.
    if work_left_undone {
        poller.invalidate(board);
    }

    store.write_roster(board).await?;
    Ok(())
}

/// Turn a diff into fully resolved archival jobs.
///
/// Jobs carry their storage directory and timestamps so the in-flight
/// stage needs no access to the store.
fn plan_jobs(
    store: &ThreadStateStore,
    board: &str,
    diff: &CatalogDiff,
    snapshot: &CatalogSnapshot,
    now: i64,
) -> Vec<ArchiveJob> {
    let mut jobs = Vec::with_capacity(diff.work_count());

    for &no in &diff.new {
        let key = ThreadKey::new(board, no);
        jobs.push(ArchiveJob {
            dir: store.thread_dir(&key, now),
            key,
            kind: JobKind::New,
            first_seen: now,
            prior_last_modified: None,
            catalog_last_modified: snapshot.threads.get(&no).copied(),
        });
    }

    for &no in &diff.changed {
        let key = ThreadKey::new(board, no);
        let Some(record) = store.get(&key) else { continue };
        jobs.push(ArchiveJob {
            dir: store.thread_dir(&key, record.first_seen),
            kind: JobKind::Changed,
            first_seen: record.first_seen,
            prior_last_modified: Some(record.last_modified),
            catalog_last_modified: snapshot.threads.get(&no).copied(),
            key,
        });
    }

    for &no in &diff.newly_dead {
        let key = ThreadKey::new(board, no);
        let Some(record) = store.get(&key) else { continue };
        jobs.push(ArchiveJob {
            dir: store.thread_dir(&key, record.first_seen),
            kind: JobKind::Final,
            first_seen: record.first_seen,
            prior_last_modified: Some(record.last_modified),
            catalog_last_modified: None,
            key,
        });
    }

    jobs
}

/// Apply one archival outcome to the state store.
async fn apply_outcome(
    store: &mut ThreadStateStore,
    job: &ArchiveJob,
    outcome: ArchiveOutcome,
    now: i64,
) -> Result<()> {
    match outcome {
        ArchiveOutcome::Fetched { last_modified } => {
            let last_modified = job
                .catalog_last_modified
                .or(last_modified)
                .unwrap_or(now);
            store
                .upsert(
                    &job.key,
                    ThreadRecord {
                        first_seen: job.first_seen,
                        last_modified,
                        status: ThreadStatus::Alive,
                    },
                )
                .await?;
            if job.kind == JobKind::Final {
                store.mark_dead(&job.key).await?;
            }
        }
        ArchiveOutcome::Unchanged => {
            // Liveness confirmed, nothing new to record. The final
            // capture before death may legitimately come back 304.
            if job.kind == JobKind::Final {
                store.mark_dead(&job.key).await?;
            }
        }
        ArchiveOutcome::Gone => {
            // The thread vanished between catalog and fetch. Record the
            // death even for first-time threads so the id is never
            // fetched again while it lingers in a stale catalog.
            if store.get(&job.key).is_none() {
                store
                    .upsert(&job.key, ThreadRecord::new(job.first_seen))
                    .await?;
            }
            store.mark_dead(&job.key).await?;
        }
        ArchiveOutcome::Failed => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadKey;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn snapshot(entries: &[(u64, i64)]) -> CatalogSnapshot {
        CatalogSnapshot {
            threads: entries.iter().copied().collect(),
        }
    }

    async fn fresh_store(tmp: &TempDir) -> ThreadStateStore {
        ThreadStateStore::load(tmp.path()).await.unwrap()
    }

    fn diff_against(store: &ThreadStateStore, board: &str, snap: &CatalogSnapshot) -> CatalogDiff {
        catalog::diff(snap, &store.board_view(board))
    }

    #[tokio::test]
    async fn test_thread_lifecycle_first_seen_to_terminal_death() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;
        let key = ThreadKey::new("g", 42);

        // T1: id 42 appears, archived once, record created.
        let t1 = 1_700_000_000;
        let snap = snapshot(&[(42, 100)]);
        let diff = diff_against(&store, "g", &snap);
        assert_eq!(diff.new, vec![42]);

        let jobs = plan_jobs(&store, "g", &diff, &snap, t1);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::New);
        assert_eq!(jobs[0].prior_last_modified, None);

        apply_outcome(
            &mut store,
            &jobs[0],
            ArchiveOutcome::Fetched {
                last_modified: None,
            },
            t1,
        )
        .await
        .unwrap();

        let record = store.get(&key).unwrap();
        assert_eq!(record.first_seen, t1);
        assert_eq!(record.last_modified, 100);
        assert_eq!(record.status, ThreadStatus::Alive);

        // T2: catalog unchanged, no work at all.
        let diff = diff_against(&store, "g", &snap);
        assert!(diff.is_empty());

        // T3: id 42 gone from the catalog: one final capture, then dead.
        let t3 = t1 + 120;
        let empty = snapshot(&[]);
        let diff = diff_against(&store, "g", &empty);
        assert_eq!(diff.newly_dead, vec![42]);

        let jobs = plan_jobs(&store, "g", &diff, &empty, t3);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Final);
        assert_eq!(jobs[0].first_seen, t1);
        assert_eq!(jobs[0].prior_last_modified, Some(100));

        apply_outcome(
            &mut store,
            &jobs[0],
            ArchiveOutcome::Fetched {
                last_modified: Some(150),
            },
            t3,
        )
        .await
        .unwrap();
        assert!(store.get(&key).unwrap().is_dead());
        assert_eq!(store.get(&key).unwrap().last_modified, 150);

        // T4: id 42 reappears with a newer timestamp; still no work.
        let stale = snapshot(&[(42, 999)]);
        assert!(diff_against(&store, "g", &stale).is_empty());
    }

    #[tokio::test]
    async fn test_final_capture_unchanged_still_flips_dead() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;
        let key = ThreadKey::new("g", 7);
        store
            .upsert(&key, ThreadRecord {
                first_seen: 10,
                last_modified: 50,
                status: ThreadStatus::Alive,
            })
            .await
            .unwrap();

        let empty = snapshot(&[]);
        let diff = diff_against(&store, "g", &empty);
        let jobs = plan_jobs(&store, "g", &diff, &empty, 60);

        apply_outcome(&mut store, &jobs[0], ArchiveOutcome::Unchanged, 60)
            .await
            .unwrap();
        let record = store.get(&key).unwrap();
        assert!(record.is_dead());
        // 304 advanced nothing.
        assert_eq!(record.last_modified, 50);
    }

    #[tokio::test]
    async fn test_gone_on_first_fetch_creates_dead_record() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;
        let key = ThreadKey::new("g", 9);

        let snap = snapshot(&[(9, 100)]);
        let diff = diff_against(&store, "g", &snap);
        let jobs = plan_jobs(&store, "g", &diff, &snap, 200);

        apply_outcome(&mut store, &jobs[0], ArchiveOutcome::Gone, 200)
            .await
            .unwrap();
        assert!(store.get(&key).unwrap().is_dead());

        // The stale catalog still lists it next cycle: no work.
        assert!(diff_against(&store, "g", &snap).is_empty());
    }

    #[tokio::test]
    async fn test_failed_outcome_leaves_record_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;
        let key = ThreadKey::new("g", 3);
        let before = ThreadRecord {
            first_seen: 10,
            last_modified: 20,
            status: ThreadStatus::Alive,
        };
        store.upsert(&key, before.clone()).await.unwrap();

        let snap = snapshot(&[(3, 30)]);
        let diff = diff_against(&store, "g", &snap);
        assert_eq!(diff.changed, vec![3]);

        let jobs = plan_jobs(&store, "g", &diff, &snap, 40);
        apply_outcome(&mut store, &jobs[0], ArchiveOutcome::Failed, 40)
            .await
            .unwrap();
        assert_eq!(store.get(&key), Some(&before));

        // Next cycle the same change is planned again.
        let diff = diff_against(&store, "g", &snap);
        assert_eq!(diff.changed, vec![3]);
    }

    #[tokio::test]
    async fn test_plan_jobs_keys_are_disjoint() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;
        store
            .upsert(&ThreadKey::new("g", 1), ThreadRecord {
                first_seen: 10,
                last_modified: 10,
                status: ThreadStatus::Alive,
            })
            .await
            .unwrap();
        store
            .upsert(&ThreadKey::new("g", 2), ThreadRecord {
                first_seen: 10,
                last_modified: 10,
                status: ThreadStatus::Alive,
            })
            .await
            .unwrap();

        // 1 changed, 2 vanished, 5 new.
        let snap = snapshot(&[(1, 99), (5, 50)]);
        let diff = diff_against(&store, "g", &snap);
        let jobs = plan_jobs(&store, "g", &diff, &snap, 100);

        let mut keys: Vec<_> = jobs.iter().map(|j| j.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), jobs.len());
        assert_eq!(jobs.len(), 3);
    }

    #[tokio::test]
    async fn test_resume_equals_uninterrupted_state() {
        let tmp = TempDir::new().unwrap();
        let mut store = fresh_store(&tmp).await;

        let snap = snapshot(&[(1, 10), (2, 20)]);
        let diff = diff_against(&store, "g", &snap);
        let jobs = plan_jobs(&store, "g", &diff, &snap, 100);
        for job in &jobs {
            apply_outcome(
                &mut store,
                job,
                ArchiveOutcome::Fetched {
                    last_modified: None,
                },
                100,
            )
            .await
            .unwrap();
        }

        let expected: HashMap<_, _> = store.board_view("g");
        drop(store);

        // Simulated restart: state comes back purely from the tree.
        let reloaded = ThreadStateStore::load(tmp.path()).await.unwrap();
        assert_eq!(reloaded.board_view("g"), expected);
    }
}
