// src/services/mod.rs

//! Service layer for the archiver.
//!
//! - Rate-limited conditional fetching (`ConditionalClient`)
//! - Board set resolution (`BoardRegistry`)
//! - Catalog polling and reconciliation (`CatalogPoller`, `diff`)
//! - Single-thread archival (`ThreadArchiver`)

pub mod archive;
pub mod boards;
pub mod catalog;
pub mod fetch;

pub use archive::{ArchiveJob, ArchiveOutcome, JobKind, ThreadArchiver};
pub use boards::BoardRegistry;
pub use catalog::CatalogPoller;
pub use fetch::{ConditionalClient, FetchOutcome, RateGate};
