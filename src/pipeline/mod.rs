// src/pipeline/mod.rs

//! Crawl orchestration.
//!
//! - `run_crawl`: the unbounded poll/reconcile/archive loop
//! - `shutdown`: cooperative stop signal wired to Ctrl-C in `main`

pub mod crawl;
pub mod shutdown;

pub use crawl::run_crawl;
pub use shutdown::{ShutdownHandle, ShutdownSignal};
