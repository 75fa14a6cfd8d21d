// src/models/mod.rs

//! Domain models for the archiver.

mod board;
mod thread;

pub use board::{Board, BoardList};
pub use thread::{
    CatalogDiff, CatalogPage, CatalogSnapshot, CatalogThread, ThreadKey, ThreadRecord,
    ThreadStatus,
};
