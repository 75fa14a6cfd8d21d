// src/lib.rs

//! chanvault: imageboard thread archiver.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
