// src/models/board.rs

//! Board list payload as served by the platform.

use serde::{Deserialize, Serialize};

/// One board from the authoritative list.
///
/// The platform reports many more per-board settings (bump limits, image
/// limits, cooldowns); only the fields the archiver acts on are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    /// Short board code, e.g. `g` or `sci`.
    pub board: String,
    /// Human-readable board title.
    pub title: String,
}

/// Top-level payload of the boards endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardList {
    pub boards: Vec<Board>,
}

impl BoardList {
    /// Board codes in the order the platform reports them.
    pub fn codes(&self) -> Vec<String> {
        self.boards.iter().map(|b| b.board.clone()).collect()
    }
}
