// src/services/boards.rs

//! Board registry.
//!
//! Fetches the authoritative board list once per process and applies the
//! include/exclude filter from the configuration.

use std::collections::BTreeSet;

use crate::error::{AppError, Result};
use crate::models::BoardList;
use crate::services::fetch::{ConditionalClient, FetchOutcome};

/// Resolves the working board set for a run.
pub struct BoardRegistry<'a> {
    client: &'a ConditionalClient,
    max_attempts: u32,
}

impl<'a> BoardRegistry<'a> {
    pub fn new(client: &'a ConditionalClient, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
        }
    }

    /// Fetch the authoritative board list, retrying transient failures.
    ///
    /// Failure here is fatal: without the list there is nothing to crawl.
    pub async fn fetch_board_list(&self) -> Result<BoardList> {
        let url = self.client.boards_url();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.fetch(&url, None).await {
                Ok(FetchOutcome::Fetched { body, .. }) => {
                    return Ok(serde_json::from_str(&body)?);
                }
                Ok(FetchOutcome::NotModified) => {
                    // Unconditional request; the server should never 304.
                    return Err(AppError::Status {
                        code: 304,
                        url: url.clone(),
                    });
                }
                Ok(FetchOutcome::Gone) => {
                    return Err(AppError::config(format!("board list not found at {url}")));
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log::warn!(
                        "Board list fetch failed (attempt {}/{}): {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch and filter the working board set in one step.
    pub async fn resolve_boards(&self, requested: &[String], exclude: bool) -> Result<Vec<String>> {
        let list = self.fetch_board_list().await?;
        Ok(resolve(requested, exclude, &list.codes()))
    }
}

/// Apply the include/exclude filter against the authoritative codes.
///
/// Empty `requested` selects everything. In include mode, requested codes
/// the platform does not know are dropped with a warning. The result is
/// sorted so every cycle visits boards in the same order.
pub fn resolve(requested: &[String], exclude: bool, authoritative: &[String]) -> Vec<String> {
    let known: BTreeSet<&str> = authoritative.iter().map(String::as_str).collect();

    let resolved: BTreeSet<&str> = if requested.is_empty() {
        known
    } else if exclude {
        let requested: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        known.difference(&requested).copied().collect()
    } else {
        let mut selected = BTreeSet::new();
        for code in requested {
            if known.contains(code.as_str()) {
                selected.insert(code.as_str());
            } else {
                log::warn!("Requested board /{}/ does not exist, skipping", code);
            }
        }
        selected
    };

    resolved.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_request_selects_all() {
        let all = codes(&["a", "b", "c"]);
        assert_eq!(resolve(&[], false, &all), codes(&["a", "b", "c"]));
    }

    #[test]
    fn test_include_mode_intersects() {
        let all = codes(&["a", "b", "c"]);
        assert_eq!(resolve(&codes(&["a"]), false, &all), codes(&["a"]));
    }

    #[test]
    fn test_exclude_mode_subtracts() {
        let all = codes(&["a", "b", "c"]);
        assert_eq!(resolve(&codes(&["a"]), true, &all), codes(&["b", "c"]));
    }

    #[test]
    fn test_unknown_codes_dropped_in_include_mode() {
        let all = codes(&["a", "b", "c"]);
        assert_eq!(
            resolve(&codes(&["a", "zz"]), false, &all),
            codes(&["a"])
        );
    }

    #[test]
    fn test_unknown_codes_harmless_in_exclude_mode() {
        let all = codes(&["a", "b"]);
        assert_eq!(resolve(&codes(&["zz"]), true, &all), codes(&["a", "b"]));
    }

    #[test]
    fn test_result_is_sorted() {
        let all = codes(&["c", "a", "b"]);
        assert_eq!(resolve(&[], false, &all), codes(&["a", "b", "c"]));
    }
}
