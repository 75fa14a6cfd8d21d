// src/services/fetch.rs

//! Rate-limited conditional HTTP fetcher.
//!
//! Every outbound request in the process funnels through one
//! [`ConditionalClient`], which owns the single [`RateGate`]. The gate
//! serializes request dispatch so that consecutive requests start at
//! least the configured interval apart, no matter which task issues them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Outcome of a single conditional fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh content. `last_modified` is the server's `Last-Modified`
    /// header as unix seconds, when parseable.
    Fetched {
        body: String,
        last_modified: Option<i64>,
    },
    /// 304: the resource has not changed since the supplied timestamp.
    /// No body was read.
    NotModified,
    /// 404/410: the resource is gone for good. Terminal, not an error.
    Gone,
}

/// Process-wide minimum-interval gate.
///
/// Holds the dispatch time of the previous request; callers block until
/// the interval has elapsed, measured start-to-start. The mutex is held
/// across the wait so concurrent callers serialize their dispatch.
#[derive(Debug, Clone)]
pub struct RateGate {
    interval: Duration,
    last_dispatch: Arc<Mutex<Instant>>,
}

impl RateGate {
    /// The gate opens one full interval after construction: a previous
    /// process may have dispatched a request just before this one
    /// started, so the first request is spaced as if it had.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Block until a request may be dispatched, then claim the slot.
    pub async fn wait(&self) {
        let mut last = self.last_dispatch.lock().await;
        tokio::time::sleep_until(*last + self.interval).await;
        *last = Instant::now();
    }
}

/// HTTP client enforcing the rate gate and `If-Modified-Since` semantics.
pub struct ConditionalClient {
    client: reqwest::Client,
    gate: RateGate,
    api_base: String,
}

impl ConditionalClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            gate: RateGate::new(config.min_interval()),
            api_base: config.http.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn boards_url(&self) -> String {
        format!("{}/boards.json", self.api_base)
    }

    pub fn catalog_url(&self, board: &str) -> String {
        format!("{}/{}/threads.json", self.api_base, board)
    }

    pub fn thread_url(&self, board: &str, no: u64) -> String {
        format!("{}/{}/thread/{}.json", self.api_base, board, no)
    }

    /// Fetch `url`, conditionally on `prior_last_modified` (unix seconds).
    ///
    /// Does not retry; transient failures surface as errors with
    /// [`AppError::is_transient`] true and the retry policy stays with
    /// the caller, which re-enters the gate for every attempt.
    pub async fn fetch(&self, url: &str, prior_last_modified: Option<i64>) -> Result<FetchOutcome> {
        self.gate.wait().await;

        let mut request = self.client.get(url);
        if let Some(since) = prior_last_modified.filter(|ts| *ts > 0) {
            request = request.header(IF_MODIFIED_SINCE, http_date(since));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(FetchOutcome::Gone),
            status if status.is_success() => {
                let last_modified = response
                    .headers()
                    .get(LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_http_date);
                let body = response.text().await?;
                Ok(FetchOutcome::Fetched {
                    body,
                    last_modified,
                })
            }
            status => Err(AppError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}

/// Format unix seconds as an RFC 7231 HTTP date.
fn http_date(ts: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header back to unix seconds.
fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_format() {
        // 2019-12-12 20:59:27 UTC
        assert_eq!(http_date(1_576_184_367), "Thu, 12 Dec 2019 20:59:27 GMT");
    }

    #[test]
    fn test_http_date_roundtrip() {
        let ts = 1_700_000_000;
        assert_eq!(parse_http_date(&http_date(ts)), Some(ts));
    }

    #[test]
    fn test_parse_http_date_garbage() {
        assert_eq!(parse_http_date("not a date"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_blocks_first_wait_after_construction() {
        // A process restart must not let the first request through
        // early: the gate opens one full interval after construction.
        let gate = RateGate::new(Duration::from_secs(1));
        let constructed = Instant::now();

        gate.wait().await;
        assert!(Instant::now() - constructed >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_spaces_sequential_callers() {
        let gate = RateGate::new(Duration::from_secs(1));

        gate.wait().await;
        let first = Instant::now();
        gate.wait().await;
        let second = Instant::now();
        gate.wait().await;
        let third = Instant::now();

        assert!(second - first >= Duration::from_secs(1));
        assert!(third - second >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_serializes_concurrent_callers() {
        let gate = RateGate::new(Duration::from_secs(1));
        let started = Instant::now();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                gate.wait().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        // Four dispatches need at least three full intervals.
        assert!(*stamps.last().unwrap() - started >= Duration::from_secs(3));
    }

    #[test]
    fn test_url_builders() {
        let config = Config::default();
        let client = ConditionalClient::new(&config).unwrap();
        assert_eq!(client.boards_url(), "https://a.4cdn.org/boards.json");
        assert_eq!(client.catalog_url("g"), "https://a.4cdn.org/g/threads.json");
        assert_eq!(
            client.thread_url("g", 570368),
            "https://a.4cdn.org/g/thread/570368.json"
        );
    }
}
