//! # Statistics Module
//!
//! Collects metrics about gateway traffic and crawl progress.
//!
//! ## Overview
//!
//! The [`StatCollector`] tracks request counts, cache hits, bytes downloaded,
//! and the outcome of page resolution and graph construction. All updates use
//! atomic operations, so one collector can be shared by the gateway and any
//! number of crawl workers. Snapshots are exposed as a `Display` block and as
//! JSON.
//!
//! ## Example
//!
//! ```rust,ignore
//! let wiki = Wiki::builder().build()?;
//! // ... after some crawling ...
//! println!("{}", wiki.stats());
//! println!("{}", wiki.stats().to_json_string()?);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::WikiError;

// A consistent view of the counters, used by all presentation paths.
struct StatsSnapshot {
    requests_sent: usize,
    requests_succeeded: usize,
    requests_failed: usize,
    responses_from_cache: usize,
    api_errors: usize,
    total_bytes_downloaded: usize,
    pages_resolved: usize,
    pages_failed: usize,
    nodes_inserted: usize,
    edges_inserted: usize,
    children_skipped: usize,
    elapsed: Duration,
}

impl StatsSnapshot {
    fn requests_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.requests_sent as f64 / seconds
        } else {
            0.0
        }
    }

    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;
        if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }
}

/// Shared counters for gateway and crawl activity.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    start_time: Instant,

    pub requests_sent: AtomicUsize,
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub responses_from_cache: AtomicUsize,
    pub api_errors: AtomicUsize,
    pub total_bytes_downloaded: AtomicUsize,

    pub pages_resolved: AtomicUsize,
    pub pages_failed: AtomicUsize,

    pub nodes_inserted: AtomicUsize,
    pub edges_inserted: AtomicUsize,
    pub children_skipped: AtomicUsize,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_sent: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            responses_from_cache: AtomicUsize::new(0),
            api_errors: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            pages_resolved: AtomicUsize::new(0),
            pages_failed: AtomicUsize::new(0),
            nodes_inserted: AtomicUsize::new(0),
            edges_inserted: AtomicUsize::new(0),
            children_skipped: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            responses_from_cache: self.responses_from_cache.load(Ordering::SeqCst),
            api_errors: self.api_errors.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            pages_resolved: self.pages_resolved.load(Ordering::SeqCst),
            pages_failed: self.pages_failed.load(Ordering::SeqCst),
            nodes_inserted: self.nodes_inserted.load(Ordering::SeqCst),
            edges_inserted: self.edges_inserted.load(Ordering::SeqCst),
            children_skipped: self.children_skipped.load(Ordering::SeqCst),
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_from_cache(&self) {
        self.responses_from_cache.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_api_errors(&self) {
        self.api_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_bytes_downloaded(&self, bytes: usize) {
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn increment_pages_resolved(&self) {
        self.pages_resolved.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_pages_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_nodes_inserted(&self) {
        self.nodes_inserted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_edges_inserted(&self) {
        self.edges_inserted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_children_skipped(&self) {
        self.children_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Serializes the counters to a JSON string.
    pub fn to_json_string(&self) -> Result<String, WikiError> {
        serde_json::to_string(self).map_err(|e| WikiError::Decode(e.to_string()))
    }

    /// Serializes the counters to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, WikiError> {
        serde_json::to_string_pretty(self).map_err(|e| WikiError::Decode(e.to_string()))
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nWiki Statistics")?;
        writeln!(f, "---------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  requests : sent: {}, ok: {}, fail: {}, cached: {}, api_err: {} ({:.2} req/s)",
            snapshot.requests_sent,
            snapshot.requests_succeeded,
            snapshot.requests_failed,
            snapshot.responses_from_cache,
            snapshot.api_errors,
            snapshot.requests_per_second()
        )?;
        writeln!(f, "  download : {}", snapshot.formatted_bytes())?;
        writeln!(
            f,
            "  pages    : resolved: {}, failed: {}",
            snapshot.pages_resolved, snapshot.pages_failed
        )?;
        writeln!(
            f,
            "  graph    : nodes: {}, edges: {}, skipped children: {}\n",
            snapshot.nodes_inserted, snapshot.edges_inserted, snapshot.children_skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_round_trip_through_json() {
        let stats = StatCollector::new();
        stats.increment_requests_sent();
        stats.increment_requests_succeeded();
        stats.increment_nodes_inserted();
        stats.add_bytes_downloaded(2048);

        let json: serde_json::Value =
            serde_json::from_str(&stats.to_json_string().unwrap()).unwrap();
        assert_eq!(json["requests_sent"], 1);
        assert_eq!(json["nodes_inserted"], 1);
        assert_eq!(json["total_bytes_downloaded"], 2048);
    }

    #[test]
    fn display_includes_the_graph_line() {
        let stats = StatCollector::new();
        stats.increment_edges_inserted();
        let rendered = stats.to_string();
        assert!(rendered.contains("edges: 1"));
    }
}
