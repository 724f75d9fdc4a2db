/*
 * Observability - Run Counters
 *
 * Atomic counters shared by concurrent table pipelines, with a
 * Prometheus text rendering for scraping or logging at the end of a run.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for one audit run.
#[derive(Debug, Default)]
pub struct AuditMetrics {
    // Table outcomes
    pub tables_audited: AtomicU64,
    pub tables_failed: AtomicU64,
    pub tables_cancelled: AtomicU64,

    // Listing
    pub pages_fetched: AtomicU64,
    pub listing_retries: AtomicU64,
    pub objects_listed: AtomicU64,

    // Analysis
    pub data_files: AtomicU64,
    pub data_bytes: AtomicU64,
    pub dead_files: AtomicU64,

    // Timing (in microseconds)
    pub total_audit_time_us: AtomicU64,
}

impl AuditMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one listing page and the objects it carried.
    pub fn record_page(&self, objects: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.objects_listed.fetch_add(objects as u64, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.listing_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the data files found for one table.
    pub fn record_data_files(&self, count: usize, bytes: u64) {
        self.data_files.fetch_add(count as u64, Ordering::Relaxed);
        self.data_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_dead_files(&self, count: usize) {
        self.dead_files.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records how one table's audit ended.
    pub fn record_table_outcome(&self, outcome: TableOutcomeKind) {
        let counter = match outcome {
            TableOutcomeKind::Audited => &self.tables_audited,
            TableOutcomeKind::Failed => &self.tables_failed,
            TableOutcomeKind::Cancelled => &self.tables_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_time(&self, duration: Duration) {
        self.total_audit_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Returns a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tables_audited: self.tables_audited.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
            tables_cancelled: self.tables_cancelled.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            listing_retries: self.listing_retries.load(Ordering::Relaxed),
            objects_listed: self.objects_listed.load(Ordering::Relaxed),
            data_files: self.data_files.load(Ordering::Relaxed),
            data_bytes: self.data_bytes.load(Ordering::Relaxed),
            dead_files: self.dead_files.load(Ordering::Relaxed),
            total_audit_time_us: self.total_audit_time_us.load(Ordering::Relaxed),
        }
    }

    /// Formats metrics as Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let snap = self.snapshot();
        format!(
            r#"# HELP lakeaudit_tables_total Tables processed by outcome
# TYPE lakeaudit_tables_total counter
lakeaudit_tables_total{{outcome="audited"}} {}
lakeaudit_tables_total{{outcome="failed"}} {}
lakeaudit_tables_total{{outcome="cancelled"}} {}

# HELP lakeaudit_listing_pages_total Object listing pages fetched
# TYPE lakeaudit_listing_pages_total counter
lakeaudit_listing_pages_total {}

# HELP lakeaudit_listing_retries_total Listing page retries after transient failures
# TYPE lakeaudit_listing_retries_total counter
lakeaudit_listing_retries_total {}

# HELP lakeaudit_objects_listed_total Objects returned by listings
# TYPE lakeaudit_objects_listed_total counter
lakeaudit_objects_listed_total {}

# HELP lakeaudit_data_files_total Data files found across audited tables
# TYPE lakeaudit_data_files_total counter
lakeaudit_data_files_total {}

# HELP lakeaudit_data_bytes_total Bytes held by data files across audited tables
# TYPE lakeaudit_data_bytes_total counter
lakeaudit_data_bytes_total {}

# HELP lakeaudit_dead_files_total Data files no longer referenced by their table
# TYPE lakeaudit_dead_files_total counter
lakeaudit_dead_files_total {}

# HELP lakeaudit_audit_time_seconds Total time spent auditing tables
# TYPE lakeaudit_audit_time_seconds counter
lakeaudit_audit_time_seconds {}
"#,
            snap.tables_audited,
            snap.tables_failed,
            snap.tables_cancelled,
            snap.pages_fetched,
            snap.listing_retries,
            snap.objects_listed,
            snap.data_files,
            snap.data_bytes,
            snap.dead_files,
            snap.total_audit_time_us as f64 / 1_000_000.0,
        )
    }
}

/// How a single table's audit ended, for counting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcomeKind {
    Audited,
    Failed,
    Cancelled,
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub tables_audited: u64,
    pub tables_failed: u64,
    pub tables_cancelled: u64,
    pub pages_fetched: u64,
    pub listing_retries: u64,
    pub objects_listed: u64,
    pub data_files: u64,
    pub data_bytes: u64,
    pub dead_files: u64,
    pub total_audit_time_us: u64,
}

impl MetricsSnapshot {
    /// Share of processed tables that were audited successfully.
    pub fn success_rate(&self) -> f64 {
        let total = self.tables_audited + self.tables_failed + self.tables_cancelled;
        if total == 0 {
            1.0
        } else {
            self.tables_audited as f64 / total as f64
        }
    }
}

/// Timer guard that adds its lifetime to the run's audit time.
pub struct Timer {
    start: Instant,
    metrics: Arc<AuditMetrics>,
}

impl Timer {
    pub fn audit(metrics: Arc<AuditMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.metrics.record_audit_time(self.start.elapsed());
    }
}

/// Tracing span names for consistent instrumentation.
pub mod spans {
    pub const AUDIT_RUN: &str = "audit_run";
    pub const AUDIT_TABLE: &str = "audit_table";
    pub const LIST_OBJECTS: &str = "list_objects";
    pub const READ_MANIFEST: &str = "read_manifest";
}
