// Performance metrics module
//
// Provides lightweight counters for monitoring pipeline throughput

use crate::models::JobStatus;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics
///
/// Uses atomic operations for thread-safe tracking without locks. Owned by the
/// [`Pipeline`](crate::pipeline::Pipeline) and logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Jobs accepted at intake
    pub jobs_added: AtomicUsize,

    /// Jobs that finished in `Complete`
    pub jobs_completed: AtomicUsize,

    /// Jobs that finished in `AlreadySmaller`
    pub jobs_already_smaller: AtomicUsize,

    /// Jobs that finished in `Error`
    pub jobs_failed: AtomicUsize,

    /// Jobs dropped because the queue was cleared or the record removed
    pub jobs_abandoned: AtomicUsize,

    /// Bytes saved across completed jobs
    pub bytes_saved: AtomicU64,

    /// Compressor invocations, whatever their result
    pub compressions: AtomicU64,

    /// Total time spent inside the compressor in milliseconds
    pub total_compression_time_ms: AtomicU64,

    /// Number of badge updates sent
    pub badge_updates: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_added: AtomicUsize::new(0),
            jobs_completed: AtomicUsize::new(0),
            jobs_already_smaller: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            jobs_abandoned: AtomicUsize::new(0),
            bytes_saved: AtomicU64::new(0),
            compressions: AtomicU64::new(0),
            total_compression_time_ms: AtomicU64::new(0),
            badge_updates: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_job_added(&self) {
        self.jobs_added.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job reaching a terminal status
    pub fn record_terminal(&self, status: JobStatus) {
        match status {
            JobStatus::Complete => self.jobs_completed.fetch_add(1, Ordering::Relaxed),
            JobStatus::AlreadySmaller => self.jobs_already_smaller.fetch_add(1, Ordering::Relaxed),
            JobStatus::Error => self.jobs_failed.fetch_add(1, Ordering::Relaxed),
            JobStatus::Processing | JobStatus::Compressing => return,
        };
    }

    pub fn record_abandoned(&self) {
        self.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_saved(&self, bytes: u64) {
        self.bytes_saved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one compressor call and the time it took
    pub fn record_compression_time(&self, duration: Duration) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
        self.total_compression_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_badge_update(&self) {
        self.badge_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per compressor call in milliseconds
    pub fn avg_compression_time_ms(&self) -> f64 {
        let total = self.total_compression_time_ms.load(Ordering::Relaxed);
        let count = self.compressions.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Jobs: {} added, {} complete, {} already smaller, {} failed, {} abandoned",
            self.jobs_added.load(Ordering::Relaxed),
            self.jobs_completed.load(Ordering::Relaxed),
            self.jobs_already_smaller.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_abandoned.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Compression time: {:.2}s over {} call(s) (avg: {:.2}ms), {} bytes saved",
            self.total_compression_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.compressions.load(Ordering::Relaxed),
            self.avg_compression_time_ms(),
            self.bytes_saved.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Badge updates: {}",
            self.badge_updates.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
