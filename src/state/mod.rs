// State management module
//
// This module provides the JobRegistry, an ordered map of job records keyed by path,
// which emits change events for observers (UI, badge updates, tests).

pub mod settings;

pub use settings::SettingsStore;

use crate::models::{JobRecord, JobStatus};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when the registry is modified
///
/// Every event carries the full record snapshot so subscribers never need to
/// read back from the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// A new job was accepted at intake
    Added(JobRecord),

    /// A job record was replaced
    Updated(JobRecord),

    /// A single job was removed by the user
    Removed(Utf8PathBuf),

    /// The whole registry was emptied
    Cleared { removed: usize },
}

/// Aggregate view over all tracked jobs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistrySummary {
    pub total: usize,
    /// Jobs not yet in a terminal status
    pub pending: usize,
    pub completed: usize,
    pub already_smaller: usize,
    pub failed: usize,
    /// Sum of `max(original - output, 0)` over completed jobs
    pub bytes_saved: u64,
    /// Mean savings percentage over completed jobs
    pub average_savings: Option<f64>,
}

/// Thread-safe job registry with event emission
///
/// Holds at most one [`JobRecord`] per path, in intake order. Updates replace the
/// stored record wholesale, so every snapshot handed out is internally consistent.
/// Updates aimed at a path that is no longer tracked are silently dropped; this is
/// how results of jobs removed or cleared mid-flight are discarded.
///
/// # Usage
///
/// - [`insert_if_absent()`](Self::insert_if_absent) at intake
/// - [`update()`](Self::update) from the lifecycle driver
/// - [`subscribe()`](Self::subscribe) for listening to changes
pub struct JobRegistry {
    /// Job records in intake order
    jobs: Arc<RwLock<IndexMap<Utf8PathBuf, JobRecord>>>,

    /// Next intake number handed out by `insert_if_absent`
    next_id: Arc<AtomicU64>,

    /// Broadcast channel for emitting job events
    events_tx: broadcast::Sender<JobEvent>,
}

impl JobRegistry {
    /// Create an empty registry with a broadcast buffer of 256 events
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            jobs: Arc::new(RwLock::new(IndexMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            events_tx,
        }
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, IndexMap<Utf8PathBuf, JobRecord>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, IndexMap<Utf8PathBuf, JobRecord>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: JobEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(event);
    }

    /// Insert a record unless its path is already tracked
    ///
    /// The stored record is stamped with a fresh intake id.
    ///
    /// # Returns
    /// The assigned id, or `None` for a duplicate path
    pub fn insert_if_absent(&self, mut record: JobRecord) -> Option<u64> {
        let mut jobs = self.write_jobs();
        if jobs.contains_key(&record.path) {
            tracing::debug!("Ignoring duplicate intake: {}", record.path);
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        record.id = id;
        jobs.insert(record.path.clone(), record.clone());
        drop(jobs);

        self.emit(JobEvent::Added(record));
        Some(id)
    }

    /// Replace the record at `path` with a modified copy
    ///
    /// The closure receives a clone of the current record. Terminal records are
    /// frozen: an update against one is refused. The path and id cannot be changed.
    ///
    /// # Returns
    /// The new snapshot, or `None` if the path is not tracked (or is terminal)
    pub fn update<F>(&self, path: &Utf8Path, update_fn: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        self.apply_update(path, None, update_fn)
    }

    /// Like [`update()`](Self::update), but only if the stored record still carries `id`
    ///
    /// Used by the lifecycle driver so that a job cleared mid-flight cannot overwrite
    /// a newer record for the same path.
    pub fn update_job<F>(&self, path: &Utf8Path, id: u64, update_fn: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        self.apply_update(path, Some(id), update_fn)
    }

    fn apply_update<F>(&self, path: &Utf8Path, id: Option<u64>, update_fn: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.write_jobs();
        let Some(current) = jobs.get(path) else {
            tracing::debug!("Dropping update for untracked job: {}", path);
            return None;
        };

        if id.is_some_and(|id| id != current.id) {
            tracing::debug!("Dropping update for superseded job: {}", path);
            return None;
        }

        if current.is_done() {
            tracing::warn!(
                "Refusing update of {} in terminal status {}",
                path,
                current.status
            );
            return None;
        }

        let mut next = current.clone();
        update_fn(&mut next);
        next.path = path.to_path_buf();
        next.id = current.id;

        let changed = *current != next;
        jobs.insert(path.to_path_buf(), next.clone());
        drop(jobs);

        if changed {
            self.emit(JobEvent::Updated(next.clone()));
        }
        Some(next)
    }

    /// Remove a single record
    pub fn remove(&self, path: &Utf8Path) -> Option<JobRecord> {
        let removed = self.write_jobs().shift_remove(path);
        if removed.is_some() {
            self.emit(JobEvent::Removed(path.to_path_buf()));
        }
        removed
    }

    /// Remove every record, returning how many were dropped
    pub fn clear(&self) -> usize {
        let removed = {
            let mut jobs = self.write_jobs();
            let count = jobs.len();
            jobs.clear();
            count
        };
        self.emit(JobEvent::Cleared { removed });
        removed
    }

    pub fn get(&self, path: &Utf8Path) -> Option<JobRecord> {
        self.read_jobs().get(path).cloned()
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.read_jobs().contains_key(path)
    }

    /// Clone of every record in intake order
    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.read_jobs().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_jobs().is_empty()
    }

    /// Number of jobs not yet in a terminal status
    pub fn pending_count(&self) -> usize {
        self.read_jobs().values().filter(|job| !job.is_done()).count()
    }

    /// Compute aggregate statistics across all jobs
    pub fn summary(&self) -> RegistrySummary {
        let jobs = self.read_jobs();
        let mut summary = RegistrySummary {
            total: jobs.len(),
            ..RegistrySummary::default()
        };
        let mut savings_total = 0.0;

        for job in jobs.values() {
            match job.status {
                JobStatus::Processing | JobStatus::Compressing => summary.pending += 1,
                JobStatus::Complete => {
                    summary.completed += 1;
                    summary.bytes_saved += job.bytes_saved();
                    savings_total += job.savings.unwrap_or(0.0);
                }
                JobStatus::AlreadySmaller => summary.already_smaller += 1,
                JobStatus::Error => summary.failed += 1,
            }
        }

        if summary.completed > 0 {
            summary.average_savings = Some(savings_total / summary.completed as f64);
        }
        summary
    }

    /// Subscribe to registry change events
    ///
    /// Returns a receiver that will get notified of all future changes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same underlying map and channel
impl Clone for JobRegistry {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            next_id: Arc::clone(&self.next_id),
            events_tx: self.events_tx.clone(),
        }
    }
}
