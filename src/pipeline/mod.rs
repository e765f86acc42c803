//! Pipeline controller - intake, bulk cancellation and aggregate feedback.
//!
//! [`Pipeline`] is the entry point for everything that adds or removes files. It owns
//! the explicitly constructed [`JobRegistry`], [`AdmissionGate`] and [`SettingsStore`]
//! and spawns one tokio task per accepted file.
//!
//! # Execution Flow
//!
//! 1. [`add_file`](Pipeline::add_file) inserts a `Processing` placeholder (duplicates are ignored)
//! 2. The spawned lifecycle looks up metadata (not gated)
//! 3. The job waits at the gate; on admission the ceiling is resynchronised from settings
//! 4. The compressor runs; the record is replaced with its terminal status
//! 5. The permit is released, then the badge is recomputed (and the bounce fired when
//!    the last pending job finishes)
//!
//! # Cancellation
//!
//! [`clear_files`](Pipeline::clear_files) discards queued admissions and empties the
//! registry. Compressions already holding a slot run to completion; their results are
//! dropped by the registry because their records are gone.

mod lifecycle;

pub use lifecycle::JobOutcome;

use crate::metrics::Metrics;
use crate::models::JobRecord;
use crate::services::{AdmissionGate, Compressor, CpuCount, FileInfoService, Notifier, SystemCpuCount};
use crate::state::{JobRegistry, SettingsStore};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Inbound request to clear the whole queue (menu item, shortcut, signal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearFilesEvent;

pub(crate) struct PipelineInner<F, C> {
    registry: JobRegistry,
    gate: AdmissionGate,
    settings: SettingsStore,
    file_info: F,
    compressor: C,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    /// CPU count queried once at startup
    cpu_count: usize,
    /// Pending count at the last badge update; guards the one-shot bounce
    last_pending: Mutex<usize>,
}

impl<F, C> PipelineInner<F, C>
where
    F: FileInfoService,
    C: Compressor,
{
    /// Push the live thread setting into the gate
    fn sync_ceiling(&self) {
        let threads = self.settings.snapshot().effective_threads(self.cpu_count);
        self.gate.configure(threads);
    }

    /// Recompute the non-terminal count and notify
    ///
    /// The bounce fires only on a transition from pending work to none, and only
    /// when `allow_bounce` is set (terminal transitions).
    fn refresh_badge(&self, allow_bounce: bool) {
        let mut last_pending = self
            .last_pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let pending = self.registry.pending_count();

        self.notifier.set_dock_badge(pending);
        self.metrics.record_badge_update();

        if allow_bounce && *last_pending > 0 && pending == 0 {
            tracing::info!("All jobs finished");
            self.notifier.bounce();
        }
        *last_pending = pending;
    }
}

/// Builder for [`Pipeline`]
///
/// Registry, gate, CPU count and notifier default to fresh instances, the system
/// CPU count and a [`LogNotifier`](crate::services::LogNotifier) respectively.
pub struct PipelineBuilder<F, C> {
    settings: SettingsStore,
    file_info: F,
    compressor: C,
    registry: Option<JobRegistry>,
    gate: Option<AdmissionGate>,
    cpu_count: Option<Arc<dyn CpuCount>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl<F, C> PipelineBuilder<F, C>
where
    F: FileInfoService,
    C: Compressor,
{
    pub fn registry(mut self, registry: JobRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn cpu_count(mut self, cpu_count: Arc<dyn CpuCount>) -> Self {
        self.cpu_count = Some(cpu_count);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Pipeline<F, C> {
        let cpu_count = self
            .cpu_count
            .unwrap_or_else(|| Arc::new(SystemCpuCount))
            .cpu_count();
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(crate::services::LogNotifier::new()));

        let inner = PipelineInner {
            registry: self.registry.unwrap_or_default(),
            gate: self.gate.unwrap_or_else(|| AdmissionGate::new(0)),
            settings: self.settings,
            file_info: self.file_info,
            compressor: self.compressor,
            notifier,
            metrics: Metrics::new(),
            cpu_count,
            last_pending: Mutex::new(0),
        };
        inner.sync_ceiling();

        tracing::info!(
            "Pipeline ready: {} compression slot(s), {} CPU(s)",
            inner.gate.max_concurrent(),
            cpu_count
        );

        Pipeline {
            inner: Arc::new(inner),
        }
    }
}

/// The compression job pipeline
///
/// Cheap to clone; clones drive the same registry and gate.
pub struct Pipeline<F, C> {
    inner: Arc<PipelineInner<F, C>>,
}

impl<F, C> Clone for Pipeline<F, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, C> Pipeline<F, C>
where
    F: FileInfoService,
    C: Compressor,
{
    pub fn builder(settings: SettingsStore, file_info: F, compressor: C) -> PipelineBuilder<F, C> {
        PipelineBuilder {
            settings,
            file_info,
            compressor,
            registry: None,
            gate: None,
            cpu_count: None,
            notifier: None,
        }
    }

    /// Pipeline with default registry, gate, CPU count and notifier
    pub fn new(settings: SettingsStore, file_info: F, compressor: C) -> Self {
        Self::builder(settings, file_info, compressor).build()
    }

    /// Queue a file for compression
    ///
    /// Must be called from within a tokio runtime. Returns `None` when the path is
    /// already tracked; otherwise the handle resolves once the job reaches a terminal
    /// status or is abandoned. Per-job failures are reported through the record, never
    /// as a join error.
    pub fn add_file(&self, path: impl Into<Utf8PathBuf>) -> Option<JoinHandle<JobOutcome>> {
        let path = path.into();
        let job_id = self.inner.registry.insert_if_absent(JobRecord::new(path.clone()))?;

        tracing::debug!("Queued {} (job {})", path, job_id);
        self.inner.metrics.record_job_added();
        self.inner.refresh_badge(false);

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move { inner.run_job(path, job_id).await }))
    }

    /// Cancel queued admissions, drop every record and reset the badge
    pub fn clear_files(&self) {
        let mut last_pending = self
            .inner
            .last_pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let cancelled = self.inner.gate.cancel_all();
        let removed = self.inner.registry.clear();
        self.inner.notifier.set_dock_badge(0);
        self.inner.metrics.record_badge_update();
        *last_pending = 0;

        tracing::info!(
            "Cleared {} job(s), {} waiting for admission",
            removed,
            cancelled
        );
    }

    /// Remove one record; an in-flight job for it finishes unobserved
    ///
    /// # Returns
    /// `true` if the path was tracked
    pub fn remove_file(&self, path: &Utf8Path) -> bool {
        let removed = self.inner.registry.remove(path).is_some();
        if removed {
            tracing::debug!("Removed {}", path);
            self.inner.refresh_badge(false);
        }
        removed
    }

    /// Clear the queue every time a [`ClearFilesEvent`] arrives
    ///
    /// The listener ends when every sender is dropped.
    pub fn listen_for_clear(&self, mut rx: mpsc::Receiver<ClearFilesEvent>) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                pipeline.clear_files();
            }
            tracing::debug!("Clear-files listener stopped");
        })
    }

    /// Resynchronise the gate ceiling with the current settings
    pub fn sync_ceiling(&self) {
        self.inner.sync_ceiling();
    }

    /// Tear down: cancel waiters, drop records and log metrics
    pub fn shutdown(&self) {
        self.clear_files();
        self.inner.metrics.log_summary();
        tracing::info!("Pipeline shut down");
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.inner.gate
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}
