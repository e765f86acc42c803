//! Integration tests for the compression pipeline
//!
//! These tests verify:
//! - The concurrency ceiling and FIFO admission
//! - Terminal status mapping (Complete, AlreadySmaller, Error)
//! - Bulk cancellation and record removal mid-flight
//! - Badge and bounce feedback
//! - Live settings changes (thread limit, active profile)
//!
//! The compressor is driven by the test: every call is reported on a channel and
//! blocks until the test replies, so admission order can be observed exactly.

use camino::{Utf8Path, Utf8PathBuf};
use mockall::mock;
use shrinkray::config::{add_profile, set_active_profile};
use shrinkray::services::{
    CompressError, CompressErrorKind, CompressOutput, Compressor, CpuCount, FileInfo,
    FileInfoService, LogNotifier, Notifier,
};
use shrinkray::{
    ClearFilesEvent, JobOutcome, JobRecord, JobStatus, Pipeline, Profile, Settings,
    SettingsStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

mock! {
    pub Feedback {}
    impl Notifier for Feedback {
        fn set_dock_badge(&self, count: usize);
        fn bounce(&self);
    }
}

mock! {
    pub Cpus {}
    impl CpuCount for Cpus {
        fn cpu_count(&self) -> usize;
    }
}

/// Metadata service: every file is 1000 bytes unless its name contains "missing"
#[derive(Default)]
struct FakeFileInfo {
    calls: Arc<AtomicUsize>,
}

impl FileInfoService for FakeFileInfo {
    async fn file_info(&self, path: &Utf8Path) -> Result<FileInfo, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path.as_str().contains("missing") {
            return Err("Error getting file size: No such file or directory (os error 2)".into());
        }
        Ok(FileInfo {
            filename: path.file_name().unwrap_or_default().to_string(),
            extension: path.extension().unwrap_or_default().to_string(),
            size: 1000,
        })
    }
}

/// A compression call waiting for the test to decide its result
struct Started {
    path: Utf8PathBuf,
    profile: Profile,
    reply: oneshot::Sender<Result<CompressOutput, CompressError>>,
}

impl Started {
    fn succeed(self, out_size: u64) {
        let out_path = self.path.with_extension("min.png");
        let _ = self.reply.send(Ok(CompressOutput { out_size, out_path }));
    }

    fn fail(self, error: CompressError) {
        let _ = self.reply.send(Err(error));
    }
}

struct ControlledCompressor {
    started: mpsc::UnboundedSender<Started>,
}

impl Compressor for ControlledCompressor {
    async fn compress(
        &self,
        profile: &Profile,
        job: &JobRecord,
    ) -> Result<CompressOutput, CompressError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.started.send(Started {
            path: job.path.clone(),
            profile: profile.clone(),
            reply,
        });
        rx.await
            .unwrap_or_else(|_| Err(CompressError::new(CompressErrorKind::Unknown, "dropped")))
    }
}

/// Notifier recording every badge value and bounce
#[derive(Default)]
struct RecordingNotifier {
    badges: Mutex<Vec<usize>>,
    bounces: AtomicUsize,
}

impl Notifier for RecordingNotifier {
    fn set_dock_badge(&self, count: usize) {
        self.badges.lock().unwrap().push(count);
    }

    fn bounce(&self) {
        self.bounces.fetch_add(1, Ordering::SeqCst);
    }
}

type TestPipeline = Pipeline<FakeFileInfo, ControlledCompressor>;

struct Harness {
    pipeline: TestPipeline,
    metadata_calls: Arc<AtomicUsize>,
    started: mpsc::UnboundedReceiver<Started>,
}

impl Harness {
    fn new(threads: u32, notifier: Arc<dyn Notifier>) -> Self {
        let settings = Settings {
            threads,
            ..Settings::default()
        };
        let mut cpus = MockCpus::new();
        cpus.expect_cpu_count().return_const(4usize);

        let file_info = FakeFileInfo::default();
        let metadata_calls = Arc::clone(&file_info.calls);
        let (tx, started) = mpsc::unbounded_channel();
        let pipeline = Pipeline::builder(
            SettingsStore::new(settings),
            file_info,
            ControlledCompressor { started: tx },
        )
        .cpu_count(Arc::new(cpus))
        .notifier(notifier)
        .build();

        Self {
            pipeline,
            metadata_calls,
            started,
        }
    }

    async fn next_started(&mut self) -> Started {
        tokio::time::timeout(Duration::from_secs(5), self.started.recv())
            .await
            .expect("timed out waiting for a compression to start")
            .expect("compressor channel closed")
    }

    /// Give spawned jobs a chance to run, then assert nothing else was admitted
    async fn assert_nothing_started(&mut self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(self.started.try_recv().is_err(), "unexpected admission");
    }

    fn status(&self, path: &str) -> Option<JobStatus> {
        self.pipeline
            .registry()
            .get(Utf8Path::new(path))
            .map(|job| job.status)
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn quiet_notifier() -> Arc<dyn Notifier> {
    Arc::new(LogNotifier::new())
}

#[tokio::test]
async fn test_ceiling_of_two_with_three_files() {
    let mut h = Harness::new(2, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let _b = h.pipeline.add_file("/img/b.png").unwrap();
    let _c = h.pipeline.add_file("/img/c.png").unwrap();

    let first = h.next_started().await;
    let second = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    // Admission is FIFO
    assert_eq!(first.path, "/img/a.png");
    assert_eq!(second.path, "/img/b.png");
    assert_eq!(h.status("/img/a.png"), Some(JobStatus::Compressing));
    assert_eq!(h.status("/img/b.png"), Some(JobStatus::Compressing));
    assert_eq!(h.status("/img/c.png"), Some(JobStatus::Processing));
    assert_eq!(h.pipeline.gate().running(), 2);
    h.assert_nothing_started().await;

    first.succeed(250);
    let outcome = a.await.unwrap();

    let JobOutcome::Finished(job) = outcome else {
        panic!("job a was abandoned");
    };
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.size, Some(250));
    assert_eq!(job.original_size, Some(1000));
    assert_eq!(job.savings, Some(75.0));

    let third = h.next_started().await;
    assert_eq!(third.path, "/img/c.png");
    assert_eq!(h.pipeline.gate().running(), 2);

    second.succeed(500);
    third.succeed(900);
}

#[tokio::test]
async fn test_not_smaller_becomes_already_smaller() {
    let mut h = Harness::new(1, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    h.next_started()
        .await
        .fail(CompressError::not_smaller("Image cannot be compressed further."));

    let job = match a.await.unwrap() {
        JobOutcome::Finished(job) => job,
        JobOutcome::Abandoned => panic!("job was abandoned"),
    };
    assert_eq!(job.status, JobStatus::AlreadySmaller);
    assert_eq!(job.error.as_deref(), Some("Image cannot be compressed further."));
    assert_eq!(job.size, None);

    // Released exactly once: the slot is free and the next job takes it
    assert_eq!(h.pipeline.gate().running(), 0);
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    h.next_started().await.succeed(100);
    b.await.unwrap();
    assert_eq!(h.pipeline.gate().running(), 0);
}

#[tokio::test]
async fn test_other_compression_failure_is_error() {
    let mut h = Harness::new(1, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    h.next_started().await.fail(CompressError::new(
        CompressErrorKind::WontOverwrite,
        "Image would be overwritten. Enable Overwrite in settings to allow this.",
    ));

    let outcome = a.await.unwrap();
    assert_eq!(outcome.status(), Some(JobStatus::Error));
    assert_eq!(h.pipeline.gate().running(), 0);
}

#[tokio::test]
async fn test_metadata_failure_skips_gate_and_compressor() {
    let mut h = Harness::new(1, quiet_notifier());

    let outcome = h
        .pipeline
        .add_file("/img/missing.png")
        .unwrap()
        .await
        .unwrap();

    let JobOutcome::Finished(job) = outcome else {
        panic!("job was abandoned");
    };
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.unwrap().starts_with("Error getting file size"));
    assert!(job.original_size.is_none());

    assert_eq!(h.metadata_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.pipeline.gate().running(), 0);
    assert_eq!(h.pipeline.gate().waiting(), 0);
    h.assert_nothing_started().await;
}

#[tokio::test]
async fn test_duplicate_add_is_ignored() {
    let mut h = Harness::new(1, quiet_notifier());

    let first = h.pipeline.add_file("/img/a.png");
    let second = h.pipeline.add_file("/img/a.png");

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(h.pipeline.registry().len(), 1);

    h.next_started().await.succeed(10);
    first.unwrap().await.unwrap();
    h.assert_nothing_started().await;
}

#[tokio::test]
async fn test_clear_files_discards_queue_and_late_results() {
    let mut feedback = MockFeedback::new();
    feedback.expect_set_dock_badge().return_const(());
    feedback.expect_bounce().never();
    let mut h = Harness::new(1, Arc::new(feedback));

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let c = h.pipeline.add_file("/img/c.png").unwrap();

    let running = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 2).await;

    h.pipeline.clear_files();

    assert!(h.pipeline.registry().is_empty());
    assert_eq!(b.await.unwrap(), JobOutcome::Abandoned);
    assert_eq!(c.await.unwrap(), JobOutcome::Abandoned);

    // The in-flight compression finishes, but its result is dropped
    running.succeed(100);
    assert_eq!(a.await.unwrap(), JobOutcome::Abandoned);
    assert!(h.pipeline.registry().is_empty());
    assert_eq!(h.pipeline.gate().running(), 0);
    h.assert_nothing_started().await;
}

#[tokio::test]
async fn test_readded_path_is_not_overwritten_by_stale_job() {
    let mut h = Harness::new(1, quiet_notifier());

    let old = h.pipeline.add_file("/img/a.png").unwrap();
    let stale = h.next_started().await;

    h.pipeline.clear_files();
    let fresh = h.pipeline.add_file("/img/a.png").unwrap();
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    stale.succeed(1);
    assert_eq!(old.await.unwrap(), JobOutcome::Abandoned);

    let current = h.next_started().await;
    let record = h.pipeline.registry().get(Utf8Path::new("/img/a.png")).unwrap();
    assert_eq!(record.status, JobStatus::Compressing);
    assert_eq!(record.size, None);
    current.succeed(600);

    let outcome = fresh.await.unwrap();
    let JobOutcome::Finished(job) = outcome else {
        panic!("fresh job was abandoned");
    };
    assert_eq!(job.size, Some(600));
    assert_eq!(job.savings, Some(40.0));
}

#[tokio::test]
async fn test_lowering_ceiling_does_not_preempt() {
    let mut h = Harness::new(2, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let c = h.pipeline.add_file("/img/c.png").unwrap();
    let first = h.next_started().await;
    let second = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    h.pipeline.settings().set_threads(1);
    h.pipeline.sync_ceiling();

    assert_eq!(h.pipeline.gate().max_concurrent(), 1);
    assert_eq!(h.status("/img/a.png"), Some(JobStatus::Compressing));
    assert_eq!(h.status("/img/b.png"), Some(JobStatus::Compressing));

    // One finishes; running drops to 1, which is not below the new ceiling
    first.succeed(100);
    a.await.unwrap();
    h.assert_nothing_started().await;
    assert_eq!(h.status("/img/c.png"), Some(JobStatus::Processing));

    second.succeed(100);
    b.await.unwrap();
    h.next_started().await.succeed(100);
    c.await.unwrap();
}

#[tokio::test]
async fn test_zero_threads_uses_cpu_count() {
    let h = Harness::new(0, quiet_notifier());
    assert_eq!(h.pipeline.gate().max_concurrent(), 4);
}

#[tokio::test]
async fn test_profile_change_applies_to_queued_jobs() {
    let mut h = Harness::new(1, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let first = h.next_started().await;
    assert_eq!(first.profile.name, "Default");

    h.pipeline.settings().update(|settings| {
        let id = add_profile(settings, "Web");
        set_active_profile(settings, id);
    });

    first.succeed(100);
    a.await.unwrap();

    let second = h.next_started().await;
    assert_eq!(second.path, "/img/b.png");
    assert_eq!(second.profile.name, "Web");
    second.succeed(100);
    b.await.unwrap();
}

#[tokio::test]
async fn test_raising_threads_admits_waiters_on_next_sync() {
    let mut h = Harness::new(1, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let first = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    h.pipeline.settings().set_threads(2);
    h.pipeline.sync_ceiling();

    let second = h.next_started().await;
    assert_eq!(h.pipeline.gate().running(), 2);

    first.succeed(1);
    second.succeed(1);
    a.await.unwrap();
    b.await.unwrap();
}

#[tokio::test]
async fn test_badge_counts_down_and_bounces_once() {
    let notifier = Arc::new(RecordingNotifier::default());
    let mut h = Harness::new(2, notifier.clone());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let first = h.next_started().await;
    let second = h.next_started().await;

    first.succeed(100);
    a.await.unwrap();
    second.fail(CompressError::not_smaller("Image cannot be compressed further."));
    b.await.unwrap();

    assert_eq!(*notifier.badges.lock().unwrap(), vec![1, 2, 1, 0]);
    assert_eq!(notifier.bounces.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bounce_fires_once_with_mock() {
    let mut feedback = MockFeedback::new();
    feedback.expect_set_dock_badge().return_const(());
    feedback.expect_bounce().times(1).return_const(());

    let mut h = Harness::new(3, Arc::new(feedback));
    let handles: Vec<_> = ["/img/a.png", "/img/b.png", "/img/missing.png"]
        .into_iter()
        .filter_map(|path| h.pipeline.add_file(path))
        .collect();

    h.next_started().await.succeed(10);
    h.next_started().await.succeed(10);
    for handle in handles {
        assert!(!handle.await.unwrap().is_abandoned());
    }

    let summary = h.pipeline.registry().summary();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.bytes_saved, 1980);

    // Dropping the pipeline drops the mock and verifies its expectations
    drop(h);
}

#[tokio::test]
async fn test_remove_file_while_waiting() {
    let notifier = Arc::new(LogNotifier::new());
    let mut h = Harness::new(1, notifier.clone());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let first = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    assert!(h.pipeline.remove_file(Utf8Path::new("/img/b.png")));
    assert!(!h.pipeline.remove_file(Utf8Path::new("/img/b.png")));
    assert_eq!(notifier.last_badge(), 1);

    first.succeed(100);
    a.await.unwrap();

    // b is admitted, finds its record gone and gives the slot back
    assert_eq!(b.await.unwrap(), JobOutcome::Abandoned);
    assert_eq!(h.pipeline.gate().running(), 0);
    assert_eq!(notifier.last_badge(), 0);
    h.assert_nothing_started().await;
}

#[tokio::test]
async fn test_clear_event_listener() {
    let mut h = Harness::new(1, quiet_notifier());
    let (tx, rx) = mpsc::channel(1);
    let listener = h.pipeline.listen_for_clear(rx);

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let running = h.next_started().await;

    tx.send(ClearFilesEvent).await.unwrap();
    wait_until(|| h.pipeline.registry().is_empty()).await;
    assert_eq!(b.await.unwrap(), JobOutcome::Abandoned);

    running.succeed(1);
    assert_eq!(a.await.unwrap(), JobOutcome::Abandoned);

    drop(tx);
    listener.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_waiters() {
    let mut h = Harness::new(1, quiet_notifier());

    let a = h.pipeline.add_file("/img/a.png").unwrap();
    let b = h.pipeline.add_file("/img/b.png").unwrap();
    let running = h.next_started().await;
    wait_until(|| h.pipeline.gate().waiting() == 1).await;

    h.pipeline.shutdown();

    assert_eq!(b.await.unwrap(), JobOutcome::Abandoned);
    running.succeed(1);
    assert_eq!(a.await.unwrap(), JobOutcome::Abandoned);
    assert_eq!(h.pipeline.metrics().jobs_abandoned.load(Ordering::SeqCst), 2);
}
