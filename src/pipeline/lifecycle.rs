// Job lifecycle driver
//
// Advances one job Processing -> Compressing -> {Complete, AlreadySmaller, Error}.
// The gate permit is held only across the compressor call. It is released before
// the badge is recomputed, explicitly on the normal path and by drop otherwise.

use super::PipelineInner;
use crate::models::{JobRecord, JobStatus, savings_percent};
use crate::services::{CompressError, CompressErrorKind, Compressor, FileInfoService, GateError};
use camino::Utf8PathBuf;
use std::time::Instant;

/// How a spawned job ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The job reached a terminal status; carries the final record
    Finished(JobRecord),

    /// The job's record was removed or the queue cleared before it finished
    Abandoned,
}

impl JobOutcome {
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobOutcome::Finished(job) => Some(job.status),
            JobOutcome::Abandoned => None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, JobOutcome::Abandoned)
    }
}

impl<F, C> PipelineInner<F, C>
where
    F: FileInfoService,
    C: Compressor,
{
    /// Drive one job to completion and refresh the badge afterwards
    pub(super) async fn run_job(&self, path: Utf8PathBuf, job_id: u64) -> JobOutcome {
        let outcome = self.drive(&path, job_id).await;

        match &outcome {
            JobOutcome::Finished(job) => {
                tracing::info!(
                    "Job {} finished: {}{}",
                    path,
                    job.status,
                    job.error
                        .as_deref()
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                );
                self.metrics.record_terminal(job.status);
                self.metrics.record_bytes_saved(job.bytes_saved());
                self.refresh_badge(true);
            }
            JobOutcome::Abandoned => {
                tracing::debug!("Job {} abandoned", path);
                self.metrics.record_abandoned();
            }
        }

        outcome
    }

    async fn drive(&self, path: &Utf8PathBuf, job_id: u64) -> JobOutcome {
        let info = match self.file_info.file_info(path).await {
            Ok(info) => info,
            Err(message) => {
                tracing::warn!("Metadata lookup failed for {}: {}", path, message);
                return self.finish(path, job_id, |job| {
                    job.status = JobStatus::Error;
                    job.error = Some(message);
                });
            }
        };

        let resolved = self.registry.update_job(path, job_id, |job| {
            job.file = info.filename;
            job.ext = info.extension;
            job.original_size = Some(info.size);
        });
        if resolved.is_none() {
            return JobOutcome::Abandoned;
        }

        // The only suspension point that waits on other jobs
        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(GateError::Cancelled) => return JobOutcome::Abandoned,
        };
        self.sync_ceiling();
        let profile = self.settings.active_profile();

        let Some(job) = self.registry.update_job(path, job_id, |job| {
            job.status = JobStatus::Compressing;
        }) else {
            return JobOutcome::Abandoned;
        };

        tracing::debug!(
            "Compressing {} with profile '{}' ({} running)",
            path,
            profile.name,
            self.gate.running()
        );
        let start = Instant::now();
        let result = self.compressor.compress(&profile, &job).await;
        self.metrics.record_compression_time(start.elapsed());

        let outcome = match result {
            Ok(output) => self.finish(path, job_id, |job| {
                job.savings = savings_percent(job.original_size, output.out_size);
                job.size = Some(output.out_size);
                job.status = JobStatus::Complete;
            }),
            Err(CompressError { kind, message }) => {
                let status = if kind == CompressErrorKind::NotSmaller {
                    JobStatus::AlreadySmaller
                } else {
                    JobStatus::Error
                };
                self.finish(path, job_id, |job| {
                    job.status = status;
                    job.error = Some(message);
                })
            }
        };

        permit.release();
        outcome
    }

    /// Apply a terminal update; a vanished record means the job was abandoned
    fn finish<U>(&self, path: &Utf8PathBuf, job_id: u64, update_fn: U) -> JobOutcome
    where
        U: FnOnce(&mut JobRecord),
    {
        match self.registry.update_job(path, job_id, update_fn) {
            Some(job) => JobOutcome::Finished(job),
            None => JobOutcome::Abandoned,
        }
    }
}
