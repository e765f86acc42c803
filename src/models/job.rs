use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single compression job.
///
/// Jobs start in [`JobStatus::Processing`] (metadata lookup, waiting for admission),
/// move to [`JobStatus::Compressing`] once the admission gate lets them through, and
/// finish in exactly one terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Processing,
    Compressing,
    Complete,
    AlreadySmaller,
    Error,
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::AlreadySmaller | JobStatus::Error
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Processing => "processing",
            JobStatus::Compressing => "compressing",
            JobStatus::Complete => "complete",
            JobStatus::AlreadySmaller => "already smaller",
            JobStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// One tracked file in the job registry.
///
/// Records are treated as immutable snapshots: the registry replaces the whole record
/// on every update, so a clone handed to an observer never changes underneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Absolute path of the source image; unique key within the registry
    pub path: Utf8PathBuf,
    /// Registry-assigned intake number, distinguishing a re-added path from its
    /// earlier, cleared incarnation (0 until inserted)
    pub id: u64,
    /// Display name (file name), empty until metadata resolves
    pub file: String,
    pub status: JobStatus,
    /// Size in bytes of the compressed output
    pub size: Option<u64>,
    /// Size in bytes of the source image
    pub original_size: Option<u64>,
    /// Source extension without the leading dot
    pub ext: String,
    pub error: Option<String>,
    /// Percentage of the original size saved by compression
    pub savings: Option<f64>,
}

impl JobRecord {
    /// Placeholder record inserted at intake.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            id: 0,
            file: String::new(),
            status: JobStatus::Processing,
            size: None,
            original_size: None,
            ext: String::new(),
            error: None,
            savings: None,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bytes saved by this job, never negative. Only completed jobs count.
    pub fn bytes_saved(&self) -> u64 {
        match (self.status, self.original_size, self.size) {
            (JobStatus::Complete, Some(original), Some(size)) => original.saturating_sub(size),
            _ => 0,
        }
    }
}

/// Percentage saved going from `original_size` to `output_size`.
///
/// Returns `None` when the original size is unknown or zero.
pub fn savings_percent(original_size: Option<u64>, output_size: u64) -> Option<f64> {
    match original_size {
        Some(original) if original > 0 => {
            Some((original as f64 - output_size as f64) / original as f64 * 100.0)
        }
        _ => None,
    }
}
