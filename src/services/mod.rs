//! Services module - the pipeline's collaborators and its admission control.
//!
//! Everything here is **framework-agnostic**: no UI code, only the seams the
//! [`Pipeline`](crate::pipeline::Pipeline) talks through.
//!
//! # Components
//!
//! - [`AdmissionGate`]: counting gate that bounds concurrent compressions. The ceiling
//!   can be changed at any time; waiters are admitted strictly first-in first-out and
//!   can be cancelled in bulk.
//! - [`FileInfoService`]: metadata lookup (name, extension, size). [`FsFileInfoService`]
//!   reads the local filesystem.
//! - [`Compressor`]: the compression backend. [`CommandCompressor`] drives an external
//!   encoder process and classifies its outcome into [`CompressErrorKind`]s.
//! - [`CpuCount`] and [`Notifier`]: CPU-count query and outbound badge/bounce feedback.
//!
//! # Usage Example
//!
//! ```ignore
//! use shrinkray::services::{AdmissionGate, CommandCompressor, Compressor};
//!
//! let gate = AdmissionGate::new(2);
//! let permit = gate.acquire().await?;
//! let result = compressor.compress(&profile, &job).await;
//! drop(permit); // admits the next queued job
//! ```

pub mod compression;
pub mod file_info;
pub mod gate;
pub mod system;

pub use compression::{
    CommandCompressor, CompressError, CompressErrorKind, CompressOutput, Compressor,
};
pub use file_info::{
    FileInfo, FileInfoService, FsFileInfoService, collect_images, find_images, is_image,
};
pub use gate::{AdmissionGate, GateError, GatePermit};
pub use system::{CpuCount, LogNotifier, Notifier, SystemCpuCount};

#[cfg(test)]
pub use system::{MockCpuCount, MockNotifier};
