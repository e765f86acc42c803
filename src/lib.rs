// Shrinkray - bounded-concurrency image compression pipeline
//
// This is the library crate containing the job registry, admission gate and
// pipeline controller. The binary crate (main.rs) provides a headless CLI.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use crate::config::ConfigManager;
pub use models::{JobRecord, JobStatus, Profile, Settings};
pub use pipeline::{ClearFilesEvent, JobOutcome, Pipeline, PipelineBuilder};
pub use state::{JobEvent, JobRegistry, RegistrySummary, SettingsStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
