//! Data models for the compression pipeline.
//!
//! - [`JobRecord`] / [`JobStatus`]: one tracked file and its position in the job state machine
//! - [`Settings`] / [`Profile`]: user preferences loaded by [`ConfigManager`](crate::config::ConfigManager)
//!   and served live by [`SettingsStore`](crate::state::SettingsStore)
//!
//! # Architecture Note
//!
//! Job records are replaced whole on every update by the
//! [`JobRegistry`](crate::state::JobRegistry); nothing mutates a record that an observer
//! already holds.

pub mod job;
pub mod settings;

pub use job::{JobRecord, JobStatus, savings_percent};
pub use settings::{CompressorConfig, ImageType, Profile, SETTINGS_VERSION, Settings};
