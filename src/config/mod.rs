use crate::models::{Profile, Settings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Default prefix for environment overrides, e.g. `SHRINKRAY_THREADS=4`
pub const ENV_PREFIX: &str = "SHRINKRAY";

/// File name of the persisted settings inside the config directory
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Profile management failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Profile {0} not found")]
    NotFound(u32),

    #[error("The default profile cannot be deleted")]
    DefaultProfile,
}

/// Configuration manager for loading and saving the YAML settings file.
///
/// Settings are layered: built-in defaults, then `settings.yaml`, then environment
/// variables with the configured prefix. The prefix is joined by a single `_`
/// (`SHRINKRAY_THREADS`), nested keys by `__` (`SHRINKRAY_COMPRESSOR__PROGRAM`).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if missing.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment prefix (tests use this to stay isolated)
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load settings, falling back to defaults when the file doesn't exist.
    pub fn load_settings(&self) -> Result<Settings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = ::config::Config::builder()
            .add_source(
                ::config::File::from(self.settings_path.as_std_path())
                    .format(::config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let mut settings: Settings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        if settings.profiles.is_empty() {
            tracing::warn!("Settings contain no profiles, restoring the default profile");
            settings.profiles.push(Profile::default());
        }

        tracing::info!(
            "Loaded settings from {} ({} profile(s), threads={})",
            self.settings_path,
            settings.profiles.len(),
            settings.threads
        );
        Ok(settings)
    }

    /// Save settings as YAML.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

/// Append a new inactive profile and return its id.
///
/// Ids are one past the current maximum. A name already in use gets a ` (n)` suffix.
pub fn add_profile(settings: &mut Settings, name: &str) -> u32 {
    let id = settings
        .profiles
        .iter()
        .map(|p| p.id)
        .max()
        .map_or(0, |max| max + 1);

    let taken = |candidate: &str| settings.profiles.iter().any(|p| p.name == candidate);
    let mut unique = name.to_string();
    let mut n = 1;
    while taken(&unique) {
        unique = format!("{} ({})", name, n);
        n += 1;
    }

    settings.profiles.push(Profile::with_name(id, unique));
    id
}

/// Delete a profile; the default profile (id 0) is protected.
///
/// If the deleted profile was active, the default profile becomes active.
pub fn delete_profile(settings: &mut Settings, id: u32) -> Result<Profile, ProfileError> {
    if id == 0 {
        return Err(ProfileError::DefaultProfile);
    }

    let index = settings
        .profiles
        .iter()
        .position(|p| p.id == id)
        .ok_or(ProfileError::NotFound(id))?;
    let removed = settings.profiles.remove(index);

    if removed.active {
        set_active_profile(settings, 0);
    }
    Ok(removed)
}

/// Restore a profile's parameters, keeping its id, name and active flag.
pub fn reset_profile(settings: &mut Settings, id: u32) -> Result<(), ProfileError> {
    let profile = settings
        .profiles
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or(ProfileError::NotFound(id))?;

    *profile = Profile {
        id: profile.id,
        name: std::mem::take(&mut profile.name),
        active: profile.active,
        ..Profile::default()
    };
    Ok(())
}

/// Flag exactly one profile active. Unknown ids fall back to the default profile.
pub fn set_active_profile(settings: &mut Settings, id: u32) {
    let target = if settings.profile(id).is_some() {
        id
    } else {
        tracing::warn!("Profile {} not found, activating the default profile", id);
        0
    };

    for profile in &mut settings.profiles {
        profile.active = profile.id == target;
    }
}
