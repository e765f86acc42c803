use crate::models::{Profile, Settings};
use std::sync::Arc;
use tokio::sync::watch;

/// Live, shared view of the application [`Settings`].
///
/// Backed by a `tokio::sync::watch` channel: readers always see the latest value and
/// can await changes. The pipeline reads `threads` and the active profile at admission
/// time, so a change made while jobs are queued applies to every job not yet started.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self { tx: Arc::new(tx) }
    }

    /// Clone of the current settings
    pub fn snapshot(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Configured thread count (0 means "use CPU count")
    pub fn threads(&self) -> u32 {
        self.tx.borrow().threads
    }

    pub fn active_profile(&self) -> Profile {
        self.tx.borrow().active_profile()
    }

    /// Replace the settings wholesale and notify watchers
    pub fn replace(&self, settings: Settings) {
        self.tx.send_replace(settings);
        tracing::debug!("Settings replaced");
    }

    /// Apply an in-place modification and notify watchers
    pub fn update<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut Settings),
    {
        self.tx.send_modify(update_fn);
    }

    pub fn set_threads(&self, threads: u32) {
        self.update(|settings| settings.threads = threads);
        tracing::info!("Thread limit set to {}", threads);
    }

    /// Receiver that resolves `changed()` whenever settings are modified
    pub fn watch(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
