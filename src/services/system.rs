use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Reports how many jobs may compress in parallel when the user leaves the
/// thread setting at 0
#[cfg_attr(test, mockall::automock)]
pub trait CpuCount: Send + Sync + 'static {
    fn cpu_count(&self) -> usize;
}

/// [`CpuCount`] from `std::thread::available_parallelism`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCpuCount;

impl CpuCount for SystemCpuCount {
    fn cpu_count(&self) -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Outbound, fire-and-forget system feedback
///
/// On macOS these map to the dock badge and dock-icon bounce; other front ends
/// can render them however they like.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync + 'static {
    /// Number of jobs still in flight
    fn set_dock_badge(&self, count: usize);

    /// All queued jobs have finished
    fn bounce(&self);
}

/// [`Notifier`] that only logs; used by the headless binary
#[derive(Debug, Default)]
pub struct LogNotifier {
    last_badge: AtomicUsize,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_badge(&self) -> usize {
        self.last_badge.load(Ordering::Relaxed)
    }
}

impl Notifier for LogNotifier {
    fn set_dock_badge(&self, count: usize) {
        let previous = self.last_badge.swap(count, Ordering::Relaxed);
        if previous != count {
            tracing::debug!("Badge: {} job(s) remaining", count);
        }
    }

    fn bounce(&self) {
        tracing::info!("All jobs finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_cpu_count_is_positive() {
        assert!(SystemCpuCount.cpu_count() >= 1);
    }

    #[test]
    fn test_log_notifier_tracks_badge() {
        let notifier = LogNotifier::new();
        notifier.set_dock_badge(3);
        notifier.set_dock_badge(0);
        notifier.bounce();

        assert_eq!(notifier.last_badge(), 0);
    }
}
