use model::{CacheStats, Changes};

use crate::lifecycle::Status;

/// An optional port for inspecting a running viewer.
///
/// All methods default to doing nothing, so implementors only pick what they need.
pub trait Diagnostics {
    /// Called on every status transition.
    fn status_changed(&self, _status: &Status) {}

    /// Called after changes of the keyboard scene were applied.
    fn rebuilt(&self, _changes: Changes, _cache: CacheStats) {}

    /// Called when a state update could not be applied, the previous scene is kept.
    fn rejected(&self, _reason: &str) {}
}

/// Diagnostics writing everything to the log.
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn status_changed(&self, status: &Status) {
        log::info!("Viewer status: {status}");
    }

    fn rebuilt(&self, changes: Changes, cache: CacheStats) {
        log::debug!(
            "Applied {changes:?}, legend cache has {} entries ({} hits, {} misses)",
            cache.entries,
            cache.hits,
            cache.misses
        );
    }

    fn rejected(&self, reason: &str) {
        log::warn!("State update rejected: {reason}");
    }
}
