//! Counters for one scan cycle.

use std::time::Duration;

/// Statistics from a single pass over all sources.
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    /// Cycle skipped because no clock was installed yet.
    pub skipped: bool,

    /// Sources with at least one active field that were scanned.
    pub sources_scanned: usize,

    /// Sources that could not be opened this cycle.
    pub sources_unavailable: usize,

    /// Values matched across all sources.
    pub values_extracted: usize,

    /// New samples stored (value transitions).
    pub samples_stored: usize,

    /// Observations folded into the previous sample.
    pub repeats: usize,

    /// Appends that failed, usually allocation.
    pub errors: Vec<String>,

    pub duration: Duration,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.skipped {
            return "cycle skipped: no clock".to_string();
        }
        format!(
            "scanned {} sources ({} unavailable), {} values, {} stored, {} repeats, {} errors in {:?}",
            self.sources_scanned,
            self.sources_unavailable,
            self.values_extracted,
            self.samples_stored,
            self.repeats,
            self.errors.len(),
            self.duration
        )
    }
}
