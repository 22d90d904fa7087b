//! Small runtime-tunable surface: today, only the owner-count
//! leak-detection threshold from the resource policy in SPEC_FULL.md §5.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

const DEFAULT_OWNER_LEAK_THRESHOLD: usize = 100;

/// Process-wide configuration for the promise runtime.
pub struct Config {
    owner_leak_threshold: AtomicUsize,
}

static GLOBAL: OnceLock<Config> = OnceLock::new();

impl Config {
    /// The shared, process-wide configuration instance.
    pub fn global() -> &'static Config {
        GLOBAL.get_or_init(|| Config { owner_leak_threshold: AtomicUsize::new(DEFAULT_OWNER_LEAK_THRESHOLD) })
    }

    /// Owner-set size past which a holder logs a possible-leak warning.
    pub fn owner_leak_threshold(&self) -> usize {
        self.owner_leak_threshold.load(Ordering::Relaxed)
    }

    pub fn set_owner_leak_threshold(&self, n: usize) {
        self.owner_leak_threshold.store(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_matches_documented_value() {
        assert_eq!(Config::global().owner_leak_threshold(), DEFAULT_OWNER_LEAK_THRESHOLD);
    }
}
