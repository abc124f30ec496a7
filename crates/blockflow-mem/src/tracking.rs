//! Lightweight peak tracking hooks.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self {
            peak: AtomicUsize::new(0),
        }
    }

    /// Record a new current value; updates the peak if higher.
    pub fn record(&self, current: usize) {
        let mut cur = self.peak.load(Ordering::Relaxed);
        while current > cur {
            match self.peak.compare_exchange(
                cur,
                current,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(
            current,
            peak = self.peak.load(Ordering::Relaxed),
            "pool outstanding"
        );
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}
