//! Records enter/exit timestamps of protected sections.
//!
//! Used to show that no two units of work protected by the same key ever
//! overlap in time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    active: AtomicUsize,
    peak: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

/// Concurrency recorder shared by every worker of a test.
///
/// # Example
///
/// ```
/// use tastebud_testing::ExclusionRecorder;
///
/// let recorder = ExclusionRecorder::new();
/// {
///     let _span = recorder.enter();
/// }
/// assert_eq!(recorder.peak(), 1);
/// assert_eq!(recorder.overlaps(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExclusionRecorder {
    inner: Arc<Inner>,
}

impl ExclusionRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark entry into a protected section; exit is recorded on drop.
    #[must_use = "the span records its exit when dropped"]
    pub fn enter(&self) -> ExclusionSpan {
        let now_active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now_active, Ordering::SeqCst);
        ExclusionSpan {
            inner: Arc::clone(&self.inner),
            entered: Instant::now(),
        }
    }

    /// Highest number of sections observed running at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Number of completed sections.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.inner.spans.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Number of pairs of consecutive sections whose time spans overlap.
    #[must_use]
    pub fn overlaps(&self) -> usize {
        let Ok(spans) = self.inner.spans.lock() else {
            return 0;
        };
        let mut sorted = spans.clone();
        drop(spans);

        sorted.sort_by_key(|(entered, _)| *entered);
        sorted
            .windows(2)
            .filter(|pair| pair[1].0 < pair[0].1)
            .count()
    }
}

/// An open protected section.
#[derive(Debug)]
pub struct ExclusionSpan {
    inner: Arc<Inner>,
    entered: Instant,
}

impl Drop for ExclusionSpan {
    fn drop(&mut self) {
        let exited = Instant::now();
        if let Ok(mut spans) = self.inner.spans.lock() {
            spans.push((self.entered, exited));
        }
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_spans_counted_as_overlap() {
        let recorder = ExclusionRecorder::new();
        let outer = recorder.enter();
        let inner = recorder.enter();
        drop(inner);
        drop(outer);

        assert_eq!(recorder.peak(), 2);
        assert_eq!(recorder.completed(), 2);
        assert_eq!(recorder.overlaps(), 1);
    }

    #[test]
    fn test_sequential_spans_do_not_overlap() {
        let recorder = ExclusionRecorder::new();
        for _ in 0..3 {
            let _span = recorder.enter();
        }

        assert_eq!(recorder.peak(), 1);
        assert_eq!(recorder.overlaps(), 0);
    }
}
