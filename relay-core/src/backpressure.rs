//! Backpressure: byte-count watermarks for `ByteStreamPipe`.
//!
//! Design principle:
//! - Backpressure scales with **bytes buffered**, not message count.
//! - A pipe's writer suspends on `flush` once unread bytes cross the high
//!   watermark, and resumes once the reader has drained below the low
//!   watermark.
//! - Pluggable: the default is a fixed high/low pair, but alternate policies
//!   can be substituted without touching `pipe`.

/// A byte-count based flow-control policy.
///
/// Implementations decide, from the number of unread bytes currently queued
/// in a pipe, whether the writer should suspend or may resume.
pub trait BackpressurePolicy: Send + Sync + 'static {
    /// `true` once `buffered` bytes should suspend the writer on its next flush.
    fn should_suspend(&self, buffered: usize) -> bool;

    /// `true` once `buffered` bytes (falling) should release a suspended writer.
    fn should_resume(&self, buffered: usize) -> bool;
}

/// Fixed high/low watermark pair.
///
/// This is the default policy used by `ByteStreamPipe`. A writer blocked on
/// `flush` is released once the reader has advanced the queue back under
/// `low`.
#[derive(Debug, Clone, Copy)]
pub struct Watermarks {
    pub high: usize,
    pub low: usize,
}

impl Watermarks {
    /// # Panics
    ///
    /// Panics if `low > high`.
    #[must_use]
    pub fn new(high: usize, low: usize) -> Self {
        assert!(low <= high, "low watermark must not exceed high watermark");
        Self { high, low }
    }
}

impl Default for Watermarks {
    /// 256 KiB high watermark, 64 KiB low watermark.
    ///
    /// Chosen so a single slow consumer suspends its peer's send pump well
    /// before the arena accumulates more than a handful of unflushed pages
    /// (see `alloc::PAGE_SIZE`).
    fn default() -> Self {
        Self::new(256 * 1024, 64 * 1024)
    }
}

impl BackpressurePolicy for Watermarks {
    #[inline]
    fn should_suspend(&self, buffered: usize) -> bool {
        buffered > self.high
    }

    #[inline]
    fn should_resume(&self, buffered: usize) -> bool {
        buffered <= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_watermarks_are_ordered() {
        let w = Watermarks::default();
        assert!(w.low <= w.high);
    }

    #[test]
    fn suspend_and_resume_thresholds() {
        let w = Watermarks::new(100, 20);
        assert!(!w.should_suspend(100));
        assert!(w.should_suspend(101));
        assert!(w.should_resume(20));
        assert!(!w.should_resume(21));
    }

    #[test]
    #[should_panic(expected = "low watermark")]
    fn rejects_inverted_watermarks() {
        Watermarks::new(10, 20);
    }
}
