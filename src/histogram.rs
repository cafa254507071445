//! Hot-path latency histogram and its cross-thread publication to the
//! monitor thread.
//!
//! The hot dispatcher owns one [`LatencyHistogram`] per its own thread and
//! never shares it directly; every ~10,000,000 events it computes a
//! [`HistogramSnapshot`] and hands it to a [`SharedSnapshot`], a
//! single-writer/single-reader double buffer that never blocks either side.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// `ticks >> BUCKET_SHIFT` selects the bucket; at a 3 GHz TSC this is about
/// 340ns per bucket, adequate for P50-P99.9 at sub-millisecond scale.
pub const BUCKET_SHIFT: u32 = 10;
pub const BUCKET_COUNT: usize = 4096;

/// Per-thread accumulator. Not shared; rebuilt or reset locally by whichever
/// stage owns it (only the hot dispatcher today).
pub struct LatencyHistogram {
    buckets: Box<[u64; BUCKET_COUNT]>,
    count: u64,
    sum_ticks: u128,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: Box::new([0u64; BUCKET_COUNT]),
            count: 0,
            sum_ticks: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, ticks: u64) {
        let bucket = ((ticks >> BUCKET_SHIFT) as usize).min(BUCKET_COUNT - 1);
        self.buckets[bucket] += 1;
        self.count += 1;
        self.sum_ticks += ticks as u128;
    }

    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.count = 0;
        self.sum_ticks = 0;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Approximate the tick value at percentile `p` (0.0..=100.0) by
    /// scanning cumulative bucket counts and reporting the upper edge of
    /// the bucket in which the target rank falls.
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = ((p / 100.0) * self.count as f64).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &c) in self.buckets.iter().enumerate() {
            cumulative += c;
            if cumulative >= target.max(1) {
                return ((i as u64) + 1) << BUCKET_SHIFT;
            }
        }
        (BUCKET_COUNT as u64) << BUCKET_SHIFT
    }

    pub fn mean_ticks(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ticks as f64 / self.count as f64
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count,
            mean_ticks: self.mean_ticks(),
            p50_ticks: self.percentile(50.0),
            p90_ticks: self.percentile(90.0),
            p99_ticks: self.percentile(99.0),
            p999_ticks: self.percentile(99.9),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheap-to-copy summary, the unit of cross-thread publication.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub mean_ticks: f64,
    pub p50_ticks: u64,
    pub p90_ticks: u64,
    pub p99_ticks: u64,
    pub p999_ticks: u64,
}

/// Single-writer/single-reader double buffer: the hot dispatcher publishes,
/// the monitor thread consumes. `publish` is a no-op if the monitor hasn't
/// consumed the previous snapshot yet, so the writer never blocks and never
/// tears a slot the reader might be mid-copy on.
pub struct SharedSnapshot {
    slots: [UnsafeCell<MaybeUninit<HistogramSnapshot>>; 2],
    published_idx: AtomicUsize,
    consumed: AtomicBool,
}

const NONE_PUBLISHED: usize = usize::MAX;

unsafe impl Sync for SharedSnapshot {}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self {
            slots: [
                UnsafeCell::new(MaybeUninit::uninit()),
                UnsafeCell::new(MaybeUninit::uninit()),
            ],
            published_idx: AtomicUsize::new(NONE_PUBLISHED),
            consumed: AtomicBool::new(true),
        }
    }

    /// Returns `false` without writing anything if the previous snapshot is
    /// still unread.
    pub fn publish(&self, snap: HistogramSnapshot) -> bool {
        if !self.consumed.load(Ordering::Acquire) {
            return false;
        }
        let cur = self.published_idx.load(Ordering::Relaxed);
        let next = if cur == NONE_PUBLISHED { 0 } else { 1 - cur };
        // SAFETY: `next` is the slot the reader is not currently holding —
        // it either has never been published or was already consumed.
        unsafe {
            (*self.slots[next].get()).write(snap);
        }
        self.published_idx.store(next, Ordering::Release);
        self.consumed.store(false, Ordering::Release);
        true
    }

    /// Returns `None` if nothing new has been published since the last take.
    pub fn try_take(&self) -> Option<HistogramSnapshot> {
        if self.consumed.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.published_idx.load(Ordering::Acquire);
        if idx == NONE_PUBLISHED {
            return None;
        }
        // SAFETY: `consumed == false` implies a writer fully initialized
        // this slot before the Release store of `published_idx`/`consumed`.
        let snap = unsafe { self.slots[idx].get().read().assume_init() };
        self.consumed.store(true, Ordering::Release);
        Some(snap)
    }
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_saturates_at_top() {
        let mut h = LatencyHistogram::new();
        h.record(u64::MAX);
        assert_eq!(h.count(), 1);
        assert_eq!(h.percentile(100.0), (BUCKET_COUNT as u64) << BUCKET_SHIFT);
    }

    #[test]
    fn percentiles_are_monotone() {
        let mut h = LatencyHistogram::new();
        for t in [100u64, 200, 300, 2000, 5000, 50_000] {
            h.record(t);
        }
        assert!(h.percentile(50.0) <= h.percentile(90.0));
        assert!(h.percentile(90.0) <= h.percentile(99.0));
        assert!(h.percentile(99.0) <= h.percentile(99.9));
    }

    #[test]
    fn reset_clears_counts() {
        let mut h = LatencyHistogram::new();
        h.record(42);
        h.reset();
        assert_eq!(h.count(), 0);
        assert_eq!(h.percentile(50.0), 0);
    }

    #[test]
    fn shared_snapshot_skips_publish_until_consumed() {
        let shared = SharedSnapshot::new();
        let a = HistogramSnapshot {
            count: 1,
            ..Default::default()
        };
        let b = HistogramSnapshot {
            count: 2,
            ..Default::default()
        };
        assert!(shared.publish(a));
        // reader hasn't consumed `a` yet — publish of `b` must be refused
        assert!(!shared.publish(b));
        let taken = shared.try_take().unwrap();
        assert_eq!(taken.count, 1);
        assert!(shared.try_take().is_none());
        assert!(shared.publish(b));
        assert_eq!(shared.try_take().unwrap().count, 2);
    }
}
