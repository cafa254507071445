use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-place SPSC ring used for the HotRing (MarketEvent) and EventRing
/// (WhaleEvent). The consumer reads slots directly with [`read`][Self::read]
/// and publishes its own progress with [`update_tail`][Self::update_tail];
/// `push_batch` is the only way items enter the ring.
///
/// `N` must be a power of two. `head` and `tail` each occupy a full cache
/// line so the producer (which only touches `head`) and the consumer (which
/// only touches `tail`) never false-share.
pub struct BroadcastRing<T, const N: usize> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: `T: Copy + Send` and access is disciplined by the SPSC contract —
// exactly one thread ever calls the producer methods, exactly one (possibly
// different) thread ever calls the consumer methods.
unsafe impl<T: Copy + Send, const N: usize> Sync for BroadcastRing<T, N> {}

impl<T: Copy, const N: usize> BroadcastRing<T, N> {
    const MASK: u64 = (N - 1) as u64;
    /// 90% of capacity: the headroom that keeps the producer from forcing
    /// the consumer's `tail` store onto the same cache line every push.
    pub const HIGH_WATER: u64 = (N as u64) * 9 / 10;

    pub fn new() -> Self {
        assert!(N.is_power_of_two(), "ring capacity must be a power of two");
        let buf = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            buf,
        }
    }

    pub const fn capacity(&self) -> u64 {
        N as u64
    }

    #[inline]
    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// True iff pushing `count` more items would not exceed `HIGH_WATER`.
    #[inline]
    pub fn can_write(&self, count: u64) -> bool {
        let h = self.head.load(Ordering::Relaxed);
        let t = self.tail.load(Ordering::Acquire);
        (h - t) + count <= Self::HIGH_WATER
    }

    /// Write `items` starting at the current head. Caller must have checked
    /// `can_write(items.len())` — this is the single producer's only entry
    /// point, so no synchronization happens here beyond the final release
    /// store of `head`.
    pub fn push_batch(&self, items: &[T]) {
        let count = items.len() as u64;
        if count == 0 {
            return;
        }
        let h = self.head.load(Ordering::Relaxed);
        let write_pos = (h & Self::MASK) as usize;

        // SAFETY: the SPSC contract guarantees we are the only writer, and
        // `can_write` was checked by the caller, so these slots are not
        // concurrently read until `head` is published below.
        unsafe {
            if write_pos + items.len() <= N {
                let dst = self.buf[write_pos].get() as *mut T;
                std::ptr::copy_nonoverlapping(items.as_ptr(), dst, items.len());
            } else {
                let first = N - write_pos;
                let dst = self.buf[write_pos].get() as *mut T;
                std::ptr::copy_nonoverlapping(items.as_ptr(), dst, first);
                let dst2 = self.buf[0].get() as *mut T;
                std::ptr::copy_nonoverlapping(items[first..].as_ptr(), dst2, items.len() - first);
            }
        }

        self.head.store(h + count, Ordering::Release);
    }

    /// Read-only access to slot `idx`. `idx` must lie in `[tail, head)`.
    #[inline]
    pub fn read(&self, idx: u64) -> T {
        let slot = (idx & Self::MASK) as usize;
        // SAFETY: caller guarantees `idx` is within the published range, so
        // the slot holds a fully constructed `T` that the producer will not
        // overwrite until `tail` advances past it.
        unsafe { (*self.buf[slot].get()).assume_init() }
    }

    /// Consumer-side publication of progress when reading in place via
    /// `read` rather than draining through a `pop_batch`-style API.
    #[inline]
    pub fn update_tail(&self, new_tail: u64) {
        self.tail.store(new_tail, Ordering::Release);
    }
}

impl<T: Copy, const N: usize> Default for BroadcastRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
