//! Per-instrument incremental volume-weighted-average-price kernels.

const ROLL_EPSILON: f64 = 1e-7;

/// Running VWAP over the lifetime of a session (or since the last reset).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionVwap {
    sum_pv: f64,
    sum_v: f64,
}

impl SessionVwap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, price: f64, qty: f64) {
        self.sum_pv += price * qty;
        self.sum_v += qty;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        if self.sum_v > 0.0 {
            self.sum_pv / self.sum_v
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.sum_pv = 0.0;
        self.sum_v = 0.0;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PriceQty {
    pv: f64,
    v: f64,
}

/// Fixed-window VWAP over the last `N` trades, updated with O(1) running
/// sums rather than a per-event recomputation over the window.
///
/// The backing ring starts zero-initialized, so `add` can unconditionally
/// subtract the slot it is about to overwrite from the running sums on
/// every call, including the first `N` — there is no separate fill-phase
/// branch to maintain.
#[derive(Debug, Clone)]
pub struct RollingVwap<const N: usize> {
    slots: Box<[PriceQty]>,
    pos: usize,
    sum_pv: f64,
    sum_v: f64,
}

impl<const N: usize> RollingVwap<N> {
    pub fn new() -> Self {
        Self {
            slots: vec![PriceQty::default(); N].into_boxed_slice(),
            pos: 0,
            sum_pv: 0.0,
            sum_v: 0.0,
        }
    }

    pub fn add(&mut self, price: f64, qty: f64) {
        let outgoing = self.slots[self.pos];
        self.sum_pv += price * qty - outgoing.pv;
        self.sum_v += qty - outgoing.v;
        self.slots[self.pos] = PriceQty {
            pv: price * qty,
            v: qty,
        };
        self.pos = (self.pos + 1) % N;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        if self.sum_v > ROLL_EPSILON {
            self.sum_pv / self.sum_v
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        for s in self.slots.iter_mut() {
            *s = PriceQty::default();
        }
        self.pos = 0;
        self.sum_pv = 0.0;
        self.sum_v = 0.0;
    }
}

impl<const N: usize> Default for RollingVwap<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Production window size for [`RollingVwap`].
pub const ROLLING_WINDOW: usize = 50;

/// Per-instrument analytics pair, cache-line aligned so concurrent updates
/// to adjacent instruments in the dense index table never share a line.
#[repr(C, align(64))]
pub struct CoinAnalytics {
    pub session: SessionVwap,
    pub roll50: RollingVwap<ROLLING_WINDOW>,
}

impl CoinAnalytics {
    pub fn new() -> Self {
        Self {
            session: SessionVwap::new(),
            roll50: RollingVwap::new(),
        }
    }

    pub fn reset_session(&mut self) {
        self.session.reset();
    }
}

impl Default for CoinAnalytics {
    fn default() -> Self {
        Self::new()
    }
}
