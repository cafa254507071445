//! Fixed-size, cache-line-sized records that flow through the pipeline.
//!
//! Both records are `repr(C)` with explicit trailing padding so their size is
//! pinned to exactly one cache line (64 bytes) regardless of target pointer
//! width or field reordering optimizations the compiler might otherwise apply.

/// Produced by a [`crate::producer`], consumed by the hot dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct MarketEvent {
    pub price: f64,
    pub quantity: f64,
    pub is_sell: bool,
    pub timestamp_ms: u64,
    /// Dense instrument index, or -1 if the symbol was not found in the registry.
    pub index_symbol: i32,
    /// Monotonic tick counter captured at batch-construction time, used only
    /// for latency accounting in the hot dispatcher.
    pub tick_received: u64,
    _pad: [u8; 16],
}

impl MarketEvent {
    pub fn new(
        price: f64,
        quantity: f64,
        is_sell: bool,
        timestamp_ms: u64,
        index_symbol: i32,
        tick_received: u64,
    ) -> Self {
        Self {
            price,
            quantity,
            is_sell,
            timestamp_ms,
            index_symbol,
            tick_received,
            _pad: [0u8; 16],
        }
    }

    #[inline]
    pub fn total_usd(&self) -> f64 {
        self.price * self.quantity
    }
}

impl Default for MarketEvent {
    fn default() -> Self {
        Self::new(0.0, 0.0, false, 0, -1, 0)
    }
}

/// Produced by the hot dispatcher, consumed by the event dispatcher and each session.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct WhaleEvent {
    pub index_symbol: i32,
    pub is_sell: bool,
    pub timestamp_ms: u64,
    pub price: f64,
    pub quantity: f64,
    /// 0 when extended analytics are disabled.
    pub vwap_session: f64,
    /// 0 when extended analytics are disabled.
    pub vwap_roll50: f64,
    /// `price - vwap_roll50`; 0 when extended analytics are disabled.
    pub delta_roll: f32,
    _pad: [u8; 12],
}

impl WhaleEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_symbol: i32,
        is_sell: bool,
        timestamp_ms: u64,
        price: f64,
        quantity: f64,
        vwap_session: f64,
        vwap_roll50: f64,
        delta_roll: f32,
    ) -> Self {
        Self {
            index_symbol,
            is_sell,
            timestamp_ms,
            price,
            quantity,
            vwap_session,
            vwap_roll50,
            delta_roll,
            _pad: [0u8; 12],
        }
    }

    #[inline]
    pub fn total_usd(&self) -> f64 {
        self.price * self.quantity
    }
}

impl Default for WhaleEvent {
    fn default() -> Self {
        Self::new(-1, false, 0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }
}
