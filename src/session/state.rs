//! Per-connection protocol state machine and the per-session outbound ring.

use crate::config::constants::SESSION_RING_CAPACITY;
use crate::events::WhaleEvent;
use crate::protocol::wire::{MASK_VWAP, MASK_WHALE};
use crate::ring::SessionRing;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ReadingHeader,
    ReadingBody,
    Subscribed,
    Closed,
}

/// One subscriber. Outlives its socket only long enough to be dropped from
/// the routing table; the socket-owning task holds the other `Arc` clone.
pub struct Session {
    pub id: u64,
    pub ring: SessionRing<WhaleEvent, SESSION_RING_CAPACITY>,
    session_symbol_index: AtomicI32,
    whale_threshold_bits: AtomicU64,
    data_type_mask: AtomicU8,
    pub outbound_msg_num: AtomicU8,
    state: Mutex<SessionState>,
    pub last_activity_ms: AtomicU64,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ring: SessionRing::new(),
            session_symbol_index: AtomicI32::new(-1),
            whale_threshold_bits: AtomicU64::new(0),
            data_type_mask: AtomicU8::new(0),
            outbound_msg_num: AtomicU8::new(0),
            state: Mutex::new(SessionState::Connected),
            last_activity_ms: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, s: SessionState) {
        *self.state.lock() = s;
    }

    /// Applies a validated Subscribe body. Callers are responsible for
    /// having already rejected an unknown symbol or a nonzero `msg_num`.
    pub fn subscribe(&self, symbol_index: i32, mask: u8, whale_threshold: f64) {
        self.session_symbol_index.store(symbol_index, Ordering::Release);
        self.data_type_mask.store(mask, Ordering::Release);
        self.whale_threshold_bits
            .store(whale_threshold.to_bits(), Ordering::Release);
        self.set_state(SessionState::Subscribed);
    }

    #[inline]
    pub fn symbol_index(&self) -> i32 {
        self.session_symbol_index.load(Ordering::Acquire)
    }

    #[inline]
    pub fn whale_threshold(&self) -> f64 {
        f64::from_bits(self.whale_threshold_bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn wants_whale(&self) -> bool {
        self.data_type_mask.load(Ordering::Acquire) & MASK_WHALE != 0
    }

    #[inline]
    pub fn wants_vwap(&self) -> bool {
        self.data_type_mask.load(Ordering::Acquire) & MASK_VWAP != 0
    }

    pub fn is_open(&self) -> bool {
        self.state() != SessionState::Closed
    }
}
