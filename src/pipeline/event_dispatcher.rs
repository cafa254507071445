//! Single consumer of the EventRing. Routes each WhaleEvent to every
//! subscribed session whose symbol matches and whose per-session threshold
//! is cleared.

use crate::backoff::Backoff;
use crate::config::constants;
use crate::events::WhaleEvent;
use crate::ring::BroadcastRing;
use crate::session::Session;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// `routing[symbol_index]` is the list of sessions currently subscribed to
/// that symbol. Rebuilt from the live subscriber set whenever it changes.
pub type Routing = Vec<Vec<Arc<Session>>>;

/// Shared subscriber set, guarded by a mutex per the design's rule that it
/// is the only cross-thread mutable container taken with a lock — never on
/// the per-event path.
pub struct Subscribers {
    pub sessions: Mutex<Vec<Arc<Session>>>,
    pub changed: AtomicBool,
}

impl Subscribers {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            changed: AtomicBool::new(false),
        }
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions.lock().push(session);
        self.changed.store(true, Ordering::Release);
    }

    pub fn remove_closed(&self) {
        let mut guard = self.sessions.lock();
        let before = guard.len();
        guard.retain(|s| s.is_open());
        if guard.len() != before {
            self.changed.store(true, Ordering::Release);
        }
    }

    fn build_routing(&self, instrument_count: usize) -> Routing {
        let mut routing: Routing = vec![Vec::new(); instrument_count];
        for session in self.sessions.lock().iter() {
            if !session.is_open() {
                continue;
            }
            let idx = session.symbol_index();
            if idx >= 0 && (idx as usize) < instrument_count {
                routing[idx as usize].push(session.clone());
            }
        }
        routing
    }
}

impl Default for Subscribers {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run<const N: usize>(
    event_ring: &BroadcastRing<WhaleEvent, N>,
    subscribers: &Subscribers,
    instrument_count: usize,
    running: &AtomicBool,
) {
    let routing_snapshot: ArcSwap<Routing> = ArcSwap::from_pointee(Vec::new());
    let mut cursor: u64 = 0;
    let mut iterations_since_safety_rebuild: u64 = 0;
    let mut backoff = Backoff::new();

    while running.load(Ordering::Relaxed) {
        let head = event_ring.head();
        let backlog = head.wrapping_sub(cursor);

        if backlog as f64 > (N as f64) * 0.9 {
            warn!(backlog, "OVERLOADED! DROPS!");
            cursor = head;
            event_ring.update_tail(cursor);
            backoff.reset();
            continue;
        }

        if subscribers.changed.swap(false, Ordering::AcqRel) {
            routing_snapshot.store(Arc::new(subscribers.build_routing(instrument_count)));
        }
        iterations_since_safety_rebuild += 1;
        if iterations_since_safety_rebuild >= constants::ROUTING_SAFETY_REBUILD_INTERVAL {
            iterations_since_safety_rebuild = 0;
            routing_snapshot.store(Arc::new(subscribers.build_routing(instrument_count)));
        }

        let n = backlog.min(constants::EVENT_DISPATCHER_BATCH as u64);
        if n == 0 {
            backoff.spin();
            continue;
        }
        backoff.reset();

        let routing = routing_snapshot.load();
        for i in 0..n {
            let e = event_ring.read(cursor + i);
            if e.index_symbol < 0 || e.index_symbol as usize >= routing.len() {
                continue;
            }
            for session in &routing[e.index_symbol as usize] {
                if e.total_usd() >= session.whale_threshold() {
                    let _ = session.ring.try_push(e);
                }
            }
        }

        cursor += n;
        if cursor.wrapping_sub(event_ring.tail()) >= constants::EVENT_RING_TAIL_ADVANCE_CHUNK {
            event_ring.update_tail(cursor);
        }
    }

    event_ring.update_tail(cursor);
}
