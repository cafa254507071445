//! Single consumer of the HotRing, single producer of the EventRing.
//! Updates per-instrument analytics, records hot-path latency, and builds a
//! WhaleEvent whenever a trade's notional clears that instrument's global
//! whale threshold.

use crate::analytics::CoinAnalytics;
use crate::backoff::Backoff;
use crate::config::{constants, Instruments};
use crate::events::{MarketEvent, WhaleEvent};
use crate::histogram::{HistogramSnapshot, LatencyHistogram, SharedSnapshot};
use crate::ring::BroadcastRing;
use quanta::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct HotDispatcherStats {
    pub dropped_overload_waits: AtomicU64,
}

impl HotDispatcherStats {
    pub fn new() -> Self {
        Self {
            dropped_overload_waits: AtomicU64::new(0),
        }
    }
}

impl Default for HotDispatcherStats {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run<const HOT_N: usize, const EVENT_N: usize>(
    hot_ring: &BroadcastRing<MarketEvent, HOT_N>,
    event_ring: &BroadcastRing<WhaleEvent, EVENT_N>,
    instruments: &Instruments,
    ext_vwap: bool,
    vwap_reset: &AtomicBool,
    running: &AtomicBool,
    clock: &Clock,
    snapshot: &SharedSnapshot,
    stats: &HotDispatcherStats,
) {
    let mut analytics: Vec<CoinAnalytics> = (0..instruments.len()).map(|_| CoinAnalytics::new()).collect();
    let mut histogram = LatencyHistogram::new();
    let mut cursor: u64 = 0;
    let mut events_since_publish: u64 = 0;
    let mut backoff = Backoff::new();
    let mut whale_batch: Vec<WhaleEvent> = Vec::with_capacity(constants::HOT_DISPATCHER_BATCH);

    while running.load(Ordering::Relaxed) {
        if vwap_reset.swap(false, Ordering::AcqRel) {
            for a in analytics.iter_mut() {
                a.reset_session();
            }
        }

        let head = hot_ring.head();
        let n = (head - cursor).min(constants::HOT_DISPATCHER_BATCH as u64);
        if n == 0 {
            backoff.spin();
            continue;
        }
        backoff.reset();

        if !event_ring.can_write(n) {
            stats.dropped_overload_waits.fetch_add(1, Ordering::Relaxed);
            backoff.spin();
            continue;
        }

        whale_batch.clear();
        for i in 0..n {
            let e = hot_ring.read(cursor + i);
            let idx = e.index_symbol;
            if idx < 0 || idx as usize >= instruments.len() {
                continue;
            }
            let idx = idx as usize;

            let a = &mut analytics[idx];
            a.session.add(e.price, e.quantity);
            if ext_vwap {
                a.roll50.add(e.price, e.quantity);
            }

            let ticks = clock.raw().saturating_sub(e.tick_received);
            histogram.record(ticks);
            events_since_publish += 1;

            let notional = e.price * e.quantity;
            if let Some(threshold) = instruments.global_whale_threshold(idx as i32) {
                if notional >= threshold {
                    let vwap_session = a.session.value();
                    let (vwap_roll50, delta_roll) = if ext_vwap {
                        let r = a.roll50.value();
                        (r, (e.price - r) as f32)
                    } else {
                        (0.0, 0.0)
                    };
                    whale_batch.push(WhaleEvent::new(
                        idx as i32,
                        e.is_sell,
                        e.timestamp_ms,
                        e.price,
                        e.quantity,
                        vwap_session,
                        vwap_roll50,
                        delta_roll,
                    ));
                }
            }
        }

        if !whale_batch.is_empty() {
            event_ring.push_batch(&whale_batch);
        }

        cursor += n;
        if cursor.wrapping_sub(hot_ring.tail()) >= constants::HOT_RING_TAIL_ADVANCE_CHUNK {
            hot_ring.update_tail(cursor);
        }

        if events_since_publish >= constants::HISTOGRAM_PUBLISH_INTERVAL {
            events_since_publish = 0;
            let snap: HistogramSnapshot = histogram.snapshot();
            if snapshot.publish(snap) {
                histogram.reset();
            }
        }
    }

    hot_ring.update_tail(cursor);
}
