//! Saturation-rate synthetic trade generator, used for benchmarking without
//! a live exchange connection.

use crate::config::{constants, Instrument, Instruments};
use crate::events::MarketEvent;
use crate::ring::BroadcastRing;
use quanta::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::rand::Xorshift32;

/// `threshold/reference_price + uniform_noise`: the floor alone already
/// clears `inst.global_whale_threshold` at `inst.reference_price`, and since
/// the run loop's sampled price is never below `reference_price`, the noise
/// term only ever adds headroom, never eats into it.
fn whale_quantity(rng: &mut Xorshift32, inst: &Instrument) -> f64 {
    let base = inst.global_whale_threshold / inst.reference_price;
    let noise_bound = ((base * 0.1) as f32).max(0.01);
    let noise = rng.float_range(0.0, noise_bound) as f64;
    base + noise
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Counts of batches the emulator could not write because the HotRing had
/// no headroom (`can_write` refused); exposed for the monitor thread.
pub struct EmulatorStats {
    pub dropped_batches: AtomicU64,
}

impl EmulatorStats {
    pub fn new() -> Self {
        Self {
            dropped_batches: AtomicU64::new(0),
        }
    }
}

impl Default for EmulatorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs until `running` is cleared. Intended to be the body of a dedicated,
/// core-pinned OS thread.
pub fn run<const N: usize>(
    hot_ring: &BroadcastRing<MarketEvent, N>,
    instruments: &Instruments,
    running: &AtomicBool,
    clock: &Clock,
    stats: &EmulatorStats,
) {
    let batch_size = constants::EMULATOR_BATCH_SIZE;
    let instrument_count = instruments.len() as u32;
    let mut rng = Xorshift32::default_seeded();
    let mut batch = vec![MarketEvent::default(); batch_size];

    let mut batch_ts = now_ms();
    let mut cnt_tm_upd: u64 = 0;
    let mut cnt_whale_gen: u64 = 0;
    let mut outer_iter: u64 = 0;

    while running.load(Ordering::Relaxed) {
        if hot_ring.can_write(batch_size as u64) {
            for (i, slot) in batch.iter_mut().enumerate() {
                let idx = rng.range(instrument_count) as usize;
                let inst = &instruments.instruments[idx];

                cnt_tm_upd += 1;
                if cnt_tm_upd >= constants::EMULATOR_TIMESTAMP_REFRESH_INTERVAL {
                    cnt_tm_upd = 0;
                    batch_ts = now_ms();
                }

                let price = inst.reference_price + rng.float_range(0.0, 0.7) as f64;

                cnt_whale_gen += 1;
                let quantity = if cnt_whale_gen >= constants::EMULATOR_WHALE_INJECT_INTERVAL {
                    cnt_whale_gen = 0;
                    whale_quantity(&mut rng, inst)
                } else {
                    1.0
                };

                let is_sell = (i & 1) == 0;
                let tick_received = clock.raw();

                *slot = MarketEvent::new(price, quantity, is_sell, batch_ts, idx as i32, tick_received);
            }

            hot_ring.push_batch(&batch);
        } else {
            stats
                .dropped_batches
                .fetch_add(1, Ordering::Relaxed);
        }

        outer_iter += 1;
        if outer_iter % constants::EMULATOR_PAUSE_INTERVAL == 0 {
            std::hint::spin_loop();
        }
    }
}
