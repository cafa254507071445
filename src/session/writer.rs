//! Per-session outbound writer: drains the session's WhaleEvent ring and
//! encodes a single Data frame per batch, or an Alive frame when the
//! connection has been quiet.

use crate::config::{constants, Instruments};
use crate::events::WhaleEvent;
use crate::protocol::wire::{build_frame, encode_data_body, DataRecord, ALIVE};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tracing::{info, warn};

use super::state::Session;

/// How long the ring may sit empty before an Alive frame is sent, so the
/// client can distinguish "no whales yet" from "connection dead".
const ALIVE_QUIESCENCE: Duration = Duration::from_secs(15);

fn whale_to_record(e: &WhaleEvent, instruments: &Instruments) -> DataRecord {
    let symbol = if e.index_symbol >= 0 {
        instruments
            .instruments
            .get(e.index_symbol as usize)
            .map(|i| i.symbol.clone())
            .unwrap_or_default()
    } else {
        String::new()
    };
    DataRecord {
        price: e.price,
        quantity: e.quantity,
        is_sell: e.is_sell,
        timestamp_ms: e.timestamp_ms,
        symbol,
        vwap_session: e.vwap_session,
        vwap_roll50: e.vwap_roll50,
        delta_roll: e.delta_roll as f64,
    }
}

/// Runs until the socket errs or the session is closed by another path
/// (e.g. expiry sweep). Owns the write half; the read half lives in the
/// connection task that drives the protocol state machine.
pub async fn run(session: &Session, instruments: &Instruments, mut write_half: OwnedWriteHalf) {
    let mut scratch: Vec<WhaleEvent> = vec![WhaleEvent::default(); constants::WRITER_BATCH];
    let mut last_sent = Instant::now();

    while session.is_open() {
        let n = session.ring.pop_batch(&mut scratch, constants::WRITER_BATCH);
        if n == 0 {
            if last_sent.elapsed() >= ALIVE_QUIESCENCE {
                let msg_num = session.outbound_msg_num.fetch_add(1, Ordering::AcqRel);
                let frame = build_frame(ALIVE, msg_num, &[]);
                if write_half.write_all(&frame).await.is_err() {
                    session.set_state(super::state::SessionState::Closed);
                    warn!(session_id = session.id, "write error sending Alive frame");
                    break;
                }
                last_sent = Instant::now();
            }
            // This task is `tokio::spawn`'d onto the shared multi-threaded
            // runtime, not a pinned OS thread, so idling here must give up
            // the worker rather than busy-spin it.
            tokio::time::sleep(Duration::from_millis(1)).await;
            continue;
        }

        let records: Vec<DataRecord> = scratch[..n]
            .iter()
            .map(|e| whale_to_record(e, instruments))
            .collect();

        let body = match encode_data_body(&records) {
            Ok(b) => b,
            Err(e) => {
                warn!(session_id = session.id, error = %e, "failed to encode data body");
                continue;
            }
        };
        let msg_num = session.outbound_msg_num.fetch_add(1, Ordering::AcqRel);
        let frame = build_frame(crate::protocol::wire::DATA, msg_num, &body);

        if write_half.write_all(&frame).await.is_err() {
            session.set_state(super::state::SessionState::Closed);
            warn!(session_id = session.id, "write error sending Data frame");
            break;
        }
        last_sent = Instant::now();
    }

    info!(session_id = session.id, "session writer exiting");
}
