//! Live-feed ingest adapter: decodes trade messages from an upstream
//! WebSocket and republishes them onto the HotRing as [`MarketEvent`]s, one
//! at a time, with a no-data watchdog that forces a reconnect.

use crate::config::Instruments;
use crate::events::MarketEvent;
use crate::ring::BroadcastRing;
use futures_util::StreamExt;
use quanta::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

/// Cleared by the hot dispatcher once it has re-primed `CoinAnalytics` after
/// a reconnect; set here whenever a fresh connection is established so the
/// rolling VWAP windows don't mix pre- and post-gap data.
pub struct IngestFlags {
    pub vwap_reset: AtomicBool,
}

impl IngestFlags {
    pub fn new() -> Self {
        Self {
            vwap_reset: AtomicBool::new(false),
        }
    }
}

impl Default for IngestFlags {
    fn default() -> Self {
        Self::new()
    }
}

struct ParsedTrade {
    symbol: String,
    price: f64,
    quantity: f64,
    is_sell: bool,
    timestamp_ms: u64,
}

/// Extracts the fields this service cares about from one upstream trade
/// message, tolerating any extra fields the upstream schema carries.
fn parse_trade(mut bytes: Vec<u8>) -> Option<ParsedTrade> {
    let value = simd_json::to_borrowed_value(&mut bytes).ok()?;
    let obj = value.as_object()?;

    let symbol = obj.get("s").or_else(|| obj.get("symbol"))?.as_str()?.to_uppercase();

    let price_raw = obj.get("p").or_else(|| obj.get("price"))?;
    let price = match price_raw.as_str() {
        Some(s) => fast_float::parse(s).ok()?,
        None => price_raw.as_f64()?,
    };

    let qty_raw = obj.get("q").or_else(|| obj.get("quantity"))?;
    let quantity = match qty_raw.as_str() {
        Some(s) => fast_float::parse(s).ok()?,
        None => qty_raw.as_f64()?,
    };

    let is_sell = obj
        .get("m")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let timestamp_ms = obj
        .get("T")
        .or_else(|| obj.get("timestamp"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Some(ParsedTrade {
        symbol,
        price,
        quantity,
        is_sell,
        timestamp_ms,
    })
}

/// Runs the reconnect loop until `running` is cleared. Intended to be
/// `block_on`'d from inside a small dedicated Tokio runtime on its own OS
/// thread — this function itself never touches a thread pool.
pub async fn run<const N: usize>(
    ws_url: &str,
    hot_ring: &BroadcastRing<MarketEvent, N>,
    instruments: &Instruments,
    running: &AtomicBool,
    clock: &Clock,
    flags: &IngestFlags,
) {
    const NO_DATA_TIMEOUT: Duration = Duration::from_secs(
        crate::config::constants::INGEST_NO_DATA_TIMEOUT_SECS,
    );

    while running.load(Ordering::Relaxed) {
        match run_connection(ws_url, hot_ring, instruments, running, clock, flags, NO_DATA_TIMEOUT).await {
            Ok(()) => {}
            Err(e) => warn!(error = %e, "ingest connection lost"),
        }
        if running.load(Ordering::Relaxed) {
            flags.vwap_reset.store(true, Ordering::Release);
            tokio::time::sleep(Duration::from_millis(
                crate::config::constants::CLIENT_RECONNECT_DELAY_MS,
            ))
            .await;
        }
    }
}

async fn run_connection<const N: usize>(
    ws_url: &str,
    hot_ring: &BroadcastRing<MarketEvent, N>,
    instruments: &Instruments,
    running: &AtomicBool,
    clock: &Clock,
    flags: &IngestFlags,
    no_data_timeout: Duration,
) -> anyhow::Result<()> {
    let (ws_stream, _) = connect_async(ws_url).await?;
    let (_, mut read) = ws_stream.split();
    info!(url = ws_url, "ingest connected");
    flags.vwap_reset.store(true, Ordering::Release);

    while running.load(Ordering::Relaxed) {
        let next = tokio::time::timeout(no_data_timeout, read.next()).await;
        let msg = match next {
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(e))) => return Err(anyhow::anyhow!("ws error: {e}")),
            Ok(None) => return Err(anyhow::anyhow!("ws stream ended")),
            Err(_) => return Err(anyhow::anyhow!("no data for {no_data_timeout:?}")),
        };

        let bytes = match msg {
            Message::Text(t) => t.into_bytes(),
            Message::Binary(b) => b,
            Message::Close(_) => return Err(anyhow::anyhow!("ws closed by server")),
            _ => continue,
        };

        let Some(trade) = parse_trade(bytes) else {
            continue;
        };

        let idx = instruments.registry.lookup(&trade.symbol);
        if idx < 0 {
            continue;
        }

        let event = MarketEvent::new(
            trade.price,
            trade.quantity,
            trade.is_sell,
            trade.timestamp_ms,
            idx,
            clock.raw(),
        );

        if hot_ring.can_write(1) {
            hot_ring.push_batch(std::slice::from_ref(&event));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_trade_message() {
        let raw = br#"{"s":"btcusdt","p":"96050.5","q":"0.25","m":true,"T":1000}"#.to_vec();
        let trade = parse_trade(raw).unwrap();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert!((trade.price - 96050.5).abs() < 1e-9);
        assert!((trade.quantity - 0.25).abs() < 1e-9);
        assert!(trade.is_sell);
        assert_eq!(trade.timestamp_ms, 1000);
    }

    #[test]
    fn parses_numeric_fields_too() {
        let raw = br#"{"symbol":"ETHUSDT","price":2700.1,"quantity":3.5}"#.to_vec();
        let trade = parse_trade(raw).unwrap();
        assert_eq!(trade.symbol, "ETHUSDT");
        assert!((trade.price - 2700.1).abs() < 1e-9);
    }

    #[test]
    fn rejects_missing_fields() {
        let raw = br#"{"s":"BTCUSDT"}"#.to_vec();
        assert!(parse_trade(raw).is_none());
    }
}
