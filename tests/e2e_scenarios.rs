//! End-to-end scenarios: a `Server` bound to an ephemeral port, driven by
//! direct HotRing pushes (bypassing the emulator/ingest producer so each
//! scenario's inputs are exact), asserted on by reading real frames back
//! over a `TcpStream`.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use whalefeed::config::{Instrument, Instruments};
use whalefeed::events::MarketEvent;
use whalefeed::protocol::wire::{
    build_frame, decode_data_body, FrameHeader, SubscribeBody, DATA, MASK_WHALE, SUBSCRIBE,
};
use whalefeed::server::Server;

async fn ephemeral_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

fn two_instrument_set() -> Instruments {
    Instruments::build(vec![
        Instrument {
            symbol: "BTCUSDT".to_string(),
            reference_price: 96_000.0,
            global_whale_threshold: 100_000.0,
        },
        Instrument {
            symbol: "ETHUSDT".to_string(),
            reference_price: 2_700.0,
            global_whale_threshold: 70_000.0,
        },
    ])
}

async fn start_server(instruments: Instruments) -> (Arc<Server>, u16) {
    let port = ephemeral_port().await;
    let server = Arc::new(Server::new(instruments, false, false));
    let running_server = server.clone();
    tokio::spawn(async move {
        let _ = running_server.run_without_producer(port).await;
    });
    // give the accept loop a moment to bind
    tokio::time::sleep(Duration::from_millis(100)).await;
    (server, port)
}

async fn connect_and_subscribe(port: u16, symbol: &str, threshold: f64) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let body = SubscribeBody {
        data_type_mask: MASK_WHALE,
        symbol: symbol.to_string(),
        whale_threshold: threshold,
    }
    .encode()
    .unwrap();
    let frame = build_frame(SUBSCRIBE, 0, &body);
    stream.write_all(&frame).await.unwrap();
    stream
}

async fn try_read_data_frame(
    stream: &mut TcpStream,
    timeout: Duration,
) -> Option<Vec<whalefeed::protocol::wire::DataRecord>> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    let read = tokio::time::timeout(timeout, stream.read_exact(&mut header_buf)).await;
    let Ok(Ok(_)) = read else {
        return None;
    };
    let header = FrameHeader::decode(&header_buf).unwrap();
    let mut body_buf = vec![0u8; header.len as usize];
    stream.read_exact(&mut body_buf).await.unwrap();
    if header.data_type == DATA {
        Some(decode_data_body(&body_buf).unwrap())
    } else {
        None
    }
}

#[tokio::test]
async fn snapshot_below_threshold_emits_no_data_frame() {
    let (server, port) = start_server(two_instrument_set()).await;
    let mut client = connect_and_subscribe(port, "BTCUSDT", 100_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.hot_ring.push_batch(&[
        MarketEvent::new(95_000.0, 2.0, true, 1, 0, 0),
        MarketEvent::new(97_000.0, 0.5, false, 2, 0, 0),
    ]);

    let frame = try_read_data_frame(&mut client, Duration::from_millis(200)).await;
    assert!(frame.is_none(), "no trade here clears the whale threshold");
    server.stop();
}

#[tokio::test]
async fn whale_detection_reports_the_post_trade_session_vwap() {
    let (server, port) = start_server(two_instrument_set()).await;
    let mut client = connect_and_subscribe(port, "BTCUSDT", 100_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.hot_ring.push_batch(&[
        MarketEvent::new(95_000.0, 2.0, true, 1, 0, 0),
        MarketEvent::new(97_000.0, 0.5, false, 2, 0, 0),
        MarketEvent::new(96_000.0, 1.2, true, 3, 0, 0),
    ]);

    let records = try_read_data_frame(&mut client, Duration::from_millis(500))
        .await
        .expect("the third trade clears the threshold");
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert!((r.price - 96_000.0).abs() < 1e-9);
    assert!((r.quantity - 1.2).abs() < 1e-9);
    assert!(r.is_sell);
    let expected_vwap = (95_000.0 * 2.0 + 97_000.0 * 0.5 + 96_000.0 * 1.2) / (2.0 + 0.5 + 1.2);
    assert!((r.vwap_session - expected_vwap).abs() < 1e-3);
    server.stop();
}

#[tokio::test]
async fn per_session_threshold_filters_independently() {
    let (server, port) = start_server(two_instrument_set()).await;
    let mut low = connect_and_subscribe(port, "BTCUSDT", 100_000.0).await;
    let mut high = connect_and_subscribe(port, "BTCUSDT", 200_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 120_000 notional: clears the low threshold, not the high one.
    server
        .hot_ring
        .push_batch(&[MarketEvent::new(96_000.0, 1.25, true, 1, 0, 0)]);

    let low_frame = try_read_data_frame(&mut low, Duration::from_millis(500));
    let high_frame = try_read_data_frame(&mut high, Duration::from_millis(300));
    let (low_frame, high_frame) = tokio::join!(low_frame, high_frame);

    assert_eq!(low_frame.map(|r| r.len()), Some(1));
    assert!(high_frame.is_none());
    server.stop();
}

#[tokio::test]
async fn symbols_are_isolated_between_sessions() {
    let (server, port) = start_server(two_instrument_set()).await;
    let mut btc_client = connect_and_subscribe(port, "BTCUSDT", 1_000.0).await;
    let mut eth_client = connect_and_subscribe(port, "ETHUSDT", 1_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // ETHUSDT is index 1 in `two_instrument_set`.
    server
        .hot_ring
        .push_batch(&[MarketEvent::new(2_700.0, 30.0, false, 1, 1, 0)]);

    let (btc_frame, eth_frame) = tokio::join!(
        try_read_data_frame(&mut btc_client, Duration::from_millis(300)),
        try_read_data_frame(&mut eth_client, Duration::from_millis(500)),
    );

    assert!(btc_frame.is_none(), "a trade on ETHUSDT must not reach the BTCUSDT subscriber");
    let eth_records = eth_frame.expect("ETHUSDT subscriber should see its own whale");
    assert_eq!(eth_records.len(), 1);
    assert_eq!(eth_records[0].symbol, "ETHUSDT");
    server.stop();
}

#[tokio::test]
async fn reconnect_reset_zeroes_the_session_vwap_for_the_next_trade() {
    let (server, port) = start_server(two_instrument_set()).await;
    let mut client = connect_and_subscribe(port, "BTCUSDT", 1_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    server
        .hot_ring
        .push_batch(&[MarketEvent::new(95_000.0, 5.0, true, 1, 0, 0)]);
    let first = try_read_data_frame(&mut client, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    server
        .ingest_flags
        .vwap_reset
        .store(true, std::sync::atomic::Ordering::Release);
    // notional exactly clears BTCUSDT's 100_000 global whale threshold
    server
        .hot_ring
        .push_batch(&[MarketEvent::new(100_000.0, 1.0, false, 2, 0, 0)]);
    let second = try_read_data_frame(&mut client, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    // a reset session VWAP on the first post-reset trade equals that trade's own price
    assert!((second[0].vwap_session - 100_000.0).abs() < 1e-6);
    server.stop();
}

#[tokio::test]
async fn overload_drop_starves_a_frozen_client_without_affecting_others() {
    use whalefeed::config::constants::SESSION_RING_CAPACITY;

    let (server, port) = start_server(two_instrument_set()).await;
    let frozen = connect_and_subscribe(port, "BTCUSDT", 1_000.0).await;
    let mut live = connect_and_subscribe(port, "BTCUSDT", 2_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Keep draining the live client concurrently so its own ring and socket
    // never back up while the frozen client (never read below) is starved.
    let live_reader = tokio::spawn(async move {
        let mut total = 0usize;
        loop {
            match try_read_data_frame(&mut live, Duration::from_millis(200)).await {
                Some(records) => total += records.len(),
                None => break,
            }
        }
        total
    });

    // Far more whale-qualifying trades than the per-session ring's absolute
    // capacity, so the frozen client's ring is guaranteed to fill.
    let overflow_count = SESSION_RING_CAPACITY * 2;
    let trades: Vec<MarketEvent> = (0..overflow_count as u64)
        .map(|i| MarketEvent::new(50_000.0, 1.0, (i & 1) == 0, i + 1, 0, 0))
        .collect();
    server.hot_ring.push_batch(&trades);

    // Give the pipeline time to push everything it's going to push; the
    // frozen client never reads, so its session ring fills and further
    // `try_push` calls are silently dropped for that client only.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let frozen_session = server
        .subscribers
        .sessions
        .lock()
        .iter()
        .find(|s| (s.whale_threshold() - 1_000.0).abs() < 1e-9)
        .expect("frozen session still registered")
        .clone();
    assert_eq!(
        frozen_session.ring.head(),
        SESSION_RING_CAPACITY as u64,
        "frozen client's ring must have filled to its absolute capacity and stayed there"
    );

    drop(frozen);
    let live_total = live_reader.await.unwrap();
    assert!(live_total > 0, "the non-frozen client must keep receiving whales");
    server.stop();
}

#[tokio::test]
async fn stop_makes_every_pipeline_thread_join_within_500ms() {
    let port = ephemeral_port().await;
    let server = Arc::new(Server::new(two_instrument_set(), false, false));
    let running_server = server.clone();
    let handle = tokio::spawn(async move {
        let _ = running_server.run_without_producer(port).await;
    });
    // let the accept loop and pipeline threads finish starting up
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.stop();
    let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
    assert!(
        result.is_ok(),
        "server did not shut down within 500ms of stop() under idle conditions"
    );
}
