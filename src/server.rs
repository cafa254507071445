//! Server orchestration: binds the listener, spawns the five pipeline
//! threads, and drives each accepted connection through the protocol state
//! machine until it is subscribed or closed.

use crate::config::constants::{EVENT_RING_CAPACITY, EXPIRY_SWEEP_INTERVAL_MS, HOT_RING_CAPACITY};
use crate::config::Instruments;
use crate::events::{MarketEvent, WhaleEvent};
use crate::histogram::SharedSnapshot;
use crate::pipeline::{event_dispatcher, hot_dispatcher, Subscribers};
use crate::producer::{emulator, ingest, EmulatorStats, IngestFlags};
use crate::protocol::wire::{FrameHeader, SubscribeBody, SUBSCRIBE};
use crate::ring::BroadcastRing;
use crate::session::{Session, SessionState};
use anyhow::Context;
use quanta::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

pub type HotRing = BroadcastRing<MarketEvent, HOT_RING_CAPACITY>;
pub type EventRing = BroadcastRing<WhaleEvent, EVENT_RING_CAPACITY>;

/// Cores assigned to the five pipeline stages, in this fixed order:
/// producer, hot dispatcher, event dispatcher, session maintenance, monitor.
const PINNED_STAGE_COUNT: usize = 5;

pub struct Server {
    pub instruments: Arc<Instruments>,
    pub hot_ring: Arc<HotRing>,
    pub event_ring: Arc<EventRing>,
    pub subscribers: Arc<Subscribers>,
    pub snapshot: Arc<SharedSnapshot>,
    pub running: Arc<AtomicBool>,
    pub emulate: bool,
    pub ext_vwap: bool,
    pub ingest_flags: Arc<IngestFlags>,
    ingest_url: String,
    next_session_id: AtomicU64,
}

impl Server {
    pub fn new(instruments: Instruments, emulate: bool, ext_vwap: bool) -> Self {
        Self::with_ingest_url(
            instruments,
            emulate,
            ext_vwap,
            "wss://stream.binance.com:9443/ws".to_string(),
        )
    }

    pub fn with_ingest_url(
        instruments: Instruments,
        emulate: bool,
        ext_vwap: bool,
        ingest_url: String,
    ) -> Self {
        Self {
            instruments: Arc::new(instruments),
            hot_ring: Arc::new(HotRing::new()),
            event_ring: Arc::new(EventRing::new()),
            subscribers: Arc::new(Subscribers::new()),
            snapshot: Arc::new(SharedSnapshot::new()),
            running: Arc::new(AtomicBool::new(true)),
            emulate,
            ext_vwap,
            ingest_flags: Arc::new(IngestFlags::new()),
            ingest_url,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Pin the calling thread to `core_index` of the available topology, or
    /// log once and continue if the host doesn't have enough cores —
    /// affinity is a performance hint, not a correctness requirement.
    fn pin_current_thread(core_index: usize, label: &str) {
        match core_affinity::get_core_ids() {
            Some(cores) if cores.len() >= PINNED_STAGE_COUNT => {
                let core = cores[core_index];
                if core_affinity::set_for_current(core) {
                    info!(stage = label, core = core_index, "pinned to core");
                } else {
                    warn!(stage = label, core = core_index, "failed to set core affinity");
                }
            }
            _ => {
                warn!(stage = label, "fewer than 5 logical cores available; running unpinned");
            }
        }
    }

    /// Spawns the producer, HotDispatcher, EventDispatcher, session-maintenance,
    /// and monitor threads, and the Tokio accept loop. Blocks until `Stop` is
    /// observed by all of them.
    pub async fn run(self: Arc<Self>, port: u16) -> anyhow::Result<()> {
        self.run_inner(port, true).await
    }

    /// Same as [`run`](Self::run) but skips spawning the producer thread, so
    /// the caller can drive the HotRing directly with `hot_ring.push_batch`
    /// instead of the emulator or live-feed adapter.
    pub async fn run_without_producer(self: Arc<Self>, port: u16) -> anyhow::Result<()> {
        self.run_inner(port, false).await
    }

    async fn run_inner(self: Arc<Self>, port: u16, spawn_producer: bool) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding listener on port {port}"))?;
        info!(port, "listening");

        let clock = Clock::new();
        let mut handles = Vec::new();

        if spawn_producer {
            let server = self.clone();
            let clock = clock.clone();
            handles.push(std::thread::spawn(move || {
                Self::pin_current_thread(0, "producer");
                if server.emulate {
                    let stats = EmulatorStats::new();
                    emulator::run(
                        &server.hot_ring,
                        &server.instruments,
                        &server.running,
                        &clock,
                        &stats,
                    );
                } else {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build ingest runtime");
                    rt.block_on(ingest::run(
                        &server.ingest_url,
                        &server.hot_ring,
                        &server.instruments,
                        &server.running,
                        &clock,
                        &server.ingest_flags,
                    ));
                }
                info!("producer thread shutting down");
            }));
        }

        {
            let server = self.clone();
            let clock = clock.clone();
            handles.push(std::thread::spawn(move || {
                Self::pin_current_thread(1, "hot_dispatcher");
                let stats = hot_dispatcher::HotDispatcherStats::new();
                hot_dispatcher::run(
                    &server.hot_ring,
                    &server.event_ring,
                    &server.instruments,
                    server.ext_vwap,
                    &server.ingest_flags.vwap_reset,
                    &server.running,
                    &clock,
                    &server.snapshot,
                    &stats,
                );
                info!("hot dispatcher thread shutting down");
            }));
        }

        {
            let server = self.clone();
            let instrument_count = server.instruments.len();
            handles.push(std::thread::spawn(move || {
                Self::pin_current_thread(2, "event_dispatcher");
                event_dispatcher::run(
                    &server.event_ring,
                    &server.subscribers,
                    instrument_count,
                    &server.running,
                );
                info!("event dispatcher thread shutting down");
            }));
        }

        {
            let server = self.clone();
            handles.push(std::thread::spawn(move || {
                Self::pin_current_thread(3, "session_maintenance");
                while server.running.load(Ordering::Relaxed) {
                    server.subscribers.remove_closed();
                    std::thread::sleep(std::time::Duration::from_millis(EXPIRY_SWEEP_INTERVAL_MS));
                }
                info!("session maintenance thread shutting down");
            }));
        }

        {
            let server = self.clone();
            handles.push(std::thread::spawn(move || {
                Self::pin_current_thread(4, "monitor");
                let mut last_head = 0u64;
                while server.running.load(Ordering::Relaxed) {
                    // Sleep in short increments rather than a single 1s sleep
                    // so `running` going false is observed within ~100ms,
                    // not up to a full second, during shutdown.
                    let mut waited = std::time::Duration::ZERO;
                    let report_interval = std::time::Duration::from_secs(1);
                    let poll_interval = std::time::Duration::from_millis(100);
                    while waited < report_interval && server.running.load(Ordering::Relaxed) {
                        std::thread::sleep(poll_interval);
                        waited += poll_interval;
                    }
                    if !server.running.load(Ordering::Relaxed) {
                        break;
                    }
                    let head = server.hot_ring.head();
                    let throughput = head.wrapping_sub(last_head);
                    last_head = head;
                    if let Some(snap) = server.snapshot.try_take() {
                        info!(
                            throughput,
                            p50_ticks = snap.p50_ticks,
                            p99_ticks = snap.p99_ticks,
                            p999_ticks = snap.p999_ticks,
                            "throughput report"
                        );
                    } else {
                        info!(throughput, "throughput report (no latency sample yet)");
                    }
                }
                info!("monitor thread shutting down");
            }));
        }

        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    warn!(%addr, error = %e, "connection handler exited with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "fatal accept error; no longer accepting connections");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {}
            }
        }

        for h in handles {
            let _ = h.join();
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(session_id));
        session.set_state(SessionState::ReadingHeader);

        let (mut read_half, write_half) = stream.into_split();

        let mut header_buf = [0u8; FrameHeader::SIZE];
        read_half
            .read_exact(&mut header_buf)
            .await
            .context("reading subscribe header")?;

        let header = match FrameHeader::decode(&header_buf) {
            Ok(h) => h,
            Err(e) => {
                session.set_state(SessionState::Closed);
                warn!(session_id, error = %e, "protocol violation on handshake header");
                return Ok(());
            }
        };

        if header.data_type != SUBSCRIBE || header.msg_num != 0 {
            session.set_state(SessionState::Closed);
            warn!(session_id, "expected Subscribe with msg_num 0");
            return Ok(());
        }

        session.set_state(SessionState::ReadingBody);
        let mut body_buf = vec![0u8; header.len as usize];
        read_half
            .read_exact(&mut body_buf)
            .await
            .context("reading subscribe body")?;

        let subscribe = match SubscribeBody::decode(&body_buf) {
            Ok(s) => s,
            Err(e) => {
                session.set_state(SessionState::Closed);
                warn!(session_id, error = %e, "malformed subscribe body");
                return Ok(());
            }
        };

        let symbol_index = self.instruments.registry.lookup(&subscribe.symbol);
        if symbol_index < 0 {
            session.set_state(SessionState::Closed);
            warn!(session_id, symbol = %subscribe.symbol, "unknown symbol in subscribe");
            return Ok(());
        }

        session.subscribe(symbol_index, subscribe.data_type_mask, subscribe.whale_threshold);
        self.subscribers.register(session.clone());
        info!(session_id, symbol = %subscribe.symbol, "session subscribed");

        // Drain the read half concurrently with the writer so a client
        // disconnect (observed as EOF/error here) closes the session even
        // while the writer is blocked waiting for its ring to fill; the
        // subscribe handshake is one-shot, nothing further is expected from
        // the client.
        let reader_session = session.clone();
        let reader = async move {
            let mut sink = [0u8; 256];
            loop {
                match read_half.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            reader_session.set_state(SessionState::Closed);
        };
        let writer = crate::session::writer::run(&session, &self.instruments, write_half);

        tokio::select! {
            _ = reader => {}
            _ = writer => {}
        }
        session.set_state(SessionState::Closed);
        Ok(())
    }
}
