//! Instrument table and the CLI surface. There is no config file and no
//! environment-variable configuration in the core — the full configuration
//! surface is the `serve`/`client` CLI defined here.

use crate::registry::CoinRegistry;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone)]
pub struct Instrument {
    pub symbol: String,
    pub reference_price: f64,
    pub global_whale_threshold: f64,
}

/// The fixed, startup-only instrument set. `instrument_count` never changes
/// once a `Instruments` is built.
pub struct Instruments {
    pub instruments: Vec<Instrument>,
    pub registry: CoinRegistry,
}

impl Instruments {
    pub fn build(instruments: Vec<Instrument>) -> Self {
        let mut registry = CoinRegistry::new();
        for (idx, inst) in instruments.iter().enumerate() {
            registry.register(&inst.symbol, idx as i32);
        }
        Self {
            instruments,
            registry,
        }
    }

    /// The reference deployment's default instrument set.
    pub fn default_set() -> Self {
        Self::build(vec![
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
            Instrument {
                symbol: "SOLUSDT".to_string(),
                reference_price: 180.0,
                global_whale_threshold: 50_000.0,
            },
            Instrument {
                symbol: "BNBUSDT".to_string(),
                reference_price: 600.0,
                global_whale_threshold: 60_000.0,
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    #[inline]
    pub fn global_whale_threshold(&self, index: i32) -> Option<f64> {
        self.instruments
            .get(usize::try_from(index).ok()?)
            .map(|i| i.global_whale_threshold)
    }

    #[inline]
    pub fn reference_price(&self, index: usize) -> f64 {
        self.instruments[index].reference_price
    }

    #[inline]
    pub fn symbol(&self, index: usize) -> &str {
        &self.instruments[index].symbol
    }
}

#[derive(Debug, Parser)]
#[command(name = "whalefeed", about = "Low-latency whale-trade fan-out service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the fan-out server.
    Serve(ServeArgs),
    /// Connect to a running server as a subscriber.
    Client(ClientArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// TCP port to bind.
    #[arg(default_value_t = 6000)]
    pub port: u16,
    /// 1 to run the saturation-rate emulator, 0 to ingest from the live feed.
    #[arg(default_value_t = 1)]
    pub emulate: u8,
    /// 1 to enable the rolling-50 VWAP and delta-from-roll analytics.
    #[arg(default_value_t = 0)]
    pub ext_vwap: u8,
    /// WebSocket URL the producer ingests from when `emulate` is 0.
    #[arg(long, default_value_t = String::from("wss://stream.binance.com:9443/ws"))]
    pub ingest_url: String,
}

impl ServeArgs {
    pub fn emulate(&self) -> bool {
        self.emulate != 0
    }

    pub fn ext_vwap(&self) -> bool {
        self.ext_vwap != 0
    }
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    pub host: String,
    pub port: u16,
    /// Bit 0 = Whale, bit 1 = VWAP.
    pub data_mask: u8,
    pub symbol: String,
    pub threshold: f64,
    #[arg(default_value_t = 0)]
    pub ext_vwap: u8,
}

/// Production window size and ring capacities, gathered here so the
/// orchestration code has one place to read them from.
pub mod constants {
    /// HotRing capacity (MarketEvent elements).
    pub const HOT_RING_CAPACITY: usize = 8 * 1024 * 1024;
    /// EventRing capacity (WhaleEvent elements).
    pub const EVENT_RING_CAPACITY: usize = 2 * 1024 * 1024;
    /// Per-session ring capacity (WhaleEvent elements); spec requires >= 256Ki.
    pub const SESSION_RING_CAPACITY: usize = 256 * 1024;

    pub const EMULATOR_BATCH_SIZE: usize = 64;
    pub const EMULATOR_TIMESTAMP_REFRESH_INTERVAL: u64 = 50_000_000;
    pub const EMULATOR_WHALE_INJECT_INTERVAL: u64 = 75_000_000;
    pub const EMULATOR_PAUSE_INTERVAL: u64 = 10;

    pub const HOT_DISPATCHER_BATCH: usize = 64;
    pub const EVENT_DISPATCHER_BATCH: usize = 1024;
    pub const WRITER_BATCH: usize = 4096;

    pub const HOT_RING_TAIL_ADVANCE_CHUNK: u64 = 1024;
    pub const EVENT_RING_TAIL_ADVANCE_CHUNK: u64 = 512;

    pub const HISTOGRAM_PUBLISH_INTERVAL: u64 = 10_000_000;
    pub const ROUTING_SAFETY_REBUILD_INTERVAL: u64 = 10_000_000_000;

    pub const EXPIRY_SWEEP_INTERVAL_MS: u64 = 100;
    pub const CLIENT_RECONNECT_DELAY_MS: u64 = 2_000;
    pub const INGEST_NO_DATA_TIMEOUT_SECS: u64 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_registers_all_symbols() {
        let instruments = Instruments::default_set();
        assert_eq!(instruments.len(), 4);
        assert_eq!(instruments.registry.lookup("BTCUSDT"), 0);
        assert_eq!(instruments.registry.lookup("ETHUSDT"), 1);
        assert_eq!(instruments.registry.lookup("SOLUSDT"), 2);
        assert_eq!(instruments.registry.lookup("BNBUSDT"), 3);
    }

    #[test]
    fn serve_args_default_to_the_reference_cli_defaults() {
        let cli = Cli::parse_from(["whalefeed", "serve"]);
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 6000);
                assert!(args.emulate());
                assert!(!args.ext_vwap());
            }
            _ => panic!("expected Serve"),
        }
    }

    #[test]
    fn serve_args_accept_explicit_overrides() {
        let cli = Cli::parse_from(["whalefeed", "serve", "7001", "0", "1"]);
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.port, 7001);
                assert!(!args.emulate());
                assert!(args.ext_vwap());
            }
            _ => panic!("expected Serve"),
        }
    }
}
