//! The two ways a [`crate::events::MarketEvent`] stream enters the HotRing:
//! the saturation-rate [`emulator`] or the live [`ingest`] adapter. Selected
//! once at startup by `ServeArgs::emulate`, never mixed at runtime.

pub mod emulator;
pub mod ingest;
pub mod rand;

pub use emulator::EmulatorStats;
pub use ingest::IngestFlags;
