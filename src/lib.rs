//! Low-latency whale-trade fan-out service.
//!
//! A HotRing of raw trades feeds a HotDispatcher that maintains per-instrument
//! VWAP analytics and promotes whale-sized trades onto an EventRing, which an
//! EventDispatcher routes to subscribed sessions over a length-prefixed TCP
//! protocol.

pub mod analytics;
pub mod backoff;
pub mod client;
pub mod config;
pub mod events;
pub mod histogram;
pub mod pipeline;
pub mod producer;
pub mod protocol;
pub mod registry;
pub mod ring;
pub mod server;
pub mod session;

pub use config::{Cli, Command};
pub use server::Server;
