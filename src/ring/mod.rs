//! Lock-free single-producer/single-consumer ring buffers.
//!
//! Two specializations, both backed by a fixed-capacity, heap-allocated slice
//! with `head`/`tail` cursors pinned to their own cache line:
//!
//! - [`broadcast::BroadcastRing`] is the in-place variant used for the
//!   HotRing and EventRing: the consumer reads slots directly via
//!   [`broadcast::BroadcastRing::read`] and publishes its own cursor with
//!   [`broadcast::BroadcastRing::update_tail`].
//! - [`session::SessionRing`] is the bounded per-session variant: the
//!   consumer drains with [`session::SessionRing::pop_batch`] and the
//!   producer never blocks — `try_push` simply reports failure when full.

pub mod broadcast;
pub mod session;

pub use broadcast::BroadcastRing;
pub use session::SessionRing;
