//! The custom length-prefixed binary wire protocol shared by server and client.

pub mod wire;

pub use wire::{
    build_frame, DataRecord, FrameError, FrameHeader, SubscribeBody, ALIVE, DATA, SIGNATURE,
    SUBSCRIBE, VERSION,
};
