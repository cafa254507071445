pub mod state;
pub mod writer;

pub use state::{Session, SessionState};
