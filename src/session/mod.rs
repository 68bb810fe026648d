//! Session layer: per-peer protocol state, the session table with its send
//! queue, and the handshake cookies guarding session creation.

mod cookie;
mod sessions;
mod state;
mod stats;

pub use cookie::*;
pub use sessions::Sessions;
pub use state::{HandshakeState, Session};
pub use stats::LatencyStats;
