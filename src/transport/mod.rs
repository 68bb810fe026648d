//! isoping - Transport Layer
//!
//! Everything that touches bytes, sockets or clocks:
//!
//! - **Packet encoding/decoding**: [`Packet`] and its fixed 540-byte layout
//! - **Acknowledgment ring**: [`AckRing`] of recently received packets
//! - **Clock utilities**: [`MonotonicClock`] and the wrapping [`diff`]
//! - **Send timer**: [`SendTimer`], microsecond waits on a timerfd
//! - **Sockets**: [`IsopingSocket`], a dual-stack tokio UDP socket
//! - **Recording**: [`RecordingTransmit`], an in-memory stand-in for the socket
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Engine                       │
//! ├─────────────────────────────────────────┤
//! │            Sessions                     │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   packets, acks, clocks, sockets        │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod acks;
mod packet;
mod recording;
mod socket;
mod timer;
mod timing;

pub use acks::*;
pub use packet::*;
pub use recording::RecordingTransmit;
pub use socket::*;
pub use timer::SendTimer;
pub use timing::*;
