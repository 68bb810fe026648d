//! # isoping
//!
//! **Iso**chronous **ping**
//!
//! Like ping, but both ends send packets at a fixed rate (equally spaced in
//! time) and acknowledge each other's packets. Because transmit times are
//! known in advance, each side can tell how late every packet arrived, so
//! delay and loss are attributed to one direction or the other instead of
//! being lumped into a round trip.
//!
//! - **Stateless handshake**: the server hands out SHA-256 cookies and keeps
//!   no per-client state until one comes back
//! - **Unsynchronized clocks**: the offset between the two monotonic clocks
//!   is estimated from the packets themselves and re-anchored as they drift
//! - **Many clients**: the server serves any number of peers from one socket
//!
//! ## Modules
//!
//! - [`core`]: Traits, constants, and error types
//! - [`transport`]: Wire format, ack ring, clocks, and sockets
//! - [`session`]: Per-peer state, the session table, and handshake cookies
//! - [`engine`]: Packet handlers, dispatch, and the event loop
//! - [`config`]: Command line and runtime settings
//!
//! ## Example Usage
//!
//! ```rust
//! use isoping::prelude::*;
//!
//! // Drive a client without a network: the first send is a cookie request.
//! let config = Config::client("localhost");
//! let server = "[::1]:4948".parse().unwrap();
//! let (printer, _lines) = Printer::captured(true);
//! let mut client = Engine::client(&config, server, 1_000, printer);
//!
//! let mut sent = RecordingTransmit::new();
//! client.send_waiting_packets(1_000, &mut sent).unwrap();
//!
//! let packets = sent.take_packets();
//! assert_eq!(packets.len(), 1);
//! assert!(packets[0].0.is_handshake());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod engine;
pub mod session;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{Args, Config, Role};
    pub use crate::core::*;
    pub use crate::engine::{Engine, Printer, StdoutReport};
    pub use crate::session::{CookieJar, HandshakeState, Session, Sessions};
    pub use crate::transport::{
        AckRing, IsopingSocket, MonotonicClock, Packet, PacketBody, RecordingTransmit, diff,
    };
}

// Re-export commonly used items at crate root
pub use core::{IsopingError, IsopingResult};
pub use engine::{Engine, run};
