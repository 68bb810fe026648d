//! isoping - Protocol Engine
//!
//! Advances sessions on timer and network events:
//!
//! - **Handlers**: [`prepare_tx_packet`], [`send_packet`] and
//!   [`handle_ack_packet`] work on a single session
//! - **Dispatch**: [`Engine`] owns the session table and routes each
//!   datagram to the handshake or data handlers
//! - **Event loop**: [`run`] ties the engine to a socket, a clock and SIGINT
//! - **Report**: [`Printer`] writes the per-packet and summary lines

mod dispatch;
mod event_loop;
mod handlers;
mod report;

pub use dispatch::Engine;
pub use event_loop::{run, serve};
pub use handlers::*;
pub use report::{CapturedLines, Printer, StdoutReport};
