//! Core traits for isoping.
//!
//! These are the seams between the protocol engine and the outside world:
//! the socket it sends on, the sink for report lines, and the sources of
//! randomness and wall-clock time used by the handshake cookies.

use std::io;
use std::net::SocketAddr;

use super::constants::COOKIE_SECRET_SIZE;

/// Outbound datagram path.
///
/// The server addresses every packet to a session's stored peer address; a
/// client transmitter is connected and may ignore `to`.
pub trait Transmit {
    /// Send one datagram.
    ///
    /// Errors are returned unchanged so the caller can tell
    /// `ConnectionRefused` apart from transient failures.
    fn transmit(&mut self, packet: &[u8], to: SocketAddr) -> io::Result<()>;
}

impl<T: Transmit + ?Sized> Transmit for &mut T {
    fn transmit(&mut self, packet: &[u8], to: SocketAddr) -> io::Result<()> {
        (**self).transmit(packet, to)
    }
}

/// Sink for the human-readable report lines (per-packet latency lines and
/// the final summary).
pub trait Report {
    /// Emit one complete line, without the trailing newline.
    fn line(&mut self, line: &str);
}

/// Source of fresh cookie secrets.
///
/// Production uses the OS random generator; the replay harness and tests
/// inject fixed bytes.
pub trait SecretSource: Send {
    /// Overwrite `secret` with a new secret.
    fn fill_secret(&mut self, secret: &mut [u8; COOKIE_SECRET_SIZE]);
}

/// Clock deciding when cookie secrets rotate.
pub trait EpochClock: Send {
    /// Current cookie epoch, or `None` if rotation is disabled.
    ///
    /// Epoch 0 is reserved for "no cookie" and must never be returned.
    fn current_epoch(&self) -> Option<u32>;
}
