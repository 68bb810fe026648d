//! Error types for isoping.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::constants::{EXIT_CONNECTION_REFUSED, EXIT_FAILURE, EXIT_USAGE, PACKET_SIZE};

/// Errors decoding a received datagram.
///
/// A UDP service exposed to arbitrary traffic sees these all the time; they
/// are logged and the datagram is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Datagram is not exactly one packet long.
    #[error("invalid packet length {actual} (expected {expected})")]
    BadLength {
        /// Required length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// Magic number mismatch.
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    /// Unknown packet type discriminator.
    #[error("unknown packet type {0}")]
    UnknownType(u8),
}

impl PacketError {
    /// Length error for a datagram of `actual` bytes.
    pub fn bad_length(actual: usize) -> Self {
        PacketError::BadLength {
            expected: PACKET_SIZE,
            actual,
        }
    }
}

/// Invalid command line settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// `-f` must be positive.
    #[error("lines per second must be > 0 (got {0})")]
    PrintsPerSec(f64),

    /// `-r` out of range.
    #[error("packets per sec (-r) must be 0.001..1000000 (got {0})")]
    PacketsPerSec(f64),

    /// `-t` must be at least 1.
    #[error("ttl must be >= 1 (got {0})")]
    Ttl(u32),
}

/// Top-level isoping errors.
#[derive(Debug, Error)]
pub enum IsopingError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed or foreign datagram.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Name resolution failed.
    #[error("getaddrinfo({host}): {source}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Name resolved to nothing usable.
    #[error("getaddrinfo({0}): no usable address")]
    NoAddress(String),

    /// The server is gone: our packets are being refused.
    #[error("connection refused by server")]
    ConnectionRefused,

    /// A data packet arrived from a peer with no session.
    #[error("no session for {0}")]
    NoSession(SocketAddr),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl IsopingError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            IsopingError::Config(_) => EXIT_USAGE,
            IsopingError::ConnectionRefused => EXIT_CONNECTION_REFUSED,
            _ => EXIT_FAILURE,
        }
    }

    /// Check if this error only concerns a single datagram, which is dropped
    /// while the main loop carries on.
    pub fn is_silent_drop(&self) -> bool {
        matches!(self, IsopingError::Packet(_) | IsopingError::NoSession(_))
    }
}

/// Result type for isoping operations.
pub type IsopingResult<T> = Result<T, IsopingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(IsopingError::Config(ConfigError::Ttl(0)).exit_code(), 99);
        assert_eq!(IsopingError::ConnectionRefused.exit_code(), 2);
        assert_eq!(
            IsopingError::Io(io::Error::new(io::ErrorKind::AddrInUse, "bind")).exit_code(),
            1
        );
        assert_eq!(IsopingError::NoAddress("nowhere".into()).exit_code(), 1);
    }

    #[test]
    fn test_silent_drop_errors() {
        assert!(IsopingError::Packet(PacketError::BadMagic(0)).is_silent_drop());
        assert!(IsopingError::NoSession("[::1]:1".parse().unwrap()).is_silent_drop());

        assert!(!IsopingError::ConnectionRefused.is_silent_drop());
        assert!(!IsopingError::Io(io::Error::other("test")).is_silent_drop());
    }

    #[test]
    fn test_bad_length_message() {
        let e = PacketError::bad_length(12);
        assert_eq!(e.to_string(), "invalid packet length 12 (expected 540)");
    }
}
