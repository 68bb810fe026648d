//! Protocol constants for isoping.
//!
//! Wire-visible values (magic, sizes, port) are fixed by the protocol and
//! MUST NOT be changed, or old and new peers stop understanding each other.

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Magic number at the start of every packet ("BLIP" variant).
pub const MAGIC: u32 = 0x424c_4950;

/// Highest protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default UDP port the server listens on.
pub const SERVER_PORT: u16 = 4948;

/// Number of (id, rxtime) slots in the acknowledgment ring.
pub const ACK_SLOTS: usize = 64;

/// Size of one acknowledgment slot on the wire.
pub const ACK_SLOT_SIZE: usize = 8;

/// Fixed header: magic, id, txtime, clockdiff, usec_per_pkt, num_lost,
/// packet_type, first_ack, two padding bytes.
pub const HEADER_SIZE: usize = 6 * 4 + 1 + 1 + 2;

/// Size of the handshake/acks union.
pub const BODY_SIZE: usize = ACK_SLOTS * ACK_SLOT_SIZE;

/// Every isoping datagram is exactly this long.
pub const PACKET_SIZE: usize = HEADER_SIZE + BODY_SIZE;

// =============================================================================
// HANDSHAKE COOKIES
// =============================================================================

/// Cookie length (a SHA-256 digest).
pub const COOKIE_SIZE: usize = 32;

/// Length of the random secret mixed into every cookie.
pub const COOKIE_SECRET_SIZE: usize = 16;

/// Cookie epoch value meaning "no cookie yet".
pub const NO_COOKIE_EPOCH: u32 = 0;

/// Minimum time between checks for a new cookie epoch (server only).
pub const COOKIE_ROTATION_CHECK_USEC: u32 = 1_000_000;

/// Unix seconds are shifted right by this much to form a cookie epoch
/// (one epoch every 64 seconds).
pub const COOKIE_EPOCH_SHIFT: u32 = 6;

// =============================================================================
// TIMING (all in microseconds of the local monotonic clock)
// =============================================================================

/// Default packets per second in each direction.
pub const DEFAULT_PACKETS_PER_SEC: f64 = 10.0;

/// Accepted range for the packets-per-second flag.
pub const MIN_PACKETS_PER_SEC: f64 = 0.001;

/// Accepted range for the packets-per-second flag.
pub const MAX_PACKETS_PER_SEC: f64 = 1e6;

/// Default IP TTL; kept low so a misconfigured target cannot be flooded
/// across the internet.
pub const DEFAULT_TTL: u32 = 2;

/// Window over which the calibration between local and remote clocks is
/// trusted before the receive baseline is re-anchored.
///
/// Some devices skew by more than 1ms/minute, so this is short.
pub const USEC_PER_CYCLE: u32 = 10 * 1000 * 1000;

/// A packet arriving more than this much earlier than predicted means the
/// calibration was based on a slow packet and must be rebased.
pub const TIME_PARADOX_USEC: i32 = -20;

/// Initial client handshake retransmission timeout.
pub const HANDSHAKE_TIMEOUT_USEC: u32 = 1_000_000;

/// Handshake backoff stops doubling after this many retries.
pub const HANDSHAKE_MAX_BACKOFF_SHIFT: u32 = 10;

/// The server evicts a client after this long without a received packet.
pub const SESSION_TIMEOUT_USEC: i32 = 60 * 1000 * 1000;

/// Delay between a client's validated handshake and the server's first
/// timing packet to it.
pub const FIRST_SEND_DELAY_USEC: u32 = 10 * 1000;

/// Sentinel for "no packet seen yet this cycle".
pub const CYCLE_RXDIFF_SENTINEL: i32 = i32::MAX;

/// Exit status for usage and argument errors.
pub const EXIT_USAGE: u8 = 99;

/// Exit status when the client sees the server refuse connections.
pub const EXIT_CONNECTION_REFUSED: u8 = 2;

/// Exit status for other socket and setup failures.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status when a second SIGINT arrives during shutdown (128 + SIGINT).
pub const EXIT_SECOND_SIGINT: u8 = 130;
