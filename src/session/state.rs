//! Per-peer session state.

use std::net::SocketAddr;

use tracing::debug;

use crate::core::COOKIE_SIZE;
use crate::transport::{AckRing, Packet};

use super::stats::LatencyStats;

/// Handshake progress.
///
/// Clients walk through every state; the server only ever stores
/// `Established` sessions, since it keeps no state before a cookie
/// validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Nothing sent yet.
    NewSession,
    /// Cookie requested, waiting for the server's reply.
    HandshakeRequested,
    /// Cookie received; echoing it back until the server starts acking.
    CookieGenerated,
    /// Timing packets flowing in both directions.
    Established,
}

/// State for one remote peer.
///
/// WARNING: the timestamp and id arithmetic below relies on wrapping u32
/// math. Always compare through [`diff`](crate::transport::diff).
#[derive(Debug, Clone)]
pub struct Session {
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Microseconds between our transmissions.
    pub usec_per_pkt: u32,
    /// Minimum microseconds between report lines (0 = no limit).
    pub usec_per_print: u32,
    /// Handshake progress.
    pub handshake_state: HandshakeState,
    /// Client handshake retransmissions so far.
    pub handshake_retry_count: u32,
    /// Cookie to echo back while handshaking, as (epoch, cookie).
    pub cookie: Option<(u32, [u8; COOKIE_SIZE])>,

    /// Id of our next transmission.
    pub next_tx_id: u32,
    /// Id we expect to receive next; 0 until the first packet.
    pub next_rx_id: u32,
    /// Lowest of our ids we still expect to see acked.
    pub next_rxack_id: u32,
    /// Remote tx clock at the virtual moment id 0 was sent.
    pub start_rtxtime: u32,
    /// Local rx clock at the virtual moment id 0 arrived.
    pub start_rxtime: u32,
    /// Local time the last packet arrived.
    pub last_rxtime: u32,
    /// Smallest rxdiff seen this cycle.
    pub min_cycle_rxdiff: i32,
    /// Local time the current cycle ends.
    pub next_cycle: u32,
    /// Local time of our next transmission.
    pub next_send: u32,
    /// Gaps seen in the peer's id sequence.
    pub num_lost: u32,

    /// Last packet we sent.
    pub tx: Packet,
    /// Last packet we received.
    pub rx: Packet,
    /// Packets we received, to echo back in our next transmissions.
    pub acks: AckRing,

    /// Local time of the last report line.
    pub last_print: u32,
    /// Pending tx latency text, printed with the next rx line.
    pub last_ackinfo: String,
    /// Our packets' one-way latency.
    pub lat_tx: LatencyStats,
    /// Peer packets' one-way latency.
    pub lat_rx: LatencyStats,
}

impl Session {
    /// New session whose first transmission is due at `first_send`.
    pub fn new(
        first_send: u32,
        usec_per_pkt: u32,
        usec_per_print: u32,
        remote_addr: SocketAddr,
    ) -> Self {
        debug!("handshake state for {}: NewSession", remote_addr);
        Self {
            remote_addr,
            usec_per_pkt,
            usec_per_print,
            handshake_state: HandshakeState::NewSession,
            handshake_retry_count: 0,
            cookie: None,
            next_tx_id: 1,
            next_rx_id: 0,
            next_rxack_id: 0,
            start_rtxtime: 0,
            start_rxtime: 0,
            last_rxtime: 0,
            min_cycle_rxdiff: 0,
            next_cycle: 0,
            next_send: first_send,
            num_lost: 0,
            tx: Packet::default(),
            rx: Packet::default(),
            acks: AckRing::new(),
            last_print: first_send.wrapping_sub(usec_per_pkt),
            last_ackinfo: String::new(),
            lat_tx: LatencyStats::new(),
            lat_rx: LatencyStats::new(),
        }
    }

    /// Check if timing packets are flowing.
    pub fn is_established(&self) -> bool {
        self.handshake_state == HandshakeState::Established
    }

    /// Move to `state`, logging the transition.
    pub fn set_handshake_state(&mut self, state: HandshakeState) {
        if self.handshake_state != state {
            debug!(
                "handshake state for {}: {:?} -> {:?}",
                self.remote_addr, self.handshake_state, state
            );
            self.handshake_state = state;
        }
    }

    /// The final `tx:`/`rx:` summary lines.
    pub fn summary_lines(&self) -> [String; 2] {
        [
            format!("tx: min/avg/max/mdev = {}", self.lat_tx.summary()),
            format!("rx: min/avg/max/mdev = {}", self.lat_rx.summary()),
        ]
    }
}
