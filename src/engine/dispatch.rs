//! Event dispatch over the session table.

use std::net::SocketAddr;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::core::{
    FIRST_SEND_DELAY_USEC, IsopingError, IsopingResult, SESSION_TIMEOUT_USEC, Transmit,
};
use crate::session::{CookieJar, HandshakeState, Sessions};
use crate::transport::{AckRing, Packet, PacketBody, diff};

use super::handlers::{
    handle_ack_packet, prepare_handshake_reply_packet, prepare_tx_packet, send_packet,
};
use super::report::Printer;

/// One end of the measurement: the session table plus what the handlers
/// need to know about us.
///
/// The engine never reads a clock or a socket itself. Callers pass the
/// current time and a [`Transmit`] into every event, so the same code runs
/// under the event loop, the replay harness and the tests.
#[derive(Debug)]
pub struct Engine {
    sessions: Sessions,
    printer: Printer,
    is_server: bool,
    max_packets_per_sec: f64,
    usec_per_print: u32,
}

impl Engine {
    /// Server engine. Sessions appear as clients complete the handshake;
    /// `config.packets_per_sec` is the highest rate a client may use.
    pub fn server(config: &Config, cookies: CookieJar, printer: Printer) -> Self {
        Self {
            sessions: Sessions::new(cookies),
            printer,
            is_server: true,
            max_packets_per_sec: config.packets_per_sec,
            usec_per_print: config.usec_per_print(),
        }
    }

    /// Client engine with one session to `server`, whose first handshake
    /// is due at `first_send`.
    pub fn client(config: &Config, server: SocketAddr, first_send: u32, printer: Printer) -> Self {
        let mut sessions = Sessions::new(CookieJar::random());
        sessions.new_session(
            first_send,
            config.usec_per_pkt(),
            config.usec_per_print(),
            server,
        );
        Self {
            sessions,
            printer,
            is_server: false,
            max_packets_per_sec: config.packets_per_sec,
            usec_per_print: config.usec_per_print(),
        }
    }

    /// Check if this is the server end.
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// The session table.
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// When the next transmission is due, if any is scheduled.
    pub fn next_send_time(&mut self) -> Option<u32> {
        self.sessions.next_send_time()
    }

    /// Rotate the server's cookie secrets when their epoch ends.
    pub fn maybe_rotate_cookies(&mut self, now: u32) {
        if self.is_server {
            self.sessions.cookies_mut().maybe_rotate(now);
        }
    }

    /// Send every packet due by `now`, rescheduling each session after its
    /// send. Server sessions idle for too long are dropped instead.
    pub fn send_waiting_packets<T: Transmit>(&mut self, now: u32, tx: &mut T) -> IsopingResult<()> {
        while let Some(addr) = self.sessions.pop_due(now) {
            let Some(s) = self.sessions.get_mut(&addr) else {
                continue;
            };
            prepare_tx_packet(s);
            send_packet(s, tx, self.is_server)?;
            let idle = diff(now, s.last_rxtime);
            if self.is_server && idle > SESSION_TIMEOUT_USEC {
                info!("client {} disconnected", addr);
                self.sessions.remove(&addr);
            } else {
                self.sessions.schedule(addr);
            }
        }
        Ok(())
    }

    /// Decode and handle one datagram from `from`, received at `now`.
    ///
    /// Undecodable datagrams and data packets from peers without a session
    /// come back as errors for which
    /// [`is_silent_drop`](IsopingError::is_silent_drop) holds.
    pub fn read_incoming_packet<T: Transmit>(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
        now: u32,
        tx: &mut T,
    ) -> IsopingResult<()> {
        let rx = Packet::from_bytes(bytes).inspect_err(|e| {
            warn!("dropping packet from {}: {}", from, e);
        })?;
        trace!("received from {}: {}", from, rx);

        if self.is_server {
            if self.sessions.get(&from).is_none() && !rx.is_handshake() {
                // TODO: answer with a fresh cookie so a client we evicted
                // can renegotiate instead of timing out.
                warn!("received non-handshake packet from unknown client {}", from);
                return Err(IsopingError::NoSession(from));
            }
        } else if self.sessions.is_empty() {
            warn!("no session configured for {} when receiving packet", from);
            return Err(IsopingError::NoSession(from));
        }
        self.handle_packet(rx, from, now, tx)
    }

    /// Route a decoded packet to the handshake or data handler.
    pub fn handle_packet<T: Transmit>(
        &mut self,
        rx: Packet,
        from: SocketAddr,
        now: u32,
        tx: &mut T,
    ) -> IsopingResult<()> {
        if rx.is_handshake() {
            if self.is_server {
                self.handle_new_client_handshake_packet(rx, from, now, tx);
            } else {
                self.handle_server_handshake_packet(&rx, now);
            }
            return Ok(());
        }

        let is_server = self.is_server;
        let session = if is_server {
            self.sessions.get_mut(&from)
        } else {
            self.sessions.first_mut()
        };
        let Some(s) = session else {
            return Err(IsopingError::NoSession(from));
        };
        s.rx = rx;
        if !is_server && s.handshake_state == HandshakeState::CookieGenerated {
            // The server accepted us; start tracking acks from scratch.
            debug!("ack from server on new connection");
            s.set_handshake_state(HandshakeState::Established);
            s.acks.clear();
        }
        if !s.is_established() {
            debug!(
                "ignoring data packet from {} in state {:?}",
                from, s.handshake_state
            );
            return Ok(());
        }
        handle_ack_packet(s, now, &mut self.printer);
        Ok(())
    }

    /// Server side of the handshake.
    ///
    /// A request without a cookie gets a cookie back and leaves no state
    /// behind. A valid returned cookie creates (or keeps) the session and
    /// its first timing packet is processed like any other; an invalid one
    /// is dropped.
    pub fn handle_new_client_handshake_packet<T: Transmit>(
        &mut self,
        rx: Packet,
        from: SocketAddr,
        now: u32,
        tx: &mut T,
    ) {
        let Some(hs) = rx.handshake() else {
            return;
        };
        debug!(
            "server received handshake packet from {}; cookie epoch={}",
            from, hs.cookie_epoch
        );

        if !hs.has_cookie() {
            self.sessions.remove(&from);
            info!("new connection from {}, sending cookie", from);
            let mut reply = prepare_handshake_reply_packet(&rx, now, self.max_packets_per_sec);
            let cookie = self.sessions.cookies().issue(reply.usec_per_pkt, from);
            reply.body = PacketBody::Handshake(cookie);
            if let Err(e) = tx.transmit(&reply.to_bytes(), from) {
                warn!("sendto {}: {}", from, e);
            }
            return;
        }

        if rx.usec_per_pkt == 0 {
            debug!("ignoring handshake from {} with zero packet interval", from);
            return;
        }
        if !self.sessions.cookies().validate(hs, rx.usec_per_pkt, from) {
            return;
        }
        info!("new client connection: {}", from);
        let s = self.sessions.new_session(
            now.wrapping_add(FIRST_SEND_DELAY_USEC),
            rx.usec_per_pkt,
            self.usec_per_print,
            from,
        );
        s.set_handshake_state(HandshakeState::Established);
        // We haven't sent this client anything, so it can't have acked
        // anything either.
        s.rx = Packet {
            body: PacketBody::Acks(AckRing::new()),
            ..rx
        };
        handle_ack_packet(s, now, &mut self.printer);
    }

    /// Client side of the handshake: store the server's cookie, adopt the
    /// packet rate it granted, and send immediately.
    pub fn handle_server_handshake_packet(&mut self, rx: &Packet, now: u32) {
        let Some(s) = self.sessions.first_mut() else {
            return;
        };
        let addr = s.remote_addr;
        if !matches!(
            s.handshake_state,
            HandshakeState::HandshakeRequested | HandshakeState::CookieGenerated
        ) {
            debug!(
                "ignoring handshake from {} in state {:?}",
                addr, s.handshake_state
            );
            return;
        }
        let Some(hs) = rx.handshake().filter(|hs| hs.has_cookie()) else {
            warn!("handshake reply from {} carries no cookie", addr);
            return;
        };
        if rx.usec_per_pkt == 0 {
            warn!("handshake reply from {} has a zero packet interval", addr);
            return;
        }

        s.cookie = Some((hs.cookie_epoch, hs.cookie));
        if rx.usec_per_pkt != s.usec_per_pkt {
            warn!(
                "server overrode packets per second to {}",
                1e6 / f64::from(rx.usec_per_pkt)
            );
            s.usec_per_pkt = rx.usec_per_pkt;
        }
        debug!(
            "received cookie from {}: epoch={} cookie={}; next_send={} (was {})",
            addr,
            hs.cookie_epoch,
            hex::encode(hs.cookie),
            now,
            s.next_send
        );
        s.set_handshake_state(HandshakeState::CookieGenerated);
        s.next_send = now;
        // Replaces the pending handshake retry.
        self.sessions.schedule(addr);
    }

    /// Print the client's final latency summary.
    pub fn print_summary(&mut self) {
        if self.is_server {
            return;
        }
        let Some(s) = self.sessions.first() else {
            return;
        };
        let [tx, rx] = s.summary_lines();
        for line in ["", "---", &tx, &rx, ""] {
            self.printer.plain(line);
        }
    }
}
