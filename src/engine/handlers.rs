//! Per-session packet handlers.
//!
//! These advance one [`Session`] on a timer or network event. They never
//! touch the session table; the [`Engine`](super::Engine) looks sessions up
//! and calls in here.
//!
//! # Clock model
//!
//! Both ends send isochronously: packet `id` leaves at
//! `start_txtime + id * usec_per_pkt` on the sender's clock. The receiver
//! keeps an anchor `(start_rtxtime, start_rxtime)`, the virtual send and
//! arrival of id 0, and measures how late each packet arrives against it.
//! Each side also reports `clockdiff = start_rxtime - start_rtxtime`, so
//! adding both sides' values cancels the unknown clock offset and leaves the
//! round-trip time.

use std::io;

use tracing::{debug, info, trace, warn};

use crate::core::{
    CYCLE_RXDIFF_SENTINEL, HANDSHAKE_MAX_BACKOFF_SHIFT, HANDSHAKE_TIMEOUT_USEC, IsopingError,
    IsopingResult, TIME_PARADOX_USEC, Transmit, USEC_PER_CYCLE,
};
use crate::session::{HandshakeState, Session};
use crate::transport::{Ack, Handshake, Packet, PacketBody, diff};

use super::report::Printer;

/// Fill in `s.tx` for the next transmission and consume a sequence id.
///
/// Until the session is established the body carries the handshake (with
/// the server's cookie once we have one); afterwards it carries our ack
/// ring.
pub fn prepare_tx_packet(s: &mut Session) {
    s.tx.id = s.next_tx_id;
    s.next_tx_id = s.next_tx_id.wrapping_add(1);
    s.tx.usec_per_pkt = s.usec_per_pkt;
    s.tx.txtime = s.next_send;
    s.tx.clockdiff = if s.start_rtxtime != 0 {
        s.start_rxtime.wrapping_sub(s.start_rtxtime)
    } else {
        0
    };
    s.tx.num_lost = s.num_lost;
    s.tx.first_ack = s.acks.next_index();
    s.tx.body = if s.is_established() {
        PacketBody::Acks(s.acks.clone())
    } else {
        PacketBody::Handshake(match s.cookie {
            Some((epoch, cookie)) => Handshake::with_cookie(epoch, cookie),
            None => Handshake::request(),
        })
    };
    trace!("prepared packet for {}: {}", s.remote_addr, s.tx);
}

/// Build the server's stateless reply to a cookie request.
///
/// The reply echoes the request id, rate-limits the client to `max_pps`
/// and reports `now - rx.txtime` as its clockdiff. The caller adds the
/// cookie.
pub fn prepare_handshake_reply_packet(rx: &Packet, now: u32, max_pps: f64) -> Packet {
    let floor = (1e6 / max_pps) as u32;
    Packet {
        id: rx.id,
        txtime: now,
        clockdiff: now.wrapping_sub(rx.txtime),
        usec_per_pkt: rx.usec_per_pkt.max(floor),
        num_lost: 0,
        first_ack: 0,
        body: PacketBody::Handshake(Handshake::request()),
    }
}

/// Transmit `s.tx` and schedule the session's next send.
///
/// Established sessions (and every server session) advance by one packet
/// interval. A client still waiting for a cookie backs off exponentially
/// and reuses the sequence id on the retry.
///
/// Only a client's `ConnectionRefused` is returned as an error; other
/// transmit failures are logged, since UDP may drop the packet anyway.
pub fn send_packet<T: Transmit>(s: &mut Session, tx: &mut T, is_server: bool) -> IsopingResult<()> {
    let bytes = s.tx.to_bytes();
    if let Err(e) = tx.transmit(&bytes, s.remote_addr) {
        if is_server {
            warn!("sendto {}: {}", s.remote_addr, e);
        } else {
            warn!("send: {}", e);
            if e.kind() == io::ErrorKind::ConnectionRefused {
                return Err(IsopingError::ConnectionRefused);
            }
        }
    }

    if is_server
        || matches!(
            s.handshake_state,
            HandshakeState::Established | HandshakeState::CookieGenerated
        )
    {
        s.next_send = s.next_send.wrapping_add(s.usec_per_pkt);
    } else {
        if s.handshake_state == HandshakeState::NewSession {
            s.set_handshake_state(HandshakeState::HandshakeRequested);
            s.handshake_retry_count = 0;
        } else {
            s.handshake_retry_count = s.handshake_retry_count.saturating_add(1);
        }
        let shift = s.handshake_retry_count.min(HANDSHAKE_MAX_BACKOFF_SHIFT);
        let timeout = HANDSHAKE_TIMEOUT_USEC << shift;
        debug!(
            "handshake retry {} to {}, next in {} usec",
            s.handshake_retry_count, s.remote_addr, timeout
        );
        s.next_send = s.next_send.wrapping_add(timeout);
        // Handshakes don't take a slot in the id sequence.
        s.next_tx_id = s.next_tx_id.wrapping_sub(1);
    }
    Ok(())
}

/// Process the timing data in `s.rx`, received at local time `now`.
///
/// Updates the clock anchor, loss counters and latency statistics, queues
/// the packet for acking, and accounts for every newly acked packet of
/// ours. Report lines go to `out`.
pub fn handle_ack_packet(s: &mut Session, now: u32, out: &mut Printer) {
    let upp = s.usec_per_pkt;
    let id = s.rx.id;
    let rxtime = now;

    if s.next_rx_id == 0 {
        // Initial anchor estimate; corrected below as packets arrive early
        // and once per cycle for drift.
        s.start_rtxtime = s.rx.txtime.wrapping_sub(id.wrapping_mul(upp));
        s.start_rxtime = rxtime.wrapping_sub(id.wrapping_mul(upp));
        s.min_cycle_rxdiff = 0;
        s.next_rx_id = id;
        s.next_cycle = now.wrapping_add(USEC_PER_CYCLE);
    }

    // Loss is counted from sequence gaps, not from acks: during an outage
    // the ack ring can forget packets that did arrive.
    let gap = diff(id, s.next_rx_id);
    if gap > 0 {
        warn!("lost {}  expected={}  got={}", gap, s.next_rx_id, id);
        s.num_lost = s.num_lost.wrapping_add(gap as u32);
        s.next_rx_id = s.next_rx_id.wrapping_add(gap as u32).wrapping_add(1);
    } else if gap == 0 {
        s.next_rx_id = s.next_rx_id.wrapping_add(1);
    } else {
        warn!("out-of-order packets? {}", gap);
    }

    let expected = |start: u32| start.wrapping_add(id.wrapping_mul(upp));
    let early = diff(rxtime, expected(s.start_rxtime));
    if early < TIME_PARADOX_USEC {
        warn!("time paradox: backsliding start by {} usec", early);
        s.start_rxtime = rxtime.wrapping_sub(id.wrapping_mul(upp));
    }
    let rxdiff = diff(rxtime, expected(s.start_rxtime));
    trace!(
        "ack: rxdiff={}, rxtime={}, start_rxtime={}, id={}, usec_per_pkt={}",
        rxdiff, rxtime, s.start_rxtime, id, upp
    );

    // Our clockdiff is offset + rtt/2, the peer's is rtt/2 - offset. Their
    // sum is the rtt; offset falls out of ours without dividing a value
    // that may have lost its high bit.
    let clockdiff = diff(s.start_rxtime, s.start_rtxtime);
    let rtt = clockdiff.wrapping_add(s.rx.clockdiff as i32);
    let half_rtt = rtt / 2;
    let offset = clockdiff.wrapping_sub(half_rtt);
    if s.rx.clockdiff == 0 {
        // The peer can't compute a clockdiff before hearing from us, so this
        // sample is meaningless. Print the next one.
        s.last_print = now.wrapping_sub(s.usec_per_print).wrapping_add(1);
    } else {
        s.lat_rx.record(rxdiff.wrapping_add(half_rtt));
    }
    trace!(
        "ack packet: rx id={}, clockdiff={}, rtt={}, offset={}, rxdiff={}",
        id, clockdiff, rtt, offset, rxdiff
    );

    // After a dropout the first packet through prints, which is usually the
    // worst one.
    if !out.is_quiet() && diff(now, s.last_print) >= s.usec_per_print as i32 {
        let line = format!(
            "{:>12}  {:6.1} ms rx  (min={:.1})  loss: {}/{} tx  {}/{} rx",
            s.last_ackinfo,
            f64::from(rxdiff.wrapping_add(half_rtt)) / 1000.0,
            f64::from(half_rtt) / 1000.0,
            s.rx.num_lost,
            i64::from(s.next_tx_id) - 1,
            s.num_lost,
            i64::from(s.next_rx_id) - 1,
        );
        out.packet_line(rxtime, &line);
        s.last_ackinfo.clear();
        s.last_print = now;
    }

    if rxdiff < s.min_cycle_rxdiff {
        s.min_cycle_rxdiff = rxdiff;
    }
    if diff(now, s.next_cycle) >= 0 {
        if s.min_cycle_rxdiff > 0 {
            info!("clock skew: sliding start by {} usec", s.min_cycle_rxdiff);
            s.start_rxtime = s.start_rxtime.wrapping_add(s.min_cycle_rxdiff as u32);
        }
        s.min_cycle_rxdiff = CYCLE_RXDIFF_SENTINEL;
        s.next_cycle = s.next_cycle.wrapping_add(USEC_PER_CYCLE);
    }

    s.acks.push(id, rxtime);

    let acked: Vec<Ack> = match &s.rx.body {
        PacketBody::Acks(ring) => ring.iter_from(s.rx.first_ack).collect(),
        PacketBody::Handshake(_) => Vec::new(),
    };
    for ack in acked {
        if diff(ack.id, s.next_rxack_id) < 0 {
            continue;
        }
        let start_txtime = s.next_send.wrapping_sub(s.next_tx_id.wrapping_mul(upp));
        let txtime = start_txtime.wrapping_add(ack.id.wrapping_mul(upp));
        // In our clock; already includes rtt/2, unlike rxdiff.
        let rxtime = ack.rxtime.wrapping_add(offset as u32);
        let txdiff = diff(rxtime, txtime);
        trace!(
            "ackid={} txdiff={} rxtime={} txtime={} offset={} start_txtime={}",
            ack.id, txdiff, rxtime, txtime, offset, start_txtime
        );
        // Without a print limit every acked packet gets its own line.
        if !out.is_quiet() && s.usec_per_print == 0 && !s.last_ackinfo.is_empty() {
            let line = format!("{:>12}", s.last_ackinfo);
            out.packet_line(rxtime, &line);
            s.last_ackinfo.clear();
        }
        if s.last_ackinfo.is_empty() {
            s.last_ackinfo = format!("{:6.1} ms tx", f64::from(txdiff) / 1000.0);
        }
        s.next_rxack_id = ack.id.wrapping_add(1);
        s.lat_tx.record(txdiff);
    }

    s.last_rxtime = now;
}
