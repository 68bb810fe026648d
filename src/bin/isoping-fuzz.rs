//! Deterministic replay harness for the server engine.
//!
//! Reads up to ten packets' worth of bytes from stdin and feeds each
//! 540-byte chunk to a server engine as a datagram from its own client
//! port. Cookie secrets are fixed and never rotate. Handshakes that carry a
//! cookie get a valid one patched in, so inputs reach the session and ack
//! paths instead of stopping at cookie validation.
//!
//! ```text
//! cat crash-input | isoping-fuzz
//! ```

use std::io::{self, IsTerminal, Read};
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::process::ExitCode;

use tracing::{error, info};

use isoping::prelude::*;

/// Most datagrams replayed per run.
const MAX_DATAGRAMS: usize = 10;

/// Source port of the first synthetic client.
const FIRST_CLIENT_PORT: u16 = 40_000;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init()
        .ok();

    let mut input = Vec::with_capacity(MAX_DATAGRAMS * PACKET_SIZE);
    if let Err(e) = io::stdin()
        .take((MAX_DATAGRAMS * PACKET_SIZE) as u64)
        .read_to_end(&mut input)
    {
        error!("reading stdin: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }
    info!("read {} bytes", input.len());

    match replay(&input) {
        Ok(replies) => {
            let datagrams = input.len().div_ceil(PACKET_SIZE);
            info!("replayed {} datagrams, {} replies", datagrams, replies);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Run every chunk of `input` through a fresh server engine. Returns the
/// number of datagrams the server sent.
fn replay(input: &[u8]) -> IsopingResult<usize> {
    let clock = MonotonicClock::new();
    let config = Config::default();
    let printer = Printer::new(config.quiet, None, Box::new(StdoutReport));
    let mut engine = Engine::server(&config, CookieJar::deterministic(), printer);
    let mut sink = RecordingTransmit::new();
    let mut replies = 0;

    for (i, chunk) in input.chunks(PACKET_SIZE).enumerate() {
        let from = client_addr(i);
        let datagram = with_valid_cookie(chunk, from, engine.sessions().cookies());
        let now = clock.now();
        engine.maybe_rotate_cookies(now);
        engine.send_waiting_packets(now, &mut sink)?;
        match engine.read_incoming_packet(&datagram, from, now, &mut sink) {
            Err(e) if !e.is_silent_drop() => return Err(e),
            _ => {}
        }
        replies += sink.take_datagrams().len();
    }
    engine.send_waiting_packets(clock.now(), &mut sink)?;
    Ok(replies + sink.sent.len())
}

fn client_addr(index: usize) -> SocketAddr {
    let port = FIRST_CLIENT_PORT.wrapping_add(index as u16);
    SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, port, 0, 0))
}

/// Re-encode `chunk` with a cookie the server will accept, if it is a
/// handshake that carries one. Anything else is passed through untouched.
fn with_valid_cookie(chunk: &[u8], from: SocketAddr, cookies: &CookieJar) -> Vec<u8> {
    let Ok(mut packet) = Packet::from_bytes(chunk) else {
        return chunk.to_vec();
    };
    let usec_per_pkt = packet.usec_per_pkt;
    match packet.handshake_mut() {
        Some(hs) if hs.has_cookie() => {
            let issued = cookies.issue(usec_per_pkt, from);
            hs.cookie_epoch = issued.cookie_epoch;
            hs.cookie = issued.cookie;
            packet.to_bytes().to_vec()
        }
        _ => chunk.to_vec(),
    }
}
