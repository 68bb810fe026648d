//! In-memory transmitter.
//!
//! Stands in for the socket when the engine is driven directly: the replay
//! harness and the engine tests read back what would have been sent.

use std::io;
use std::net::SocketAddr;

use crate::core::Transmit;

use super::packet::Packet;

/// Records every datagram instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransmit {
    /// Datagrams in send order, with their destination.
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
    refuse: bool,
}

impl RecordingTransmit {
    /// Transmitter that records everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transmitter that fails every send with `ConnectionRefused`, like a
    /// connected socket whose server has gone away.
    pub fn refusing() -> Self {
        Self {
            sent: Vec::new(),
            refuse: true,
        }
    }

    /// Remove and decode everything recorded so far. Undecodable datagrams
    /// are skipped.
    pub fn take_packets(&mut self) -> Vec<(Packet, SocketAddr)> {
        self.sent
            .drain(..)
            .filter_map(|(bytes, to)| Packet::from_bytes(&bytes).ok().map(|p| (p, to)))
            .collect()
    }

    /// Remove everything recorded so far, undecoded.
    pub fn take_datagrams(&mut self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.sent)
    }
}

impl Transmit for RecordingTransmit {
    fn transmit(&mut self, packet: &[u8], to: SocketAddr) -> io::Result<()> {
        if self.refuse {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        self.sent.push((packet.to_vec(), to));
        Ok(())
    }
}
