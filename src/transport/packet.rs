//! Packet encoding and decoding.
//!
//! Packets have exactly the same layout in both directions. All integers are
//! big-endian.
//!
//! ```text
//! offset  size  field
//!      0     4  magic
//!      4     4  id            sequence number, starts at 1, wraps
//!      8     4  txtime        sender's monotonic clock at transmit
//!     12     4  clockdiff     sender's (rx base) - (remote tx base)
//!     16     4  usec_per_pkt  interval between packets
//!     20     4  num_lost      packets the sender expected but never got
//!     24     1  packet_type   0 = ack, 1 = handshake
//!     25     1  first_ack     oldest slot of the ack ring
//!     26     2  padding
//!     28   512  body          64 x (id, rxtime), or a handshake:
//!                               28 version, 32 cookie_epoch, 36 cookie[32]
//! ```

use std::fmt;

use crate::core::{
    ACK_SLOT_SIZE, ACK_SLOTS, COOKIE_SIZE, HEADER_SIZE, MAGIC, NO_COOKIE_EPOCH, PACKET_SIZE,
    PROTOCOL_VERSION, PacketError,
};

use super::acks::{Ack, AckRing};

/// Packet type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Timing packet carrying acknowledgments.
    Ack = 0,
    /// Handshake packet carrying a cookie (or asking for one).
    Handshake = 1,
}

impl PacketType {
    /// Parse packet type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Ack),
            1 => Some(Self::Handshake),
            _ => None,
        }
    }

    /// Convert packet type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Highest protocol version the sender supports.
    pub version: u32,
    /// Epoch of the secret that produced `cookie`; 0 asks for a cookie.
    pub cookie_epoch: u32,
    /// SHA-256 cookie bound to the client's address and packet rate.
    pub cookie: [u8; COOKIE_SIZE],
}

impl Handshake {
    /// Handshake that carries no cookie yet.
    pub fn request() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            cookie_epoch: NO_COOKIE_EPOCH,
            cookie: [0u8; COOKIE_SIZE],
        }
    }

    /// Handshake carrying `cookie` from `cookie_epoch`.
    pub fn with_cookie(cookie_epoch: u32, cookie: [u8; COOKIE_SIZE]) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            cookie_epoch,
            cookie,
        }
    }

    /// Check if this handshake has a cookie.
    pub fn has_cookie(&self) -> bool {
        self.cookie_epoch != NO_COOKIE_EPOCH
    }
}

/// The 512-byte union at the end of every packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    /// Recent receive acknowledgments.
    Acks(AckRing),
    /// Handshake fields.
    Handshake(Handshake),
}

/// A decoded isoping packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number.
    pub id: u32,
    /// Sender's monotonic time at transmit.
    pub txtime: u32,
    /// Sender's estimate of (its rx base) - (our tx base); 0 until known.
    pub clockdiff: u32,
    /// Inter-packet interval in microseconds.
    pub usec_per_pkt: u32,
    /// Sender's self-reported loss count.
    pub num_lost: u32,
    /// Oldest slot of the ack ring.
    pub first_ack: u8,
    /// Acks or handshake.
    pub body: PacketBody,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            id: 0,
            txtime: 0,
            clockdiff: 0,
            usec_per_pkt: 0,
            num_lost: 0,
            first_ack: 0,
            body: PacketBody::Acks(AckRing::new()),
        }
    }
}

impl Packet {
    /// Type discriminator matching the body.
    pub fn packet_type(&self) -> PacketType {
        match self.body {
            PacketBody::Acks(_) => PacketType::Ack,
            PacketBody::Handshake(_) => PacketType::Handshake,
        }
    }

    /// Check if this is a handshake packet.
    pub fn is_handshake(&self) -> bool {
        self.packet_type() == PacketType::Handshake
    }

    /// Handshake payload, if any.
    pub fn handshake(&self) -> Option<&Handshake> {
        match &self.body {
            PacketBody::Handshake(hs) => Some(hs),
            PacketBody::Acks(_) => None,
        }
    }

    /// Mutable handshake payload, if any.
    pub fn handshake_mut(&mut self) -> Option<&mut Handshake> {
        match &mut self.body {
            PacketBody::Handshake(hs) => Some(hs),
            PacketBody::Acks(_) => None,
        }
    }

    /// Serialize to the fixed wire size.
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        put_u32(&mut buf, 0, MAGIC);
        put_u32(&mut buf, 4, self.id);
        put_u32(&mut buf, 8, self.txtime);
        put_u32(&mut buf, 12, self.clockdiff);
        put_u32(&mut buf, 16, self.usec_per_pkt);
        put_u32(&mut buf, 20, self.num_lost);
        buf[24] = self.packet_type().as_byte();
        buf[25] = self.first_ack;

        match &self.body {
            PacketBody::Acks(ring) => {
                for (i, ack) in ring.slots().iter().enumerate() {
                    let at = HEADER_SIZE + i * ACK_SLOT_SIZE;
                    put_u32(&mut buf, at, ack.id);
                    put_u32(&mut buf, at + 4, ack.rxtime);
                }
            }
            PacketBody::Handshake(hs) => {
                put_u32(&mut buf, HEADER_SIZE, hs.version);
                put_u32(&mut buf, HEADER_SIZE + 4, hs.cookie_epoch);
                buf[HEADER_SIZE + 8..HEADER_SIZE + 8 + COOKIE_SIZE].copy_from_slice(&hs.cookie);
            }
        }
        buf
    }

    /// Parse a received datagram.
    ///
    /// Anything that is not exactly one packet with the right magic and a
    /// known type is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() != PACKET_SIZE {
            return Err(PacketError::bad_length(bytes.len()));
        }

        let magic = get_u32(bytes, 0);
        if magic != MAGIC {
            return Err(PacketError::BadMagic(magic));
        }

        let packet_type = PacketType::from_byte(bytes[24]).ok_or(PacketError::UnknownType(bytes[24]))?;
        let first_ack = bytes[25];

        let body = match packet_type {
            PacketType::Ack => {
                let mut slots = [Ack::default(); ACK_SLOTS];
                for (i, slot) in slots.iter_mut().enumerate() {
                    let at = HEADER_SIZE + i * ACK_SLOT_SIZE;
                    *slot = Ack {
                        id: get_u32(bytes, at),
                        rxtime: get_u32(bytes, at + 4),
                    };
                }
                PacketBody::Acks(AckRing::from_slots(slots, first_ack))
            }
            PacketType::Handshake => {
                let mut cookie = [0u8; COOKIE_SIZE];
                cookie.copy_from_slice(&bytes[HEADER_SIZE + 8..HEADER_SIZE + 8 + COOKIE_SIZE]);
                PacketBody::Handshake(Handshake {
                    version: get_u32(bytes, HEADER_SIZE),
                    cookie_epoch: get_u32(bytes, HEADER_SIZE + 4),
                    cookie,
                })
            }
        };

        Ok(Self {
            id: get_u32(bytes, 4),
            txtime: get_u32(bytes, 8),
            clockdiff: get_u32(bytes, 12),
            usec_per_pkt: get_u32(bytes, 16),
            num_lost: get_u32(bytes, 20),
            first_ack,
            body,
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} usec_per_pkt={} txtime={} clockdiff={} num_lost={} first_ack={} type={:?}",
            self.id,
            self.usec_per_pkt,
            self.txtime,
            self.clockdiff as i32,
            self.num_lost,
            self.first_ack,
            self.packet_type(),
        )?;
        match &self.body {
            PacketBody::Handshake(hs) => write!(
                f,
                " version={} cookie_epoch={} cookie={}",
                hs.version,
                hs.cookie_epoch,
                hex::encode(hs.cookie)
            ),
            PacketBody::Acks(ring) => {
                for ack in ring.iter_from(self.first_ack) {
                    write!(f, " ack(id={} rxtime={})", ack.id, ack.rxtime)?;
                }
                Ok(())
            }
        }
    }
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
