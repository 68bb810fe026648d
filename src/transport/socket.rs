//! UDP socket setup for isoping.
//!
//! A single dual-stack IPv6 socket serves both roles: the server binds the
//! well-known port and answers any peer, the client binds an ephemeral port
//! and connects to the server so refused packets surface as errors.

use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::core::{IsopingError, IsopingResult, Transmit};

/// Async UDP socket wrapper for isoping.
#[derive(Debug)]
pub struct IsopingSocket {
    /// The underlying UDP socket, registered with the runtime for receiving.
    socket: UdpSocket,
    /// Second handle on the same socket for synchronous sends, which must not
    /// wait for the runtime to report writability.
    sender: Socket,
    /// Server address for a connected (client) socket.
    peer: Option<SocketAddr>,
}

impl IsopingSocket {
    /// Bind a server socket on all interfaces at `port`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(port: u16, ttl: u32) -> IsopingResult<Self> {
        let sock = new_dual_stack_socket(ttl)?;
        let listen = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));
        sock.bind(&listen.into())?;
        let sender = sock.try_clone()?;
        let socket = into_tokio(sock)?;
        let local = socket.local_addr()?;
        info!("server listening at [{}]:{}", local.ip(), local.port());
        Ok(Self {
            socket,
            sender,
            peer: None,
        })
    }

    /// Create a client socket connected to `remote`.
    pub fn connect(remote: SocketAddr, ttl: u32) -> IsopingResult<Self> {
        let remote = to_v6(remote);
        let sock = new_dual_stack_socket(ttl)?;
        let any = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));
        sock.bind(&any.into())?;
        info!("connecting to {}...", remote.ip());
        sock.connect(&remote.into())?;
        let sender = sock.try_clone()?;
        let socket = into_tokio(sock)?;
        Ok(Self {
            socket,
            sender,
            peer: Some(remote),
        })
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Connected server address, for client sockets.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Receive one datagram and return its sender.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

impl Transmit for IsopingSocket {
    fn transmit(&mut self, packet: &[u8], to: SocketAddr) -> io::Result<()> {
        let sent = match self.peer {
            Some(_) => self.sender.send(packet)?,
            None => self.sender.send_to(packet, &to.into())?,
        };
        if sent != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", packet.len()),
            ));
        }
        Ok(())
    }
}

/// Resolve `host` to the first usable address, as an IPv6 (possibly
/// v4-mapped) socket address.
pub async fn resolve(host: &str, port: u16) -> IsopingResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| IsopingError::Resolve {
            host: host.to_string(),
            source,
        })?;
    addrs
        .next()
        .map(to_v6)
        .ok_or_else(|| IsopingError::NoAddress(host.to_string()))
}

/// Map an IPv4 socket address into the v4-mapped IPv6 space, so peers look
/// the same no matter how they were learned.
pub fn to_v6(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) => {
            SocketAddr::V6(SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0))
        }
        v6 @ SocketAddr::V6(_) => v6,
    }
}

/// Canonical IPv6 form of an address, used for hashing into cookies.
pub fn canonical_ip(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

fn new_dual_stack_socket(ttl: u32) -> io::Result<Socket> {
    let sock = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_only_v6(false)?;
    sock.set_nonblocking(true)?;

    debug!("using ttl={}", ttl);
    sock.set_unicast_hops_v6(ttl)?;
    // IPv6 hop limit does not cover v4-mapped traffic on Linux; some
    // platforms reject the v4 option on a v6 socket with EINVAL.
    if let Err(e) = sock.set_ttl(ttl) {
        if e.kind() != io::ErrorKind::InvalidInput {
            return Err(e);
        }
        warn!("setsockopt(TTLv4) not supported: {}", e);
    }
    Ok(sock)
}

fn into_tokio(sock: Socket) -> io::Result<UdpSocket> {
    let std_sock: std::net::UdpSocket = sock.into();
    UdpSocket::from_std(std_sock)
}
