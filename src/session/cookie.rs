//! Stateless handshake cookies.
//!
//! Before the server allocates any state for a client it hands out a cookie
//! bound to the client's address and requested packet rate, and only accepts
//! the client once the cookie comes back. Spoofed sources never see their
//! cookie, so they cannot make the server send timing packets anywhere.
//!
//! Cookies are `SHA-256(secret || usec_per_pkt || address)`. The server keeps
//! the current and previous secret, so a cookie stays valid across one
//! rotation.

use std::fmt;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{
    COOKIE_EPOCH_SHIFT, COOKIE_ROTATION_CHECK_USEC, COOKIE_SECRET_SIZE, COOKIE_SIZE, EpochClock,
    NO_COOKIE_EPOCH, SecretSource,
};
use crate::transport::{Handshake, canonical_ip};

/// Secret mixed into cookies. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CookieSecret([u8; COOKIE_SECRET_SIZE]);

impl CookieSecret {
    /// Wrap raw secret bytes.
    pub fn from_bytes(bytes: [u8; COOKIE_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the secret bytes.
    pub fn as_bytes(&self) -> &[u8; COOKIE_SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for CookieSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CookieSecret([REDACTED])")
    }
}

/// Secrets from the operating system's random generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSecrets;

impl SecretSource for RandomSecrets {
    fn fill_secret(&mut self, secret: &mut [u8; COOKIE_SECRET_SIZE]) {
        OsRng.fill_bytes(secret);
    }
}

/// Predictable secrets: the n-th secret is `[n, 0, 0, ...]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialSecrets {
    next: u8,
}

impl SequentialSecrets {
    /// Source whose first secret starts with `first`.
    pub fn starting_at(first: u8) -> Self {
        Self { next: first }
    }
}

impl SecretSource for SequentialSecrets {
    fn fill_secret(&mut self, secret: &mut [u8; COOKIE_SECRET_SIZE]) {
        secret.fill(0);
        secret[0] = self.next;
        self.next = self.next.wrapping_add(1);
    }
}

/// Epochs of 64 seconds of Unix time.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixEpochClock;

impl EpochClock for UnixEpochClock {
    fn current_epoch(&self) -> Option<u32> {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        let epoch = (secs >> COOKIE_EPOCH_SHIFT) as u32;
        (epoch != NO_COOKIE_EPOCH).then_some(epoch)
    }
}

/// Clock that never rotates.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrozenEpochs;

impl EpochClock for FrozenEpochs {
    fn current_epoch(&self) -> Option<u32> {
        None
    }
}

/// The server's current and previous cookie secrets.
pub struct CookieJar {
    secrets: Box<dyn SecretSource>,
    clock: Box<dyn EpochClock>,
    epoch: u32,
    secret: CookieSecret,
    prev_epoch: u32,
    prev_secret: CookieSecret,
    last_check: Option<u32>,
}

impl CookieJar {
    /// Jar drawing secrets from `secrets` and rotating on `clock`.
    ///
    /// Starts at epoch 0 with one fresh secret; the server rotates into a
    /// real epoch on its first check.
    pub fn new(mut secrets: Box<dyn SecretSource>, clock: Box<dyn EpochClock>) -> Self {
        let mut bytes = [0u8; COOKIE_SECRET_SIZE];
        secrets.fill_secret(&mut bytes);
        let secret = CookieSecret(bytes);
        bytes.zeroize();
        Self {
            secrets,
            clock,
            epoch: NO_COOKIE_EPOCH,
            secret,
            prev_epoch: NO_COOKIE_EPOCH,
            prev_secret: CookieSecret([0u8; COOKIE_SECRET_SIZE]),
            last_check: None,
        }
    }

    /// Production jar: OS randomness, 64-second epochs.
    pub fn random() -> Self {
        Self::new(Box::new(RandomSecrets), Box::new(UnixEpochClock))
    }

    /// Reproducible jar for replay and tests: epoch 1 with secret
    /// `[1, 0, ...]` as previous, epoch 2 with `[2, 0, ...]` as current,
    /// and no rotation.
    pub fn deterministic() -> Self {
        let mut jar = Self::new(
            Box::new(SequentialSecrets::starting_at(0)),
            Box::new(FrozenEpochs),
        );
        jar.rotate(1);
        jar.rotate(2);
        jar
    }

    /// Current epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Previous epoch.
    pub fn prev_epoch(&self) -> u32 {
        self.prev_epoch
    }

    /// Demote the current secret and draw a new one for `new_epoch`.
    pub fn rotate(&mut self, new_epoch: u32) {
        self.prev_epoch = self.epoch;
        self.prev_secret = self.secret.clone();
        self.epoch = new_epoch;
        self.secrets.fill_secret(&mut self.secret.0);
        debug!("generated new cookie secret for epoch {}", new_epoch);
    }

    /// Rotate if the epoch clock has moved on. Checks at most once per
    /// second of monotonic time `now`.
    pub fn maybe_rotate(&mut self, now: u32) {
        if let Some(last) = self.last_check
            && now.wrapping_sub(last) <= COOKIE_ROTATION_CHECK_USEC
        {
            return;
        }
        if let Some(epoch) = self.clock.current_epoch()
            && epoch != self.epoch
        {
            info!("rotating cookie secret: epoch {} -> {}", self.epoch, epoch);
            self.rotate(epoch);
        }
        self.last_check = Some(now);
    }

    /// Cookie for `peer` at `usec_per_pkt`, with the current secret.
    pub fn issue(&self, usec_per_pkt: u32, peer: SocketAddr) -> Handshake {
        Handshake::with_cookie(self.epoch, cookie_with(&self.secret, usec_per_pkt, peer))
    }

    /// Check a returned cookie. Only the current and previous epochs are
    /// accepted.
    pub fn validate(&self, handshake: &Handshake, usec_per_pkt: u32, peer: SocketAddr) -> bool {
        let secret = if handshake.cookie_epoch == self.epoch {
            &self.secret
        } else if handshake.cookie_epoch == self.prev_epoch {
            &self.prev_secret
        } else {
            warn!("obsolete cookie epoch {} from {}", handshake.cookie_epoch, peer);
            return false;
        };

        let golden = cookie_with(secret, usec_per_pkt, peer);
        debug!(
            "handshake cookie epoch={} cookie={} expected={}",
            handshake.cookie_epoch,
            hex::encode(handshake.cookie),
            hex::encode(golden)
        );
        if golden != handshake.cookie {
            warn!("invalid cookie in handshake packet from {}", peer.ip());
            return false;
        }
        true
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieJar")
            .field("epoch", &self.epoch)
            .field("prev_epoch", &self.prev_epoch)
            .field("last_check", &self.last_check)
            .finish_non_exhaustive()
    }
}

fn cookie_with(secret: &CookieSecret, usec_per_pkt: u32, peer: SocketAddr) -> [u8; COOKIE_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(usec_per_pkt.to_be_bytes());
    hasher.update(canonical_ip(peer.ip()).octets());
    hasher.update(peer.port().to_be_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv6Addr};

    use super::*;

    struct StepClock(std::sync::Arc<std::sync::atomic::AtomicU32>);

    impl EpochClock for StepClock {
        fn current_epoch(&self) -> Option<u32> {
            Some(self.0.load(std::sync::atomic::Ordering::SeqCst))
        }
    }

    fn peer() -> SocketAddr {
        "[2001:db8::5]:40000".parse().unwrap()
    }

    #[test]
    fn test_cookie_roundtrip() {
        let mut jar = CookieJar::random();
        jar.rotate(1);
        let hs = jar.issue(100_000, peer());
        assert_eq!(hs.cookie_epoch, 1);
        assert!(jar.validate(&hs, 100_000, peer()));
    }

    #[test]
    fn test_cookie_bound_to_port_address_and_rate() {
        let mut jar = CookieJar::random();
        jar.rotate(1);
        let hs = jar.issue(100_000, peer());

        let other_port = SocketAddr::new(peer().ip(), 40001);
        assert!(!jar.validate(&hs, 100_000, other_port));

        let mut octets = canonical_ip(peer().ip()).octets();
        octets[0] += 1;
        let other_ip = SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), 40000);
        assert!(!jar.validate(&hs, 100_000, other_ip));

        assert!(!jar.validate(&hs, 100_001, peer()));

        let mut tampered = hs.clone();
        tampered.cookie[0] = tampered.cookie[0].wrapping_add(1);
        assert!(!jar.validate(&tampered, 100_000, peer()));
    }

    #[test]
    fn test_previous_epoch_still_valid() {
        let mut jar = CookieJar::random();
        jar.rotate(1);
        let hs = jar.issue(100_000, peer());

        jar.rotate(2);
        assert!(jar.validate(&hs, 100_000, peer()));

        jar.rotate(3);
        assert!(!jar.validate(&hs, 100_000, peer()));
    }

    #[test]
    fn test_ipv4_and_mapped_ipv4_share_cookies() {
        let mut jar = CookieJar::random();
        jar.rotate(9);
        let v4: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        let mapped: SocketAddr = "[::ffff:192.0.2.1]:5000".parse().unwrap();
        let hs = jar.issue(1000, v4);
        assert!(jar.validate(&hs, 1000, mapped));
    }

    #[test]
    fn test_deterministic_jar() {
        let jar = CookieJar::deterministic();
        assert_eq!(jar.prev_epoch(), 1);
        assert_eq!(jar.epoch(), 2);

        let mut current = [0u8; COOKIE_SECRET_SIZE];
        current[0] = 2;
        let expected = cookie_with(&CookieSecret::from_bytes(current), 100_000, peer());
        assert_eq!(jar.issue(100_000, peer()).cookie, expected);

        // Identical jars issue identical cookies.
        assert_eq!(
            CookieJar::deterministic().issue(5, peer()),
            jar.issue(5, peer())
        );
    }

    #[test]
    fn test_deterministic_jar_never_rotates() {
        let mut jar = CookieJar::deterministic();
        jar.maybe_rotate(5_000_000);
        jar.maybe_rotate(50_000_000);
        assert_eq!(jar.epoch(), 2);
    }

    #[test]
    fn test_rotation_checked_once_per_second() {
        let epoch = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(100));
        let mut jar = CookieJar::new(
            Box::new(SequentialSecrets::default()),
            Box::new(StepClock(epoch.clone())),
        );

        jar.maybe_rotate(1_000);
        assert_eq!(jar.epoch(), 100);

        epoch.store(101, std::sync::atomic::Ordering::SeqCst);
        jar.maybe_rotate(1_000 + COOKIE_ROTATION_CHECK_USEC);
        assert_eq!(jar.epoch(), 100);

        jar.maybe_rotate(1_000 + COOKIE_ROTATION_CHECK_USEC + 1);
        assert_eq!(jar.epoch(), 101);
        assert_eq!(jar.prev_epoch(), 100);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = CookieSecret::from_bytes([7u8; COOKIE_SECRET_SIZE]);
        assert_eq!(format!("{secret:?}"), "CookieSecret([REDACTED])");
    }
}
