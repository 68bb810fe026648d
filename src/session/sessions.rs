//! Session table and send scheduling.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::SocketAddr;

use tracing::trace;

use crate::transport::diff;

use super::cookie::CookieJar;
use super::state::Session;

/// One pending transmission in the send queue.
///
/// Entries are never removed from the middle of the heap; rescheduling a
/// session bumps its token and the stale entry is skipped when it surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    at: u32,
    token: u64,
    addr: SocketAddr,
}

#[derive(Debug)]
struct Slot {
    session: Session,
    token: Option<u64>,
}

/// All sessions, keyed by peer address, plus the queue of their next
/// send times and the handshake cookie secrets.
#[derive(Debug)]
pub struct Sessions {
    map: HashMap<SocketAddr, Slot>,
    // TODO: order by 64-bit send times; raw u32 ordering misbehaves for the
    // few seconds around a clock wrap every ~71 minutes.
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_token: u64,
    cookies: CookieJar,
}

impl Sessions {
    /// Empty table using `cookies` for handshakes.
    pub fn new(cookies: CookieJar) -> Self {
        Self {
            map: HashMap::new(),
            queue: BinaryHeap::new(),
            next_token: 0,
            cookies,
        }
    }

    /// Add a session for `addr` and schedule its first send.
    ///
    /// If `addr` already has a session that one is kept (and rescheduled).
    pub fn new_session(
        &mut self,
        first_send: u32,
        usec_per_pkt: u32,
        usec_per_print: u32,
        addr: SocketAddr,
    ) -> &mut Session {
        let token = self.next_token;
        self.next_token += 1;
        let slot = self.map.entry(addr).or_insert_with(|| Slot {
            session: Session::new(first_send, usec_per_pkt, usec_per_print, addr),
            token: None,
        });
        slot.token = Some(token);
        self.queue.push(Reverse(Scheduled {
            at: slot.session.next_send,
            token,
            addr,
        }));
        &mut slot.session
    }

    /// Session for `addr`.
    pub fn get(&self, addr: &SocketAddr) -> Option<&Session> {
        self.map.get(addr).map(|slot| &slot.session)
    }

    /// Mutable session for `addr`.
    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Session> {
        self.map.get_mut(addr).map(|slot| &mut slot.session)
    }

    /// Some session; a client only ever has one.
    pub fn first(&self) -> Option<&Session> {
        self.map.values().next().map(|slot| &slot.session)
    }

    /// Mutable [`first`](Self::first).
    pub fn first_mut(&mut self) -> Option<&mut Session> {
        self.map.values_mut().next().map(|slot| &mut slot.session)
    }

    /// Drop the session for `addr` along with its pending send.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Session> {
        self.map.remove(addr).map(|slot| slot.session)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Cookie secrets.
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Mutable cookie secrets.
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }

    /// (Re)queue `addr` at its session's current `next_send`, replacing any
    /// earlier entry.
    pub fn schedule(&mut self, addr: SocketAddr) {
        let Some(slot) = self.map.get_mut(&addr) else {
            return;
        };
        let token = self.next_token;
        self.next_token += 1;
        slot.token = Some(token);
        trace!("scheduling {} at {}", addr, slot.session.next_send);
        self.queue.push(Reverse(Scheduled {
            at: slot.session.next_send,
            token,
            addr,
        }));
    }

    /// Number of sessions waiting in the send queue.
    pub fn pending_sends(&self) -> usize {
        self.map.values().filter(|slot| slot.token.is_some()).count()
    }

    /// Earliest scheduled send time across all sessions.
    pub fn next_send_time(&mut self) -> Option<u32> {
        self.drop_stale();
        self.queue.peek().map(|Reverse(entry)| entry.at)
    }

    /// Pop the earliest session whose send time has arrived by `now`.
    pub fn pop_due(&mut self, now: u32) -> Option<SocketAddr> {
        self.drop_stale();
        let Reverse(top) = *self.queue.peek()?;
        if diff(now, top.at) < 0 {
            return None;
        }
        self.queue.pop();
        if let Some(slot) = self.map.get_mut(&top.addr) {
            slot.token = None;
        }
        Some(top.addr)
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse(top)) = self.queue.peek() {
            let live = self
                .map
                .get(&top.addr)
                .is_some_and(|slot| slot.token == Some(top.token));
            if live {
                break;
            }
            self.queue.pop();
        }
    }
}
