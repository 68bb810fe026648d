//! Microsecond send timer.
//!
//! Transmit times are promised on the wire before the packet leaves, so the
//! wait for the next send has to end on the microsecond it was scheduled
//! for. The runtime's own timer wheel ticks in milliseconds; this one arms a
//! `CLOCK_MONOTONIC` timerfd and waits for it through the reactor, so it can
//! still race the socket in the same `select!`.

use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use tokio::io::unix::AsyncFd;

struct TimerHandle(TimerFd);

impl AsRawFd for TimerHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_fd().as_raw_fd()
    }
}

/// One-shot timer with microsecond resolution.
pub struct SendTimer {
    fd: AsyncFd<TimerHandle>,
}

impl SendTimer {
    /// Create a disarmed timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> io::Result<Self> {
        let timer = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
        )?;
        Ok(Self {
            fd: AsyncFd::new(TimerHandle(timer))?,
        })
    }

    /// Complete once `wait` has elapsed. A zero wait completes at once.
    ///
    /// Re-arming replaces any earlier deadline, so a wait abandoned by
    /// `select!` leaves nothing behind.
    pub async fn sleep(&mut self, wait: Duration) -> io::Result<()> {
        if wait.is_zero() {
            return Ok(());
        }
        self.fd.get_ref().0.set(
            Expiration::OneShot(TimeSpec::from_duration(wait)),
            TimerSetTimeFlags::empty(),
        )?;
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|fd| fd.get_ref().0.wait().map_err(io::Error::from)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

impl std::fmt::Debug for SendTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendTimer")
            .field("fd", &self.fd.get_ref().as_raw_fd())
            .finish()
    }
}
