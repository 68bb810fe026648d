//! The single-threaded event loop.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use signal_hook::consts::SIGINT;
use signal_hook::flag;
use tracing::{debug, info, warn};

use crate::config::{Config, Role};
use crate::core::{EXIT_SECOND_SIGINT, IsopingError, IsopingResult, PACKET_SIZE};
use crate::session::CookieJar;
use crate::transport::{IsopingSocket, MonotonicClock, SendTimer, diff, resolve};

use super::dispatch::Engine;
use super::report::{Printer, StdoutReport};

/// How long to sleep when nothing is scheduled; any datagram wakes us.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Run server or client until interrupted.
///
/// On the first SIGINT the client prints its summary and we return; a
/// second SIGINT exits the process at once.
pub async fn run(config: &Config) -> IsopingResult<()> {
    exit_on_second_sigint()?;
    let clock = MonotonicClock::new();
    let printer = Printer::new(
        config.quiet,
        config.timestamps.then_some(clock),
        Box::new(StdoutReport),
    );

    let (mut engine, mut socket) = match &config.role {
        Role::Server => {
            let socket = IsopingSocket::bind(config.port, config.ttl)?;
            (Engine::server(config, CookieJar::random(), printer), socket)
        }
        Role::Client { host } => {
            let remote = resolve(host, config.port).await?;
            let socket = IsopingSocket::connect(remote, config.ttl)?;
            (Engine::client(config, remote, clock.now(), printer), socket)
        }
    };
    info!("using ttl={}", config.ttl);

    serve(&mut engine, &mut socket, &clock, interrupted()).await?;
    engine.print_summary();
    Ok(())
}

/// Drive `engine` over `socket` until `shutdown` completes.
///
/// Every wakeup, whether from the timer or a datagram, first services the
/// send queue and then handles the datagram, if any.
pub async fn serve(
    engine: &mut Engine,
    socket: &mut IsopingSocket,
    clock: &MonotonicClock,
    shutdown: impl Future<Output = ()>,
) -> IsopingResult<()> {
    tokio::pin!(shutdown);
    let mut timer = SendTimer::new()?;
    // One spare byte so oversized datagrams are seen as such.
    let mut buf = [0u8; PACKET_SIZE + 1];

    loop {
        let wait = match engine.next_send_time() {
            Some(at) => Duration::from_micros(diff(at, clock.now()).max(0) as u64),
            None => IDLE_WAIT,
        };

        let received = tokio::select! {
            () = &mut shutdown => return Ok(()),
            r = timer.sleep(wait) => {
                r?;
                None
            }
            r = socket.recv_from(&mut buf) => Some(r),
        };

        let now = clock.now();
        engine.maybe_rotate_cookies(now);
        engine.send_waiting_packets(now, socket)?;

        match received {
            None => {}
            Some(Ok((len, from))) => {
                match engine.read_incoming_packet(&buf[..len], from, now, socket) {
                    Ok(()) => {}
                    Err(e) if e.is_silent_drop() => debug!("dropped datagram: {}", e),
                    Err(e) => return Err(e),
                }
            }
            Some(Err(e))
                if !engine.is_server() && e.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                return Err(IsopingError::ConnectionRefused);
            }
            Some(Err(e)) => warn!("recvfrom: {}", e),
        }
    }
}

/// Make any SIGINT after the first one terminate the process with
/// [`EXIT_SECOND_SIGINT`] from inside the signal handler, so it works even
/// while the loop is stuck writing to a stalled stdout.
fn exit_on_second_sigint() -> IsopingResult<()> {
    let seen = Arc::new(AtomicBool::new(false));
    // Registration order matters: the exit check must run before the
    // handler that records the first SIGINT.
    flag::register_conditional_shutdown(
        SIGINT,
        i32::from(EXIT_SECOND_SIGINT),
        Arc::clone(&seen),
    )?;
    flag::register(SIGINT, seen)?;
    Ok(())
}

/// Completes on the first SIGINT.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("can't listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
    info!("interrupted");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::time::sleep;

    use crate::transport::to_v6;

    use super::*;

    fn loopback(port: u16) -> SocketAddr {
        to_v6(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[tokio::test]
    async fn test_loopback_session() {
        let clock = MonotonicClock::new();
        let server_config = Config::default().with_packets_per_sec(50.0).with_quiet(true);
        let mut server_socket = IsopingSocket::bind(0, 2).unwrap();
        let port = server_socket.local_addr().unwrap().port();
        let mut server = Engine::server(
            &server_config,
            CookieJar::random(),
            Printer::captured(true).0,
        );

        let client_config = Config::client("localhost")
            .with_packets_per_sec(50.0)
            .with_quiet(true);
        let mut client_socket = IsopingSocket::connect(loopback(port), 2).unwrap();
        let mut client = Engine::client(
            &client_config,
            loopback(port),
            clock.now(),
            Printer::captured(true).0,
        );

        let run_for = || sleep(Duration::from_millis(1500));
        let (s, c) = tokio::join!(
            serve(&mut server, &mut server_socket, &clock, run_for()),
            serve(&mut client, &mut client_socket, &clock, run_for()),
        );
        s.unwrap();
        c.unwrap();

        assert_eq!(server.sessions().len(), 1);
        let cs = client.sessions().first().unwrap();
        assert!(cs.is_established());
        assert!(cs.lat_rx.count > 10, "only {} samples", cs.lat_rx.count);
        assert!(cs.lat_tx.count > 10, "only {} samples", cs.lat_tx.count);

        // Packets leave when their txtime says, so loopback latency stays
        // well under a millisecond in both directions.
        assert!(cs.lat_tx.mean() < 1000.0, "tx mean {} us", cs.lat_tx.mean());
        assert!(cs.lat_rx.mean() < 1000.0, "rx mean {} us", cs.lat_rx.mean());
    }

    #[tokio::test]
    async fn test_client_refused_by_closed_port() {
        // Bind and drop to find a port nobody listens on.
        let port = {
            let unused = IsopingSocket::bind(0, 2).unwrap();
            unused.local_addr().unwrap().port()
        };
        let clock = MonotonicClock::new();
        let config = Config::client("localhost").with_quiet(true);
        let mut socket = IsopingSocket::connect(loopback(port), 2).unwrap();
        let mut client = Engine::client(
            &config,
            loopback(port),
            clock.now(),
            Printer::captured(true).0,
        );

        let result = serve(
            &mut client,
            &mut socket,
            &clock,
            sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(matches!(result, Err(IsopingError::ConnectionRefused)));
    }
}
