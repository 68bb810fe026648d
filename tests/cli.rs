//! The isoping binary: signals and diagnostics output.

use std::io::Read;

use std::net::UdpSocket;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

fn free_port() -> u16 {
    let unused = UdpSocket::bind("[::]:0").unwrap();
    unused.local_addr().unwrap().port()
}

fn isoping(args: &[&str], stdout: Stdio) -> Child {
    isoping_with_stderr(args, stdout, Stdio::null())
}

fn isoping_with_stderr(args: &[&str], stdout: Stdio, stderr: Stdio) -> Child {
    Command::new(env!("CARGO_BIN_EXE_isoping"))
        .args(args)
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .unwrap()
}

fn interrupt(child: &Child) {
    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
}

fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        sleep(Duration::from_millis(20));
    }
    let _ = child.kill();
    let _ = child.wait();
    None
}

#[test]
fn test_first_sigint_stops_server_cleanly() {
    let port = free_port().to_string();
    let mut server = isoping(&["-q", "-p", &port], Stdio::null());
    sleep(Duration::from_millis(300));

    interrupt(&server);
    let status = wait_for_exit(&mut server, Duration::from_secs(5)).expect("server still running");
    assert_eq!(status.code(), Some(0));
}

#[test]
fn test_second_sigint_exits_while_stdout_is_stalled() {
    let port = free_port().to_string();
    let mut server = isoping(&["-q", "-r", "5000", "-p", &port], Stdio::null());
    sleep(Duration::from_millis(300));

    // Nobody reads the client's stdout, so it soon blocks writing lines.
    let mut client = isoping(&["-r", "5000", "-p", &port, "::1"], Stdio::piped());
    sleep(Duration::from_millis(1500));

    interrupt(&client);
    sleep(Duration::from_millis(300));
    interrupt(&client);
    let status = wait_for_exit(&mut client, Duration::from_secs(5));

    interrupt(&server);
    let _ = wait_for_exit(&mut server, Duration::from_secs(5));

    let status = status.expect("client survived two SIGINTs");
    assert_eq!(status.code(), Some(130));
}

#[test]
fn test_redirected_stderr_has_no_color_codes() {
    let port = free_port().to_string();
    let mut server = isoping_with_stderr(&["-q", "-p", &port], Stdio::null(), Stdio::piped());
    sleep(Duration::from_millis(300));

    interrupt(&server);
    wait_for_exit(&mut server, Duration::from_secs(5)).expect("server still running");

    let mut log = String::new();
    server.stderr.take().unwrap().read_to_string(&mut log).unwrap();
    assert!(log.contains("server listening"), "stderr was {log:?}");
    assert!(!log.contains('\x1b'), "stderr was {log:?}");
}
