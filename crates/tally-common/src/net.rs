//! TCP reachability probes for authority bootstrap.
//!
//! Before a peer can enroll it needs the enrollment authority to be
//! listening. `is_tcp_port_open` is the one-shot probe a harness uses to
//! decide whether an authority instance is already running; `wait_for_listener`
//! is the bounded startup barrier enrollment waits on during bootstrap.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::debug;

/// Timeout for a single connect probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Delay between retries while waiting for a listener to appear.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Check whether something is accepting TCP connections at `host:port`.
pub fn is_tcp_port_open(host: &str, port: u16) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => return false,
    };

    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, PROBE_TIMEOUT).is_ok())
}

/// Block until `host:port` accepts a TCP connection or `timeout` elapses.
///
/// Returns `Err` with `TimedOut` if the deadline passes without the
/// listener appearing. This is the bootstrap barrier only — steady-state
/// operations never call it.
pub fn wait_for_listener(host: &str, port: u16, timeout: Duration) -> Result<(), std::io::Error> {
    let deadline = Instant::now() + timeout;

    loop {
        if is_tcp_port_open(host, port) {
            debug!(host, port, "listener reachable");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no listener at {host}:{port} within {timeout:?}"),
            ));
        }
        std::thread::sleep(RETRY_INTERVAL);
    }
}
