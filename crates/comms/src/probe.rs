use std::io::{self, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Try to open a TCP connection to `address:port` within `timeout`.
///
/// A timed-out attempt is retried once when `retry_once` is set. Refusals and
/// unresolvable hosts fail straight away. Independent of the gateway's
/// failure counters.
pub fn probe(address: &str, port: u16, timeout: Duration, retry_once: bool) -> bool {
    let addr = match (address, port).to_socket_addrs().map(|mut it| it.next()) {
        Ok(Some(addr)) => addr,
        Ok(None) | Err(_) => {
            debug!(address, port, "probe target does not resolve");
            return false;
        }
    };
    connect_with_retry(retry_once, || TcpStream::connect_timeout(&addr, timeout).map(drop))
}

/// Run `connect`, repeating it once more if the first attempt timed out and
/// `retry_once` is set.
fn connect_with_retry(retry_once: bool, mut connect: impl FnMut() -> io::Result<()>) -> bool {
    let attempts = if retry_once { 2 } else { 1 };
    for attempt in 1..=attempts {
        match connect() {
            Ok(()) => return true,
            Err(e) if e.kind() == ErrorKind::TimedOut && attempt < attempts => {
                debug!(attempt, "probe timed out, retrying once");
            }
            Err(e) => {
                debug!(attempt, error = %e, "probe failed");
                return false;
            }
        }
    }
    false
}

/// [`probe`] with a fixed timeout and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct LivenessProbe {
    pub timeout: Duration,
    pub retry_once: bool,
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_once: true,
        }
    }
}

impl LivenessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn check(&self, address: &str, port: u16) -> bool {
        probe(address, port, self.timeout, self.retry_once)
    }
}
