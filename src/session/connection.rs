//! TCP connection establishment for the hub session.
//!
//! Resolves the hub address and connects with a bounded timeout.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connect to `host:port`, bounding each connect attempt by `timeout`.
///
/// Resolution may yield several candidate addresses; they are tried in turn
/// and the last error is reported if none accepts.
pub(crate) fn connect_with_timeout(
    host: &str,
    port: u16,
    timeout: Duration,
) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
    }))
}
