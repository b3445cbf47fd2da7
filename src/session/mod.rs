//! Hub session: exclusive socket ownership and the request/response cycle.
//!
//! One TCP connection per session. `send_command` is atomic from write to
//! the first non-push reply; asynchronous status frames sharing the socket
//! are discarded along the way. The protocol is not strictly message-framed,
//! so the receive loop accumulates bytes until a newline shows up or the
//! peer stalls.

mod connection;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard};

use crate::config::HubConfig;
use crate::protocol::{self, SessionError};

/// Receive buffer size per read.
const BUFFER_SIZE: usize = 8192;

/// Owns the TCP socket to the hub.
///
/// The socket slot is `None` when the link is down; it is emptied on any
/// transport failure and never refilled, so a session that loses its hub
/// stays unavailable for the instance's lifetime.
pub(crate) struct Session {
    socket: Mutex<Option<TcpStream>>,
    max_push_frames: usize,
}

impl Session {
    /// Open the session, attempting the TCP connect immediately.
    ///
    /// Connect failure is not fatal: the session is still constructed and
    /// every later call fails with `NotConnected`.
    pub(crate) fn connect(config: &HubConfig) -> Session {
        let socket =
            match connection::connect_with_timeout(&config.host, config.port, config.connect_timeout)
            {
                Ok(stream) => {
                    stream.set_read_timeout(Some(config.io_timeout)).ok();
                    stream.set_write_timeout(Some(config.io_timeout)).ok();
                    Some(stream)
                }
                Err(e) => {
                    log::error!("error connecting to hub {}:{}: {e}", config.host, config.port);
                    None
                }
            };
        Session {
            socket: Mutex::new(socket),
            max_push_frames: config.max_push_frames,
        }
    }

    /// Send one command and return the first non-push reply.
    ///
    /// The socket lock is held across the full write-then-receive cycle so
    /// concurrent callers cannot interleave a command with another caller's
    /// reply. Timeouts and I/O failures close the socket.
    pub(crate) fn send_command(&self, command: &str) -> Result<String, SessionError> {
        let mut guard = self.lock_socket();
        let stream = guard.as_mut().ok_or(SessionError::NotConnected)?;

        let result = exchange(stream, command, self.max_push_frames);
        if matches!(
            result,
            Err(SessionError::Timeout) | Err(SessionError::Io { .. })
        ) {
            *guard = None;
        }
        result
    }

    fn lock_socket(&self) -> MutexGuard<'_, Option<TcpStream>> {
        // poisoning is ignored: the slot is always left in a coherent state
        self.socket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Write the command, then receive frames until one is not a push.
fn exchange(
    stream: &mut TcpStream,
    command: &str,
    max_push_frames: usize,
) -> Result<String, SessionError> {
    if let Err(e) = stream.write_all(command.as_bytes()) {
        log::error!("error sending command: {e}");
        return Err(e.into());
    }

    let mut discarded = 0;
    loop {
        let reply = receive(stream)?;
        if protocol::is_push_frame(&reply) {
            log::debug!("discarding push frame: {reply:?}");
            discarded += 1;
            if discarded >= max_push_frames {
                return Err(SessionError::NoReply { discarded });
            }
            continue;
        }
        log::debug!("received: {reply:?}");
        return Ok(reply);
    }
}

/// Read one response frame.
///
/// Accumulates reads until a `\n` appears; the frame is everything before
/// the first terminator and the remainder of that read is discarded. A hub
/// that stops sending before any terminator yields the buffered prefix
/// instead. A first read that times out means the link is dead.
fn receive(stream: &mut TcpStream) -> Result<String, SessionError> {
    let mut chunk = [0u8; BUFFER_SIZE];
    let mut buf: Vec<u8> = Vec::new();

    match stream.read(&mut chunk) {
        Ok(n) => buf.extend_from_slice(&chunk[..n]),
        Err(e) if is_timeout(&e) => {
            log::error!("error receiving: {e}");
            return Err(SessionError::Timeout);
        }
        Err(e) => return Err(e.into()),
    }

    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            buf.truncate(pos);
            break;
        }
        match stream.read(&mut chunk) {
            // peer closed or stalled before a terminator: return the prefix
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if is_timeout(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Spawn a one-connection hub that runs `script` on the accepted stream.
    /// The stream is wrapped for line-oriented command reads; replies go out
    /// through `get_mut()`.
    fn serve(script: impl FnOnce(&mut BufReader<TcpStream>) + Send + 'static) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream);
                script(&mut reader);
            }
        });
        port
    }

    fn read_command(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    fn test_config(port: u16) -> HubConfig {
        HubConfig {
            io_timeout: Duration::from_millis(200),
            ..HubConfig::new("127.0.0.1", port)
        }
    }

    /// Pause long enough for the client to have consumed the previous write.
    fn gap() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn reply_is_truncated_at_first_terminator() {
        let port = serve(|reader| {
            read_command(reader);
            reader
                .get_mut()
                .write_all(b"GLB 143E,1,1,25,255,255,255,0,0;\r\nLEFTOVER")
                .unwrap();
        });
        let session = Session::connect(&test_config(port));
        let reply = session.send_command("GLB,,,,0,\r\n").unwrap();
        assert_eq!(reply, "GLB 143E,1,1,25,255,255,255,0,0;\r");
    }

    #[test]
    fn bytes_after_terminator_do_not_leak_into_next_reply() {
        let port = serve(|reader| {
            read_command(reader);
            reader.get_mut().write_all(b"FIRST\r\nGARBAGE\r\n").unwrap();
            read_command(reader);
            reader.get_mut().write_all(b"THIRD\r\n").unwrap();
        });
        let session = Session::connect(&test_config(port));
        assert_eq!(session.send_command("HB\r\n").unwrap(), "FIRST\r");
        assert_eq!(session.send_command("HB\r\n").unwrap(), "THIRD\r");
    }

    #[test]
    fn unterminated_reply_is_returned_as_buffered() {
        let port = serve(|reader| {
            read_command(reader);
            reader.get_mut().write_all(b"GLB 143E").unwrap();
            // keep the socket open past the client's read timeout
            thread::sleep(Duration::from_millis(400));
        });
        let session = Session::connect(&test_config(port));
        assert_eq!(session.send_command("GLB,,,,0,\r\n").unwrap(), "GLB 143E");
    }

    #[test]
    fn peer_close_mid_response_returns_prefix() {
        let port = serve(|reader| {
            read_command(reader);
            reader.get_mut().write_all(b"GLB 287B").unwrap();
            // dropping the reader closes the connection
        });
        let session = Session::connect(&test_config(port));
        assert_eq!(session.send_command("GLB,,,,0,\r\n").unwrap(), "GLB 287B");
    }

    #[test]
    fn push_frames_are_discarded_until_reply() {
        let port = serve(|reader| {
            read_command(reader);
            reader
                .get_mut()
                .write_all(b"S 143E,1,1,25,0,0,0,0,0\r\n")
                .unwrap();
            gap();
            reader.get_mut().write_all(b"NEW 9A2C\r\n").unwrap();
            gap();
            reader.get_mut().write_all(b"HACK\r\n").unwrap();
        });
        let session = Session::connect(&test_config(port));
        assert_eq!(session.send_command("HB\r\n").unwrap(), "HACK\r");
    }

    #[test]
    fn push_flood_fails_with_no_reply() {
        let port = serve(|reader| {
            read_command(reader);
            reader.get_mut().write_all(b"S one\r\n").unwrap();
            gap();
            reader.get_mut().write_all(b"S two\r\n").unwrap();
            thread::sleep(Duration::from_millis(400));
        });
        let config = HubConfig {
            max_push_frames: 2,
            ..test_config(port)
        };
        let session = Session::connect(&config);
        let err = session.send_command("HB\r\n").unwrap_err();
        assert!(matches!(err, SessionError::NoReply { discarded: 2 }));
    }

    #[test]
    fn silent_hub_kills_the_link() {
        let port = serve(|reader| {
            read_command(reader);
            // never reply; client's first read must time out
            thread::sleep(Duration::from_millis(400));
        });
        let session = Session::connect(&test_config(port));
        let err = session.send_command("HB\r\n").unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        // the socket is closed; later calls fail fast
        let err = session.send_command("HB\r\n").unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[test]
    fn failed_connect_leaves_session_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let session = Session::connect(&test_config(port));
        let err = session.send_command("HB\r\n").unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }
}
