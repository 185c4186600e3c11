//! Connection identities and per-connection transport state.
//!
//! The router keys every remote endpoint by a [`ConnectionKey`] and keeps
//! its transport state in a [`Connection`] variant: a write handle plus the
//! parser for the inbound byte stream. The workers in the submodules own
//! the blocking reads and only ever enqueue events toward the router.

pub mod serial;
pub mod tcp;
pub mod udp;

use crate::protocol::Parser;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Index of a transport in the router's configuration
pub type TransportId = usize;

/// Read poll interval; workers wake this often to check the shutdown flag
pub(crate) const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Fixed delay between TCP/serial reconnect attempts
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Socket read buffer. A v2 frame is at most 280 bytes, but datagrams and
/// stream reads may carry several frames back to back.
pub(crate) const READ_BUFFER: usize = 2048;

pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Sleep in short slices so shutdown is not delayed by a reconnect backoff
pub(crate) fn sleep_while_running(shutdown: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(100);
    let mut remaining = total;
    while !shutdown.load(Ordering::Relaxed) && remaining > Duration::ZERO {
        let step = remaining.min(slice);
        std::thread::sleep(step);
        remaining -= step;
    }
}

/// Identity of a connection: the routing-table value and the key of the
/// router's connection map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    /// The in-process connection (subscribers and `pack_and_send`)
    Local,
    /// A socket-backed transport (UDP client, TCP client)
    Socket(TransportId),
    /// One remote peer of a UDP server transport
    Peer(TransportId, SocketAddr),
    /// A serial device
    Serial(String),
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionKey::Local => write!(f, "local"),
            ConnectionKey::Socket(id) => write!(f, "socket#{}", id),
            ConnectionKey::Peer(id, addr) => write!(f, "udp#{}/{}", id, addr),
            ConnectionKey::Serial(path) => write!(f, "serial:{}", path),
        }
    }
}

/// Transport-specific state for one remote connection
pub enum Connection {
    /// One learned peer of a UDP server socket
    UdpPeer {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        parser: Parser,
    },
    /// Connected UDP client socket
    UdpOut { socket: UdpSocket, parser: Parser },
    /// Connected TCP stream (write half; the worker owns the read half)
    TcpOut { stream: TcpStream, parser: Parser },
    /// Serial port shared with its reader thread
    Serial {
        port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
        parser: Parser,
    },
}

impl Connection {
    pub fn parser_mut(&mut self) -> &mut Parser {
        match self {
            Connection::UdpPeer { parser, .. }
            | Connection::UdpOut { parser, .. }
            | Connection::TcpOut { parser, .. }
            | Connection::Serial { parser, .. } => parser,
        }
    }

    /// Write serialized frame bytes to this connection's transport
    pub fn forward(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Connection::UdpPeer { socket, peer, .. } => {
                socket.send_to(bytes, *peer)?;
                Ok(())
            }
            Connection::UdpOut { socket, .. } => {
                socket.send(bytes)?;
                Ok(())
            }
            Connection::TcpOut { stream, .. } => stream.write_all(bytes),
            Connection::Serial { port, .. } => {
                let mut port = port
                    .lock()
                    .map_err(|_| std::io::Error::other("serial port mutex poisoned"))?;
                port.write_all(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct() {
        let a = ConnectionKey::Peer(0, "127.0.0.1:40000".parse().unwrap());
        let b = ConnectionKey::Peer(0, "127.0.0.1:40001".parse().unwrap());
        let c = ConnectionKey::Peer(1, "127.0.0.1:40000".parse().unwrap());
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(ConnectionKey::Socket(0), ConnectionKey::Local);
    }

    #[test]
    fn key_display_is_stable() {
        assert_eq!(ConnectionKey::Local.to_string(), "local");
        assert_eq!(ConnectionKey::Socket(2).to_string(), "socket#2");
        assert_eq!(
            ConnectionKey::Serial("/dev/ttyUSB0".into()).to_string(),
            "serial:/dev/ttyUSB0"
        );
    }
}
