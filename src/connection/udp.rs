//! UDP transport workers.
//!
//! UDP sockets are connectionless: there is nothing to reconnect, so read
//! errors are logged and the worker keeps polling until shutdown.

use super::{is_timeout, Connection, ConnectionKey, TransportId, POLL_TIMEOUT, READ_BUFFER};
use crate::error::Result;
use crate::protocol::Parser;
use crate::router::Event;
use crossbeam_channel::Sender;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Bind a UDP server socket and spawn its reader. The returned socket stays
/// with the router so it can mint per-peer connections and send replies.
pub(crate) fn spawn_udp_in(
    id: TransportId,
    addr: SocketAddr,
    events: Sender<Event>,
    shutdown: Arc<AtomicBool>,
) -> Result<(Arc<UdpSocket>, JoinHandle<()>)> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(POLL_TIMEOUT))?;
    log::info!("udp server listening on {}", socket.local_addr()?);
    let socket = Arc::new(socket);

    let reader = Arc::clone(&socket);
    let handle = std::thread::Builder::new()
        .name(format!("udpin-{}", id))
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER];
            while !shutdown.load(Ordering::Relaxed) {
                match reader.recv_from(&mut buf) {
                    Ok((n, peer)) => {
                        let event = Event::Datagram {
                            transport: id,
                            peer,
                            bytes: buf[..n].to_vec(),
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) if is_timeout(&e) => continue,
                    Err(e) => log::warn!("udpin-{} receive error: {}", id, e),
                }
            }
            log::debug!("udpin-{} reader exiting", id);
        })?;

    Ok((socket, handle))
}

/// Bind and connect a UDP client socket, enqueue its connection, and spawn
/// its reader.
pub(crate) fn spawn_udp_out(
    id: TransportId,
    remote: SocketAddr,
    events: Sender<Event>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let bind: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind)?;
    socket.connect(remote)?;
    socket.set_read_timeout(Some(POLL_TIMEOUT))?;
    log::info!("udp client {} -> {}", socket.local_addr()?, remote);

    let key = ConnectionKey::Socket(id);
    let writer = socket.try_clone()?;
    let _ = events.send(Event::AddConnection(
        key.clone(),
        Connection::UdpOut {
            socket: writer,
            parser: Parser::new(),
        },
    ));

    let handle = std::thread::Builder::new()
        .name(format!("udpout-{}", id))
        .spawn(move || {
            let mut buf = [0u8; READ_BUFFER];
            while !shutdown.load(Ordering::Relaxed) {
                match socket.recv(&mut buf) {
                    Ok(n) => {
                        if events.send(Event::Bytes(key.clone(), buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if is_timeout(&e) => continue,
                    // e.g. ICMP port unreachable surfacing on a connected
                    // socket; the remote may come back at any time
                    Err(e) => log::debug!("udpout-{} receive error: {}", id, e),
                }
            }
            log::debug!("udpout-{} reader exiting", id);
        })?;

    Ok(handle)
}
