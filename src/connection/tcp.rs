//! TCP client transport worker.
//!
//! One persistent thread per transport runs the connect / read / reconnect
//! cycle: on every successful connect it hands the router an
//! `AddConnection` with the write half, reads until the stream closes or
//! errors, posts `Closed`, then retries after a fixed delay. There is no
//! retry limit; links to vehicles come and go.

use super::{
    is_timeout, sleep_while_running, Connection, ConnectionKey, TransportId, POLL_TIMEOUT,
    READ_BUFFER, RECONNECT_DELAY,
};
use crate::error::Result;
use crate::protocol::Parser;
use crate::router::Event;
use crossbeam_channel::Sender;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn spawn_tcp_out(
    id: TransportId,
    remote: SocketAddr,
    events: Sender<Event>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name(format!("tcpout-{}", id))
        .spawn(move || {
            let key = ConnectionKey::Socket(id);
            while !shutdown.load(Ordering::Relaxed) {
                match TcpStream::connect_timeout(&remote, CONNECT_TIMEOUT) {
                    Ok(stream) => {
                        if let Err(e) = connected(&key, stream, &events, &shutdown) {
                            log::warn!("tcpout-{} setup failed: {}", id, e);
                        } else if events.send(Event::Closed(key.clone())).is_err() {
                            return;
                        }
                        log::info!(
                            "tcp connection to {} closed, retrying in {:?}",
                            remote,
                            RECONNECT_DELAY
                        );
                    }
                    Err(e) => log::debug!("tcp connect to {} failed: {}", remote, e),
                }
                sleep_while_running(&shutdown, RECONNECT_DELAY);
            }
            log::debug!("tcpout-{} worker exiting", id);
        })?;

    Ok(handle)
}

/// Register the fresh stream with the router and read until it dies
fn connected(
    key: &ConnectionKey,
    stream: TcpStream,
    events: &Sender<Event>,
    shutdown: &Arc<AtomicBool>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(POLL_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let writer = stream.try_clone()?;
    log::info!("tcp connected to {}", stream.peer_addr()?);

    if events
        .send(Event::AddConnection(
            key.clone(),
            Connection::TcpOut {
                stream: writer,
                parser: Parser::new(),
            },
        ))
        .is_err()
    {
        return Ok(());
    }

    read_loop(key, stream, events, shutdown);
    Ok(())
}

fn read_loop(
    key: &ConnectionKey,
    mut stream: TcpStream,
    events: &Sender<Event>,
    shutdown: &Arc<AtomicBool>,
) {
    let mut buf = [0u8; READ_BUFFER];
    while !shutdown.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => return, // peer closed
            Ok(n) => {
                if events.send(Event::Bytes(key.clone(), buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                log::warn!("tcp read error on {}: {}", key, e);
                return;
            }
        }
    }
}
