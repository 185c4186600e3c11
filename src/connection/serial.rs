//! Serial transport worker.
//!
//! The port is shared between this reader thread and the router's write
//! path through a mutex; reads use a short timeout so the lock is held only
//! briefly. On a device error the port is dropped (closed) and the worker
//! reopens it after a fixed delay, forever.

use super::{is_timeout, sleep_while_running, Connection, ConnectionKey, RECONNECT_DELAY};
use crate::error::Result;
use crate::protocol::Parser;
use crate::router::Event;
use crossbeam_channel::Sender;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Short read timeout keeps the port lock brief and the shutdown flag fresh
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(10);

const SERIAL_READ_BUFFER: usize = 512;

pub(crate) fn spawn_serial(
    path: String,
    baud: u32,
    events: Sender<Event>,
    shutdown: Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    let device = path.rsplit('/').next().unwrap_or(path.as_str()).to_string();
    let handle = std::thread::Builder::new()
        .name(format!("serial-{}", device))
        .spawn(move || {
            let key = ConnectionKey::Serial(path.clone());
            while !shutdown.load(Ordering::Relaxed) {
                match open_port(&path, baud) {
                    Ok(port) => {
                        let port = Arc::new(Mutex::new(port));
                        let added = events.send(Event::AddConnection(
                            key.clone(),
                            Connection::Serial {
                                port: Arc::clone(&port),
                                parser: Parser::new(),
                            },
                        ));
                        if added.is_err() {
                            return;
                        }
                        read_loop(&key, &port, &events, &shutdown);
                        if events.send(Event::Closed(key.clone())).is_err() {
                            return;
                        }
                        log::info!(
                            "serial device {} closed, retrying in {:?}",
                            path,
                            RECONNECT_DELAY
                        );
                    }
                    Err(e) => log::debug!("failed to open {}: {}", path, e),
                }
                sleep_while_running(&shutdown, RECONNECT_DELAY);
            }
            log::debug!("serial worker for {} exiting", path);
        })?;

    Ok(handle)
}

fn open_port(path: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(SERIAL_READ_TIMEOUT)
        .open()?;
    log::info!("opened serial port {} at {} baud", path, baud);
    Ok(port)
}

/// Read until the device errors or shutdown is requested
fn read_loop(
    key: &ConnectionKey,
    port: &Arc<Mutex<Box<dyn SerialPort>>>,
    events: &Sender<Event>,
    shutdown: &Arc<AtomicBool>,
) {
    let mut buf = [0u8; SERIAL_READ_BUFFER];
    while !shutdown.load(Ordering::Relaxed) {
        let read = {
            let Ok(mut port) = port.lock() else {
                log::error!("serial port mutex poisoned on {}", key);
                return;
            };
            port.read(&mut buf)
        };
        match read {
            Ok(0) => {}
            Ok(n) => {
                if events.send(Event::Bytes(key.clone(), buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                log::warn!("serial read error on {}: {}", key, e);
                return;
            }
        }
        // yield between reads so the router's writes can take the lock
        std::thread::sleep(Duration::from_millis(2));
    }
}
