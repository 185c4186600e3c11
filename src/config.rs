//! Daemon configuration loading from TOML
//!
//! # Configuration File Format
//!
//! ```toml
//! [router]
//! system = 255
//! component = 190
//! echo_local_broadcast = true
//!
//! connections = [
//!     "udpin:0.0.0.0:14550",
//!     "tcpout:10.0.0.2:5760",
//!     "serial:/dev/ttyUSB0:57600",
//! ]
//! ```
//!
//! Each `connections` entry is a transport spec string:
//!
//! - `udpin:<local_ip>:<local_port>`: UDP server, one connection per peer
//! - `udpout:<remote_ip>:<remote_port>`: UDP client with a fixed remote
//! - `tcpout:<remote_ip>:<remote_port>`: TCP client, reconnects forever
//! - `serial:<device>:<baud>`: serial link
//!
//! See `setu-mav.toml` for a complete example.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;

/// One configured transport endpoint, parsed from a spec string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// UDP server: binds locally, learns one connection per remote peer
    UdpIn(SocketAddr),
    /// UDP client: one socket, one fixed remote
    UdpOut(SocketAddr),
    /// TCP client with automatic reconnect
    TcpOut(SocketAddr),
    /// Serial device at a fixed baud rate
    Serial { path: String, baud: u32 },
}

impl FromStr for TransportSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidTransportSpec(s.to_string());
        let (proto, rest) = s.split_once(':').ok_or_else(bad)?;
        match proto {
            "udpin" => Ok(TransportSpec::UdpIn(resolve_addr(rest).ok_or_else(bad)?)),
            "udpout" => Ok(TransportSpec::UdpOut(resolve_addr(rest).ok_or_else(bad)?)),
            "tcpout" => Ok(TransportSpec::TcpOut(resolve_addr(rest).ok_or_else(bad)?)),
            "serial" => {
                // the device path may itself contain colons, the baud cannot
                let (path, baud) = rest.rsplit_once(':').ok_or_else(bad)?;
                if path.is_empty() {
                    return Err(bad());
                }
                let baud: u32 = baud.parse().map_err(|_| bad())?;
                Ok(TransportSpec::Serial {
                    path: path.to_string(),
                    baud,
                })
            }
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSpec::UdpIn(addr) => write!(f, "udpin:{}", addr),
            TransportSpec::UdpOut(addr) => write!(f, "udpout:{}", addr),
            TransportSpec::TcpOut(addr) => write!(f, "tcpout:{}", addr),
            TransportSpec::Serial { path, baud } => write!(f, "serial:{}:{}", path, baud),
        }
    }
}

fn resolve_addr(addr: &str) -> Option<SocketAddr> {
    addr.to_socket_addrs().ok()?.next()
}

/// Router identity and behavior settings
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSection {
    /// MAVLink system id of the router itself (1-255)
    #[serde(default = "default_system")]
    pub system: u8,

    /// MAVLink component id of the router itself (1-255)
    #[serde(default = "default_component")]
    pub component: u8,

    /// Deliver locally-originated broadcasts back to local subscribers
    #[serde(default = "default_echo")]
    pub echo_local_broadcast: bool,
}

fn default_system() -> u8 {
    255
}

fn default_component() -> u8 {
    190
}

fn default_echo() -> bool {
    true
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            system: default_system(),
            component: default_component(),
            echo_local_broadcast: default_echo(),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub connections: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = basic_toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.router.system == 0 || self.router.component == 0 {
            return Err(Error::Config(
                "router system and component ids must be in 1..=255".to_string(),
            ));
        }
        for spec in &self.connections {
            spec.parse::<TransportSpec>()?;
        }
        Ok(())
    }

    /// Parsed transport specs in configuration order
    pub fn transports(&self) -> Result<Vec<TransportSpec>> {
        self.connections.iter().map(|s| s.parse()).collect()
    }
}
