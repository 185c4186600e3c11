//! Error types for SetuMAV
//!
//! # Error Recovery Strategies
//!
//! ## Startup Errors (Fix and Restart)
//!
//! - **`NoDialect`**: The router was started without a dialect. Nothing can
//!   be parsed or encoded without one; supply a dialect and restart.
//! - **`InvalidTransportSpec`** / **`Config`**: A connection string or the
//!   TOML config is malformed. Fix the configuration and restart.
//!
//! ## Caller Errors (Report and Continue)
//!
//! - **`InvalidMessageType`**: A subscription query named a message type the
//!   dialect does not know. Reported to the caller; no state is changed.
//! - **`ProtocolUndefined`**: The dialect cannot encode the message handed
//!   to `pack_and_send` (unknown type, missing field, or an id that does not
//!   fit the requested frame version). Reported to the caller; nothing sent.
//!
//! ## Transient Errors
//!
//! - **`Serial`** / **`Io`**: Transport-level failures. TCP and serial
//!   connections are torn down and retried with a fixed delay; UDP sockets
//!   are connectionless and just keep going.
//!
//! Parser-level failures (bad checksum, unknown message id, truncated
//! frame) are not errors at this level: the frame is dropped with a debug
//! log and the connection continues.

use thiserror::Error;

/// Errors that can occur in SetuMAV
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no dialect configured")]
    NoDialect,

    #[error("invalid transport spec: {0}")]
    InvalidTransportSpec(String),

    #[error("unknown message type: {0}")]
    InvalidMessageType(String),

    #[error("cannot encode message: {0}")]
    ProtocolUndefined(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("router is not running")]
    RouterStopped,

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
